//! Codec Information Module
//!
//! Output video encoders the size targeting strategies can drive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{HEVC_CRF_MAX, X264_CRF_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoCodec {
    #[default]
    X264,
    X265,
}

impl VideoCodec {
    /// ffmpeg `-c:v` value.
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            VideoCodec::X264 => "libx264",
            VideoCodec::X265 => "libx265",
        }
    }

    pub fn crf_max(&self) -> u8 {
        match self {
            VideoCodec::X264 => X264_CRF_MAX,
            VideoCodec::X265 => HEVC_CRF_MAX,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::X264 => "x264",
            VideoCodec::X265 => "x265",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x264" | "h264" | "libx264" => Ok(VideoCodec::X264),
            "x265" | "h265" | "hevc" | "libx265" => Ok(VideoCodec::X265),
            other => Err(format!("unsupported codec '{}' (use x264 or x265)", other)),
        }
    }
}
