//! FFprobe wrapper module
//!
//! Duration and audio presence of a media file, read from
//! `ffprobe -print_format json -show_format -show_streams`.

use std::path::Path;
use std::process::Command;
use std::time::Instant;

use crate::errors::{Result, SizeTargetError};
use crate::logging::log_external_tool;

/// What the size targeting needs to know about a video file.
#[derive(Debug, Clone, PartialEq)]
pub struct FFprobeResult {
    /// Seconds; 0.0 when neither container nor video stream reports one.
    pub duration: f64,
    pub has_audio: bool,
}

pub fn is_ffprobe_available() -> bool {
    which::which("ffprobe").is_ok()
}

fn probe_failure(path: &Path, reason: impl Into<String>) -> SizeTargetError {
    SizeTargetError::ProbeFailure {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

pub fn probe_video(path: &Path) -> Result<FFprobeResult> {
    if !path.is_file() {
        return Err(probe_failure(path, "not a readable file"));
    }

    let path_str = path
        .to_str()
        .ok_or_else(|| probe_failure(path, "invalid path encoding"))?;

    let args = [
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        "--",
        path_str,
    ];
    let started = Instant::now();
    let output = Command::new("ffprobe")
        .args(args)
        .output()
        .map_err(|e| probe_failure(path, format!("failed to run ffprobe: {}", e)))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    log_external_tool(
        "ffprobe",
        &args,
        &stderr,
        output.status.code(),
        started.elapsed(),
    );

    if !output.status.success() {
        let reason = if stderr.trim().is_empty() {
            format!("ffprobe exited with {:?}", output.status.code())
        } else {
            stderr.trim().to_string()
        };
        return Err(probe_failure(path, reason));
    }

    parse_probe_json(&String::from_utf8_lossy(&output.stdout))
        .map_err(|reason| probe_failure(path, reason))
}

/// Parses ffprobe JSON output. Fails when the file has no video stream.
pub fn parse_probe_json(json_str: &str) -> std::result::Result<FFprobeResult, String> {
    let json: serde_json::Value =
        serde_json::from_str(json_str).map_err(|e| format!("invalid ffprobe JSON: {}", e))?;

    let format = &json["format"];
    let streams = json["streams"]
        .as_array()
        .ok_or_else(|| "No streams found".to_string())?;

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"))
        .ok_or_else(|| "No video stream found".to_string())?;

    // Container duration first; some muxers only report it per stream.
    let duration = format["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| {
            video_stream["duration"]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
        })
        .unwrap_or(0.0);

    let has_audio = streams
        .iter()
        .any(|s| s["codec_type"].as_str() == Some("audio"));

    Ok(FFprobeResult {
        duration,
        has_audio,
    })
}

/// Duration in seconds; fails unless it is positive and finite.
pub fn get_duration(path: &Path) -> Result<f64> {
    let probe = probe_video(path)?;
    validate_duration(probe.duration).map_err(|reason| probe_failure(path, reason))
}

pub fn validate_duration(duration: f64) -> std::result::Result<f64, String> {
    if duration.is_finite() && duration > 0.0 {
        Ok(duration)
    } else {
        Err(format!("no measurable duration (got {})", duration))
    }
}
