//! Run configuration
//!
//! Built by the CLI, validated once before any external tool runs.

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::Serialize;

use shared_utils::constants::{
    DEFAULT_MAXRATE_MULTIPLIER, DEFAULT_SAMPLE_DURATION_SECS, DEFAULT_SEARCH_MARGIN,
    DEFAULT_TARGET_BYTES, DEFAULT_TWO_PASS_MARGIN,
};
use shared_utils::{CrfRange, FileSize, Result, SizeTargetError, VideoCodec};

use crate::bitrate::validate_margin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetMode {
    /// Sample encodes + binary search for the best CRF
    #[default]
    CrfSearch,
    /// Average bitrate from the budget, encoded in two passes
    TwoPass,
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetMode::CrfSearch => write!(f, "crf-search"),
            TargetMode::TwoPass => write!(f, "two-pass"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Directory holding the `.mov` clips to join.
    pub source_dir: PathBuf,
    /// Use this file as the full video instead of joining clips.
    pub input: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub descriptor: String,
    pub mode: TargetMode,
    pub target: FileSize,
    pub sample_duration: f64,
    pub crf_range: CrfRange,
    pub search_margin: f64,
    pub two_pass_margin: f64,
    pub maxrate_multiplier: f64,
    pub codec: VideoCodec,
    pub keep_audio: bool,
    pub discard_joined: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("sourceVids"),
            input: None,
            output_dir: PathBuf::from("."),
            descriptor: String::new(),
            mode: TargetMode::default(),
            target: FileSize::new(DEFAULT_TARGET_BYTES),
            sample_duration: DEFAULT_SAMPLE_DURATION_SECS,
            crf_range: CrfRange::default(),
            search_margin: DEFAULT_SEARCH_MARGIN,
            two_pass_margin: DEFAULT_TWO_PASS_MARGIN,
            maxrate_multiplier: DEFAULT_MAXRATE_MULTIPLIER,
            codec: VideoCodec::default(),
            keep_audio: false,
            discard_joined: false,
        }
    }
}

impl TargetConfig {
    pub fn validate(&self) -> Result<()> {
        // a given input names its own output
        if self.input.is_none() {
            validate_descriptor(&self.descriptor)?;
        }
        if self.target.is_zero() {
            return Err(SizeTargetError::invalid("target size must be greater than zero"));
        }
        if !self.sample_duration.is_finite() || self.sample_duration <= 0.0 {
            return Err(SizeTargetError::invalid(format!(
                "sample duration must be positive (got {})",
                self.sample_duration
            )));
        }
        if self.crf_range.max().value() > self.codec.crf_max() {
            return Err(SizeTargetError::invalid(format!(
                "CRF window {} exceeds the {} range",
                self.crf_range, self.codec
            )));
        }
        validate_margin(self.search_margin)?;
        validate_margin(self.two_pass_margin)?;
        if !self.maxrate_multiplier.is_finite() || self.maxrate_multiplier < 1.0 {
            return Err(SizeTargetError::invalid(format!(
                "max-rate multiplier must be >= 1.0 (got {})",
                self.maxrate_multiplier
            )));
        }
        Ok(())
    }
}

/// The descriptor becomes part of a file name.
pub fn validate_descriptor(descriptor: &str) -> Result<&str> {
    let trimmed = descriptor.trim();
    if trimmed.is_empty() {
        return Err(SizeTargetError::invalid("descriptor must not be empty"));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(SizeTargetError::invalid(format!(
            "descriptor '{}' is not a usable file name",
            trimmed
        )));
    }
    if trimmed
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(SizeTargetError::invalid(format!(
            "descriptor '{}' must not contain path separators",
            trimmed
        )));
    }
    Ok(trimmed)
}
