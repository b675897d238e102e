//! vid-target - Size-Targeted Video Compression
//!
//! Joins a day's worth of `.mov` clips and re-encodes the result so it fits
//! a byte budget (2 GiB by default), with one of two strategies:
//! - **CRF search**: encode a short sample at candidate CRFs, extrapolate
//!   the full size, binary-search the lowest CRF that fits
//! - **Two-pass**: derive an average bitrate from budget and duration
//!
//! ## Usage
//! ```rust,ignore
//! use vid_target::{run_pipeline, FfmpegEncoder, FfmpegJoiner, FfprobeProber, TargetConfig, Toolchain};
//!
//! let config = TargetConfig { descriptor: "BeachDay".into(), ..TargetConfig::default() };
//! let tools = Toolchain { encoder: &FfmpegEncoder, prober: &FfprobeProber, joiner: &FfmpegJoiner };
//! let outcome = run_pipeline(&config, &tools)?;
//! println!("{}", outcome.summary());
//! ```

pub mod bitrate;
pub mod config;
pub mod conversion_api;
pub mod estimator;
pub mod ffmpeg_tools;
pub mod quality_search;
pub mod session;
pub mod strategy;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use bitrate::{plan_bitrate, BitratePlan, BitrateTargeter};
pub use config::{validate_descriptor, TargetConfig, TargetMode};
pub use conversion_api::{date_stamp, run_pipeline, OutputNames, Toolchain};
pub use estimator::{SampleSizeEstimator, SizeEstimator};
pub use ffmpeg_tools::{FfmpegEncoder, FfmpegJoiner, FfprobeProber};
pub use quality_search::{QualitySearch, SearchOutcome};
pub use session::{SampleRatio, SearchSession};
pub use strategy::{
    create_strategy, CrfSearchStrategy, Decision, SizeTargetingStrategy, TargetContext,
    TargetOutcome, TwoPassStrategy,
};
pub use tools::{EncodeOptions, Encoder, Joiner, Prober, RateControl, TwoPassStage};

pub use shared_utils::errors::{Result, SizeTargetError};
