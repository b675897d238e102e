//! Search session
//!
//! Everything the CRF search needs to know about one run, fixed before the
//! first probe: which sample to encode, how its size scales to the full
//! video, the byte budget and the CRF window.

use std::path::{Path, PathBuf};

use shared_utils::{CrfRange, FileSize, Result, SizeTargetError, VideoCodec};

use crate::bitrate::validate_margin;

/// `full_duration / sample_duration`, always `>= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRatio(f64);

impl SampleRatio {
    /// The sample is the whole video.
    pub const WHOLE: SampleRatio = SampleRatio(1.0);

    pub fn new(full_secs: f64, sample_secs: f64) -> Result<Self> {
        for (what, secs) in [("full video", full_secs), ("sample", sample_secs)] {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(SizeTargetError::invalid(format!(
                    "{} duration must be positive (got {})",
                    what, secs
                )));
            }
        }
        // A stream-copied cut can end a few frames past the full length.
        Ok(Self((full_secs / sample_secs).max(1.0)))
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct SearchSession {
    sample_path: PathBuf,
    sample_ratio: SampleRatio,
    budget: FileSize,
    margin: f64,
    bounds: CrfRange,
    codec: VideoCodec,
    keep_audio: bool,
    work_dir: PathBuf,
}

impl SearchSession {
    pub fn new(
        sample_path: impl Into<PathBuf>,
        sample_ratio: SampleRatio,
        budget: FileSize,
        bounds: CrfRange,
        work_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        if budget.is_zero() {
            return Err(SizeTargetError::invalid("target size must be greater than zero"));
        }
        Ok(Self {
            sample_path: sample_path.into(),
            sample_ratio,
            budget,
            margin: 1.0,
            bounds,
            codec: VideoCodec::default(),
            keep_audio: false,
            work_dir: work_dir.into(),
        })
    }

    pub fn with_margin(mut self, margin: f64) -> Result<Self> {
        self.margin = validate_margin(margin)?;
        Ok(self)
    }

    pub fn with_codec(mut self, codec: VideoCodec) -> Result<Self> {
        if self.bounds.max().value() > codec.crf_max() {
            return Err(SizeTargetError::invalid(format!(
                "CRF window {} exceeds the {} range",
                self.bounds, codec
            )));
        }
        self.codec = codec;
        Ok(self)
    }

    /// Probe encodes carry the audio track the final encode will carry.
    pub fn with_audio(mut self, keep_audio: bool) -> Self {
        self.keep_audio = keep_audio;
        self
    }

    pub fn sample_path(&self) -> &Path {
        &self.sample_path
    }

    pub fn sample_ratio(&self) -> SampleRatio {
        self.sample_ratio
    }

    pub fn budget(&self) -> FileSize {
        self.budget
    }

    pub fn bounds(&self) -> CrfRange {
        self.bounds
    }

    pub fn codec(&self) -> VideoCodec {
        self.codec
    }

    pub fn keep_audio(&self) -> bool {
        self.keep_audio
    }

    /// Directory for per-probe encodes.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Budget the predicted size is compared against.
    pub fn target_bytes(&self) -> f64 {
        self.budget.scaled(self.margin)
    }
}
