//! Collaborator contracts
//!
//! The size targeting core only talks to the outside world through these
//! traits. `ffmpeg_tools` implements them on top of ffmpeg/ffprobe; tests
//! use deterministic stubs.

use std::fmt;
use std::path::{Path, PathBuf};

use shared_utils::{Crf, Result, VideoCodec};

/// Which half of a two-pass encode is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoPassStage {
    /// Statistics only, no output file is written.
    Analysis,
    /// Final output using the statistics of the analysis pass.
    Final,
}

impl TwoPassStage {
    pub fn number(&self) -> u8 {
        match self {
            TwoPassStage::Analysis => 1,
            TwoPassStage::Final => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateControl {
    /// Constant quality.
    Crf(Crf),
    /// Two-pass average bitrate with a max-rate ceiling.
    Bitrate {
        target_bps: u64,
        max_bps: u64,
        bufsize_bits: u64,
        stage: TwoPassStage,
        /// Prefix of the statistics files shared by both passes.
        passlog: PathBuf,
    },
    /// Remux without re-encoding (used to cut the sample).
    StreamCopy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub rate: RateControl,
    pub codec: VideoCodec,
    /// Stop after this many seconds of input.
    pub duration_limit: Option<f64>,
    pub audio_enabled: bool,
    /// Expected output length, enables a progress bar.
    pub progress_secs: Option<f64>,
}

impl EncodeOptions {
    pub fn new(rate: RateControl, codec: VideoCodec) -> Self {
        Self {
            rate,
            codec,
            duration_limit: None,
            audio_enabled: false,
            progress_secs: None,
        }
    }

    pub fn crf(crf: Crf, codec: VideoCodec) -> Self {
        Self::new(RateControl::Crf(crf), codec)
    }

    pub fn stream_copy() -> Self {
        Self::new(RateControl::StreamCopy, VideoCodec::default())
    }

    pub fn with_duration_limit(mut self, secs: f64) -> Self {
        self.duration_limit = Some(secs);
        self
    }

    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }

    pub fn with_progress(mut self, total_secs: f64) -> Self {
        self.progress_secs = Some(total_secs);
        self
    }

    /// True for the statistics-only first pass.
    pub fn is_analysis_pass(&self) -> bool {
        matches!(
            self.rate,
            RateControl::Bitrate {
                stage: TwoPassStage::Analysis,
                ..
            }
        )
    }
}

impl fmt::Display for EncodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rate {
            RateControl::Crf(crf) => write!(f, "{} CRF {}", self.codec, crf),
            RateControl::Bitrate {
                target_bps, stage, ..
            } => write!(
                f,
                "{} two-pass {}/2 @ {} bps",
                self.codec,
                stage.number(),
                target_bps
            ),
            RateControl::StreamCopy => match self.duration_limit {
                Some(secs) => write!(f, "stream copy of first {:.0}s", secs),
                None => write!(f, "stream copy"),
            },
        }
    }
}

/// Runs the external encoder.
pub trait Encoder {
    /// Encodes `input` into `output` and blocks until done. Fails with
    /// `EncodingFailure` on a non-zero exit or when no output was produced.
    /// The analysis pass of a two-pass encode writes no `output`.
    fn encode(&self, input: &Path, output: &Path, options: &EncodeOptions) -> Result<()>;
}

/// Measures media files.
pub trait Prober {
    /// Duration in seconds; `ProbeFailure` when unreadable or not positive.
    fn duration(&self, path: &Path) -> Result<f64>;

    /// Whether the file carries at least one audio stream.
    fn has_audio(&self, path: &Path) -> Result<bool>;
}

/// Joins same-format clips into one file with audio dropped.
pub trait Joiner {
    /// `ConcatenationFailure` when `files` is empty or the clips cannot be joined.
    fn concatenate(&self, files: &[PathBuf], output: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_display() {
        let crf = EncodeOptions::crf(Crf::new(23).unwrap(), VideoCodec::X264);
        assert_eq!(crf.to_string(), "x264 CRF 23");

        let pass = EncodeOptions::new(
            RateControl::Bitrate {
                target_bps: 1_000_000,
                max_bps: 1_250_000,
                bufsize_bits: 2_500_000,
                stage: TwoPassStage::Final,
                passlog: PathBuf::from("/tmp/passlog"),
            },
            VideoCodec::X265,
        );
        assert_eq!(pass.to_string(), "x265 two-pass 2/2 @ 1000000 bps");
        assert!(!pass.is_analysis_pass());

        let cut = EncodeOptions::stream_copy().with_duration_limit(120.0);
        assert_eq!(cut.to_string(), "stream copy of first 120s");
    }

    #[test]
    fn test_options_builder() {
        let opts = EncodeOptions::crf(Crf::new(18).unwrap(), VideoCodec::X264)
            .with_audio(true)
            .with_progress(600.0);
        assert!(opts.audio_enabled);
        assert_eq!(opts.progress_secs, Some(600.0));
        assert_eq!(opts.duration_limit, None);
    }
}
