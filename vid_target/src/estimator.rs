//! Sample-based size estimation
//!
//! Encodes the sample at a candidate CRF and scales the measured size by the
//! sample ratio. Each probe writes to its own temporary file, removed before
//! `estimate` returns whether the encode succeeded or not.

use std::fs;
use std::path::Path;

use tracing::{debug, info_span};

use shared_utils::{format_bytes_f64, Crf, Result, SizeTargetError};

use crate::session::{SampleRatio, SearchSession};
use crate::tools::{EncodeOptions, Encoder};

/// Predicted full-video size for a CRF.
pub trait SizeEstimator {
    fn estimate(&self, crf: Crf) -> Result<f64>;
}

impl<F> SizeEstimator for F
where
    F: Fn(Crf) -> Result<f64>,
{
    fn estimate(&self, crf: Crf) -> Result<f64> {
        self(crf)
    }
}

pub struct SampleSizeEstimator<'a> {
    encoder: &'a dyn Encoder,
    session: &'a SearchSession,
}

impl<'a> SampleSizeEstimator<'a> {
    pub fn new(encoder: &'a dyn Encoder, session: &'a SearchSession) -> Self {
        Self { encoder, session }
    }

    /// Encodes `sample` at `crf` and returns `sample_bytes × ratio`.
    pub fn estimate_at(&self, sample: &Path, crf: Crf, ratio: SampleRatio) -> Result<f64> {
        let _span = info_span!("estimate", crf = crf.value()).entered();

        let artifact = tempfile::Builder::new()
            .prefix(&format!("probe.crf{}.", crf))
            .suffix(".mp4")
            .tempfile_in(self.session.work_dir())?
            .into_temp_path();

        let options =
            EncodeOptions::crf(crf, self.session.codec()).with_audio(self.session.keep_audio());
        self.encoder.encode(sample, &artifact, &options)?;

        let sample_bytes = fs::metadata(&artifact)?.len();
        artifact.close()?;

        if sample_bytes == 0 {
            return Err(SizeTargetError::EncodingFailure {
                input: sample.to_path_buf(),
                context: format!("CRF {} sample", crf),
                exit_code: None,
                reason: "encoder produced an empty file".to_string(),
            });
        }

        let predicted = sample_bytes as f64 * ratio.value();
        debug!(
            crf = crf.value(),
            sample_bytes,
            ratio = ratio.value(),
            predicted = %format_bytes_f64(predicted),
            "Sample encoded"
        );
        Ok(predicted)
    }
}

impl SizeEstimator for SampleSizeEstimator<'_> {
    fn estimate(&self, crf: Crf) -> Result<f64> {
        self.estimate_at(
            self.session.sample_path(),
            crf,
            self.session.sample_ratio(),
        )
    }
}
