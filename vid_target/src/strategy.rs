//! Size targeting strategies
//!
//! Two interchangeable ways to bring the full video under a byte budget:
//!
//! | Mode | Decides | Cost |
//! |------|---------|------|
//! | `crf-search` | lowest CRF whose sample-predicted size fits | ≤ 6 sample encodes + 1 full encode |
//! | `two-pass` | average bitrate from budget and duration | 2 full encodes |
//!
//! Both write the final file under a temporary name next to the
//! destination and rename it into place only once the encode succeeded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{info, warn};

use shared_utils::constants::AUDIO_BITRATE_BPS;
use shared_utils::{format_bytes_f64, Crf, CrfRange, FileSize, Result, SizeTargetError, VideoCodec};

use crate::bitrate::{validate_margin, BitratePlan, BitrateTargeter};
use crate::config::{TargetConfig, TargetMode};
use crate::estimator::SampleSizeEstimator;
use crate::quality_search::QualitySearch;
use crate::session::{SampleRatio, SearchSession};
use crate::tools::{EncodeOptions, Encoder, Prober, RateControl, TwoPassStage};

const PASSLOG_PREFIX: &str = "passlog";

/// What a strategy gets to work with.
pub struct TargetContext<'a> {
    pub encoder: &'a dyn Encoder,
    pub prober: &'a dyn Prober,
    /// Full video.
    pub input: &'a Path,
    pub output: &'a Path,
    pub full_duration: f64,
    /// Scratch space for the sample, probe encodes and pass logs.
    pub work_dir: &'a Path,
    pub budget: FileSize,
    pub codec: VideoCodec,
    /// Carry the input's audio into the output. Sample, probes and the
    /// bitrate plan all account for it.
    pub keep_audio: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Crf {
        crf: Crf,
        predicted_bytes: f64,
        probes: u32,
    },
    Bitrate(BitratePlan),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetOutcome {
    pub mode: TargetMode,
    pub output: PathBuf,
    pub output_bytes: u64,
    pub decision: Decision,
}

impl TargetOutcome {
    pub fn summary(&self) -> String {
        let detail = match &self.decision {
            Decision::Crf {
                crf,
                predicted_bytes,
                probes,
            } => format!(
                "CRF {} (predicted {}, {} probes)",
                crf,
                format_bytes_f64(*predicted_bytes),
                probes
            ),
            Decision::Bitrate(plan) => format!(
                "{} bps average, {} bps max",
                plan.video_bitrate(),
                plan.max_rate_bps
            ),
        };
        format!(
            "{} -> {} [{}]: {}",
            self.mode,
            self.output.display(),
            FileSize::new(self.output_bytes).display(),
            detail
        )
    }
}

pub trait SizeTargetingStrategy: Send + Sync {
    fn mode(&self) -> TargetMode;

    fn description(&self) -> &'static str;

    fn run(&self, ctx: &TargetContext) -> Result<TargetOutcome>;
}

pub fn create_strategy(config: &TargetConfig) -> Result<Box<dyn SizeTargetingStrategy>> {
    Ok(match config.mode {
        TargetMode::CrfSearch => Box::new(CrfSearchStrategy::new(
            config.crf_range,
            config.sample_duration,
            config.search_margin,
        )?),
        TargetMode::TwoPass => Box::new(TwoPassStrategy::new(BitrateTargeter::new(
            config.two_pass_margin,
            config.maxrate_multiplier,
        )?)),
    })
}

/// Encodes into a temporary sibling of `ctx.output`, then renames it over
/// the destination. Returns the final size.
fn write_final(ctx: &TargetContext, options: &EncodeOptions) -> Result<u64> {
    let dir = ctx
        .output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let partial = tempfile::Builder::new()
        .prefix(".vid_target.")
        .suffix(".partial.mp4")
        .tempfile_in(dir)?;

    ctx.encoder.encode(ctx.input, partial.path(), options)?;

    let bytes = fs::metadata(partial.path())?.len();
    partial.persist(ctx.output).map_err(|e| e.error)?;
    Ok(bytes)
}

fn check_budget(output_bytes: u64, budget: FileSize) {
    if output_bytes > budget.bytes() {
        warn!(
            actual = %FileSize::new(output_bytes).display(),
            budget = %budget.display(),
            "Final file exceeds the budget"
        );
    }
}

// ============================================================================
// CRF search
// ============================================================================

enum Sample<'a> {
    Whole(&'a Path),
    Cut(TempPath),
}

impl Sample<'_> {
    fn path(&self) -> &Path {
        match self {
            Sample::Whole(path) => path,
            Sample::Cut(temp) => temp,
        }
    }
}

pub struct CrfSearchStrategy {
    bounds: CrfRange,
    sample_duration: f64,
    margin: f64,
}

impl CrfSearchStrategy {
    pub fn new(bounds: CrfRange, sample_duration: f64, margin: f64) -> Result<Self> {
        if !sample_duration.is_finite() || sample_duration <= 0.0 {
            return Err(SizeTargetError::invalid(format!(
                "sample duration must be positive (got {})",
                sample_duration
            )));
        }
        Ok(Self {
            bounds,
            sample_duration,
            margin: validate_margin(margin)?,
        })
    }

    /// Cuts the leading `sample_duration` seconds by stream copy, or uses
    /// the whole video when it is not longer than that.
    fn prepare_sample<'a>(&self, ctx: &TargetContext<'a>) -> Result<(Sample<'a>, SampleRatio)> {
        if ctx.full_duration <= self.sample_duration {
            info!(
                duration = ctx.full_duration,
                "Video shorter than the sample length, probing the whole file"
            );
            return Ok((Sample::Whole(ctx.input), SampleRatio::WHOLE));
        }

        let ext = ctx
            .input
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mov");
        let cut = tempfile::Builder::new()
            .prefix("sample.")
            .suffix(&format!(".{}", ext))
            .tempfile_in(ctx.work_dir)?
            .into_temp_path();

        let options = EncodeOptions::stream_copy()
            .with_duration_limit(self.sample_duration)
            .with_audio(ctx.keep_audio);
        ctx.encoder.encode(ctx.input, &cut, &options)?;

        let sample_secs = ctx.prober.duration(&cut)?;
        let ratio = SampleRatio::new(ctx.full_duration, sample_secs)?;
        info!(
            sample_secs,
            ratio = ratio.value(),
            "Sample cut"
        );
        Ok((Sample::Cut(cut), ratio))
    }
}

impl SizeTargetingStrategy for CrfSearchStrategy {
    fn mode(&self) -> TargetMode {
        TargetMode::CrfSearch
    }

    fn description(&self) -> &'static str {
        "Binary search over CRF using size predictions from a sample encode"
    }

    fn run(&self, ctx: &TargetContext) -> Result<TargetOutcome> {
        let (sample, ratio) = self.prepare_sample(ctx)?;

        let session = SearchSession::new(sample.path(), ratio, ctx.budget, self.bounds, ctx.work_dir)?
            .with_margin(self.margin)?
            .with_codec(ctx.codec)?
            .with_audio(ctx.keep_audio);
        let estimator = SampleSizeEstimator::new(ctx.encoder, &session);
        let search = QualitySearch::new(self.bounds, session.target_bytes())?.run(&estimator)?;
        drop(sample);

        info!(crf = search.best.value(), "Encoding full video");
        let options = EncodeOptions::crf(search.best, ctx.codec)
            .with_audio(ctx.keep_audio)
            .with_progress(ctx.full_duration);
        let output_bytes = write_final(ctx, &options)?;
        check_budget(output_bytes, ctx.budget);

        Ok(TargetOutcome {
            mode: self.mode(),
            output: ctx.output.to_path_buf(),
            output_bytes,
            decision: Decision::Crf {
                crf: search.best,
                predicted_bytes: search.predicted_bytes,
                probes: search.probes,
            },
        })
    }
}

// ============================================================================
// Two-pass
// ============================================================================

/// Removes the encoder's pass statistics (`passlog-0.log`, `.mbtree`, ...)
/// when dropped.
struct PassLogGuard<'a> {
    dir: &'a Path,
    prefix: &'a str,
}

impl Drop for PassLogGuard<'_> {
    fn drop(&mut self) {
        let Ok(entries) = fs::read_dir(self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with(self.prefix) {
                if let Err(e) = fs::remove_file(entry.path()) {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!(path = %entry.path().display(), error = %e, "Could not remove pass log");
                    }
                }
            }
        }
    }
}

pub struct TwoPassStrategy {
    targeter: BitrateTargeter,
}

impl TwoPassStrategy {
    pub fn new(targeter: BitrateTargeter) -> Self {
        Self { targeter }
    }
}

impl SizeTargetingStrategy for TwoPassStrategy {
    fn mode(&self) -> TargetMode {
        TargetMode::TwoPass
    }

    fn description(&self) -> &'static str {
        "Average bitrate derived from the budget, encoded in two passes"
    }

    fn run(&self, ctx: &TargetContext) -> Result<TargetOutcome> {
        let targeter = if ctx.keep_audio {
            self.targeter.with_audio_reserve(AUDIO_BITRATE_BPS)
        } else {
            self.targeter
        };
        let plan = targeter.plan(ctx.budget, ctx.full_duration)?;
        info!(
            bitrate = plan.video_bitrate(),
            maxrate = plan.max_rate_bps,
            audio = plan.audio_bitrate_bps,
            expected = %format_bytes_f64(plan.expected_bytes(ctx.full_duration)),
            "Two-pass plan"
        );

        let passlog = ctx.work_dir.join(PASSLOG_PREFIX);
        let _cleanup = PassLogGuard {
            dir: ctx.work_dir,
            prefix: PASSLOG_PREFIX,
        };
        let pass = |stage| {
            EncodeOptions::new(
                RateControl::Bitrate {
                    target_bps: plan.video_bitrate(),
                    max_bps: plan.max_rate_bps,
                    bufsize_bits: plan.bufsize_bits(),
                    stage,
                    passlog: passlog.clone(),
                },
                ctx.codec,
            )
            .with_progress(ctx.full_duration)
        };

        info!("Pass 1/2");
        ctx.encoder
            .encode(ctx.input, ctx.output, &pass(TwoPassStage::Analysis))?;

        info!("Pass 2/2");
        let final_pass = pass(TwoPassStage::Final).with_audio(ctx.keep_audio);
        let output_bytes = write_final(ctx, &final_pass)?;
        check_budget(output_bytes, ctx.budget);

        Ok(TargetOutcome {
            mode: self.mode(),
            output: ctx.output.to_path_buf(),
            output_bytes,
            decision: Decision::Bitrate(plan),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dir_entries, write_stub_file, StubEncoder, StubProber};
    use tempfile::TempDir;

    const MIB: u64 = 1024 * 1024;

    struct Fixture {
        dir: TempDir,
        input: PathBuf,
        output: PathBuf,
        work: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let input = write_stub_file(dir.path(), "2026.10.18.Beach.mov", 64 * 1024);
            let work = dir.path().join("work");
            fs::create_dir(&work).unwrap();
            let output = dir.path().join("2026.10.18.Beach.compressed.mp4");
            Self {
                dir,
                input,
                output,
                work,
            }
        }

        fn ctx<'a>(
            &'a self,
            encoder: &'a dyn Encoder,
            prober: &'a dyn Prober,
            full_duration: f64,
            budget: FileSize,
        ) -> TargetContext<'a> {
            TargetContext {
                encoder,
                prober,
                input: &self.input,
                output: &self.output,
                full_duration,
                work_dir: &self.work,
                budget,
                codec: VideoCodec::X264,
                keep_audio: false,
            }
        }

        /// Everything in the fixture dir apart from the input and work dir.
        fn stray_files(&self) -> Vec<PathBuf> {
            dir_entries(self.dir.path())
                .into_iter()
                .filter(|p| p != &self.input && p != &self.output && p != &self.work)
                .collect()
        }
    }

    fn crf_search() -> CrfSearchStrategy {
        CrfSearchStrategy::new(CrfRange::default(), 120.0, 1.0).unwrap()
    }

    #[test]
    fn test_crf_search_end_to_end() {
        let fx = Fixture::new();
        // (200 - 5q) MiB per sample; 1800 s video, 120 s sample -> ratio 15
        let encoder = StubEncoder::new(|crf| (200 - 5 * crf.value() as u64) * MIB);
        let prober = StubProber::new(120.0);
        let ctx = fx.ctx(&encoder, &prober, 1800.0, FileSize::from_gb(2));

        let outcome = crf_search().run(&ctx).unwrap();

        match outcome.decision {
            Decision::Crf {
                crf,
                predicted_bytes,
                probes,
            } => {
                assert_eq!(crf.value(), 13);
                assert_eq!(predicted_bytes, (2025 * MIB) as f64);
                assert!(probes <= 6);
            }
            other => panic!("unexpected decision {other:?}"),
        }
        assert_eq!(encoder.crf_calls(), vec![17, 8, 12, 14, 13, 13]);

        // sample cut first, final encode at the chosen CRF with progress
        let calls = encoder.calls();
        assert_eq!(calls[0].options.rate, RateControl::StreamCopy);
        assert_eq!(calls[0].options.duration_limit, Some(120.0));
        let last = calls.last().unwrap();
        assert_eq!(last.input, fx.input);
        assert_eq!(last.options.progress_secs, Some(1800.0));

        assert_eq!(fs::metadata(&fx.output).unwrap().len(), outcome.output_bytes);
        assert_eq!(outcome.output_bytes, 135 * MIB);
        assert!(dir_entries(&fx.work).is_empty());
        assert!(fx.stray_files().is_empty());
    }

    #[test]
    fn test_crf_search_counts_kept_audio() {
        let fx = Fixture::new();
        // same curve as above plus 10 MiB of audio per sample encode
        let encoder = StubEncoder::new(|crf| (200 - 5 * crf.value() as u64) * MIB)
            .with_audio_bytes(10 * MIB);
        let prober = StubProber::new(120.0);
        let mut ctx = fx.ctx(&encoder, &prober, 1800.0, FileSize::from_gb(2));
        ctx.keep_audio = true;

        let outcome = crf_search().run(&ctx).unwrap();

        match outcome.decision {
            Decision::Crf {
                crf,
                predicted_bytes,
                ..
            } => {
                assert_eq!(crf.value(), 15);
                assert_eq!(predicted_bytes, (2025 * MIB) as f64);
            }
            other => panic!("unexpected decision {other:?}"),
        }
        assert_eq!(encoder.crf_calls(), vec![17, 8, 12, 14, 15, 15]);
        // sample cut, every probe and the final encode keep audio
        assert!(encoder.calls().iter().all(|c| c.options.audio_enabled));
        assert_eq!(outcome.output_bytes, 135 * MIB);
        assert!(outcome.output_bytes <= FileSize::from_gb(2).bytes());
    }

    #[test]
    fn test_short_video_uses_whole_file() {
        let fx = Fixture::new();
        let encoder = StubEncoder::new(|crf| 10_000 - crf.value() as u64 * 100);
        let prober = StubProber::new(90.0);
        let ctx = fx.ctx(&encoder, &prober, 90.0, FileSize::new(8_000));

        let outcome = crf_search().run(&ctx).unwrap();

        assert!(encoder
            .calls()
            .iter()
            .all(|c| c.options.rate != RateControl::StreamCopy));
        assert!(encoder.calls().iter().all(|c| c.input == fx.input));
        assert!(matches!(outcome.decision, Decision::Crf { crf, .. } if crf.value() == 20));
    }

    #[test]
    fn test_no_feasible_crf_leaves_nothing_behind() {
        let fx = Fixture::new();
        let encoder = StubEncoder::new(|_| 10 * MIB);
        let prober = StubProber::new(120.0);
        let ctx = fx.ctx(&encoder, &prober, 3600.0, FileSize::from_mb(100));

        let err = crf_search().run(&ctx).unwrap_err();

        assert!(matches!(err, SizeTargetError::NoFeasibleQuality { .. }));
        assert!(!fx.output.exists());
        assert!(dir_entries(&fx.work).is_empty());
        assert!(fx.stray_files().is_empty());
    }

    #[test]
    fn test_failed_probe_aborts_search() {
        let fx = Fixture::new();
        let encoder = StubEncoder::new(|_| MIB).failing_at(&[8]);
        let prober = StubProber::new(120.0);
        let ctx = fx.ctx(&encoder, &prober, 1800.0, FileSize::new(20 * MIB));

        let err = crf_search().run(&ctx).unwrap_err();

        assert_eq!(err.kind(), "encoding_failure");
        assert_eq!(encoder.crf_calls(), vec![17, 8]);
        assert!(!fx.output.exists());
        assert!(dir_entries(&fx.work).is_empty());
    }

    #[test]
    fn test_failed_final_encode_keeps_destination_clean() {
        let fx = Fixture::new();
        let encoder = StubEncoder::new(|_| 1024).failing_final_encode();
        let prober = StubProber::new(120.0);
        let ctx = fx.ctx(&encoder, &prober, 1800.0, FileSize::from_gb(2));

        let err = crf_search().run(&ctx).unwrap_err();
        assert_eq!(err.kind(), "encoding_failure");
        // search itself completed; only the full encode failed
        assert_eq!(encoder.crf_calls(), vec![17, 8, 3, 1, 0, 0]);
        assert!(!fx.output.exists());
        assert!(fx.stray_files().is_empty());
    }

    #[test]
    fn test_two_pass_plan_and_calls() {
        let fx = Fixture::new();
        let encoder = StubEncoder::new(|_| 0).with_final_pass_bytes(1900 * MIB);
        let prober = StubProber::new(600.0);
        let ctx = fx.ctx(&encoder, &prober, 600.0, FileSize::from_gb(2));

        let outcome = TwoPassStrategy::new(BitrateTargeter::default())
            .run(&ctx)
            .unwrap();

        let calls = encoder.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].options.is_analysis_pass());
        match &calls[1].options.rate {
            RateControl::Bitrate {
                target_bps,
                max_bps,
                stage,
                ..
            } => {
                assert_eq!(*target_bps, 28_060_453);
                assert_eq!(*max_bps, 35_075_567);
                assert_eq!(*stage, TwoPassStage::Final);
            }
            other => panic!("unexpected rate control {other:?}"),
        }
        assert!(matches!(outcome.decision, Decision::Bitrate(_)));
        assert_eq!(outcome.output_bytes, 1900 * MIB);
        assert!(fx.output.exists());
        // pass statistics are gone
        assert!(dir_entries(&fx.work).is_empty());
    }

    #[test]
    fn test_two_pass_reserves_audio_bitrate() {
        let fx = Fixture::new();
        let encoder = StubEncoder::new(|_| 0).with_final_pass_bytes(1900 * MIB);
        let prober = StubProber::new(600.0);
        let mut ctx = fx.ctx(&encoder, &prober, 600.0, FileSize::from_gb(2));
        ctx.keep_audio = true;

        let outcome = TwoPassStrategy::new(BitrateTargeter::default())
            .run(&ctx)
            .unwrap();

        let calls = encoder.calls();
        assert!(!calls[0].options.audio_enabled);
        assert!(calls[1].options.audio_enabled);
        match &calls[1].options.rate {
            RateControl::Bitrate { target_bps, .. } => {
                assert_eq!(*target_bps, 28_060_453 - AUDIO_BITRATE_BPS)
            }
            other => panic!("unexpected rate control {other:?}"),
        }
        match outcome.decision {
            Decision::Bitrate(plan) => {
                assert_eq!(plan.audio_bitrate_bps, AUDIO_BITRATE_BPS);
                let expected = plan.expected_bytes(600.0);
                assert!(expected <= FileSize::from_gb(2).bytes() as f64 * 0.98 + 1.0);
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn test_two_pass_failure_cleans_up() {
        let fx = Fixture::new();
        let encoder = StubEncoder::new(|_| 0).failing_final_encode();
        let prober = StubProber::new(600.0);
        let ctx = fx.ctx(&encoder, &prober, 600.0, FileSize::from_gb(2));

        let err = TwoPassStrategy::new(BitrateTargeter::default())
            .run(&ctx)
            .unwrap_err();

        assert_eq!(err.kind(), "encoding_failure");
        assert!(!fx.output.exists());
        assert!(dir_entries(&fx.work).is_empty());
        assert!(fx.stray_files().is_empty());
    }

    #[test]
    fn test_create_strategy_by_mode() {
        let mut config = TargetConfig::default();
        assert_eq!(create_strategy(&config).unwrap().mode(), TargetMode::CrfSearch);
        config.mode = TargetMode::TwoPass;
        let strategy = create_strategy(&config).unwrap();
        assert_eq!(strategy.mode(), TargetMode::TwoPass);
        assert!(!strategy.description().is_empty());

        config.two_pass_margin = 0.0;
        assert!(create_strategy(&config).is_err());
    }

    #[test]
    fn test_outcome_summary() {
        let outcome = TargetOutcome {
            mode: TargetMode::CrfSearch,
            output: PathBuf::from("out.mp4"),
            output_bytes: 1024,
            decision: Decision::Crf {
                crf: Crf::new(21).unwrap(),
                predicted_bytes: 2048.0,
                probes: 5,
            },
        };
        let summary = outcome.summary();
        assert!(summary.starts_with("crf-search -> out.mp4"));
        assert!(summary.contains("CRF 21"));
    }
}
