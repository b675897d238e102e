//! ffmpeg / ffprobe backed collaborators

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use shared_utils::constants::AUDIO_BITRATE_BPS;
use shared_utils::{get_duration, probe_video, run_ffmpeg, ProgressTarget, Result, SizeTargetError, VideoCodec};

use crate::tools::{EncodeOptions, Encoder, Joiner, Prober, RateControl, TwoPassStage};

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegEncoder;

impl FfmpegEncoder {
    /// Argument list for one encode, without the global flags `run_ffmpeg` adds.
    pub fn build_args(input: &Path, output: &Path, options: &EncodeOptions) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into(), "-i".into(), path_arg(input)];

        if let Some(secs) = options.duration_limit {
            args.push("-t".into());
            args.push(format!("{:.3}", secs));
        }

        match &options.rate {
            RateControl::Crf(crf) => {
                args.extend([
                    "-c:v".into(),
                    options.codec.ffmpeg_encoder().into(),
                    "-crf".into(),
                    crf.to_string(),
                ]);
            }
            RateControl::Bitrate {
                target_bps,
                max_bps,
                bufsize_bits,
                stage,
                passlog,
            } => {
                args.extend([
                    "-c:v".into(),
                    options.codec.ffmpeg_encoder().into(),
                    "-b:v".into(),
                    target_bps.to_string(),
                    "-maxrate".into(),
                    max_bps.to_string(),
                    "-bufsize".into(),
                    bufsize_bits.to_string(),
                ]);
                match options.codec {
                    VideoCodec::X264 => args.extend([
                        "-pass".into(),
                        stage.number().to_string(),
                        "-passlogfile".into(),
                        path_arg(passlog),
                    ]),
                    // libx265 ignores -pass; stats go through its own params
                    VideoCodec::X265 => args.extend([
                        "-x265-params".into(),
                        format!("pass={}:stats={}.log", stage.number(), path_arg(passlog)),
                    ]),
                }
            }
            RateControl::StreamCopy => {
                args.extend(["-c".into(), "copy".into()]);
            }
        }

        if !options.audio_enabled || options.is_analysis_pass() {
            args.push("-an".into());
        } else if options.rate != RateControl::StreamCopy {
            // fixed rate so sample probes and the two-pass reserve agree
            args.extend([
                "-c:a".into(),
                "aac".into(),
                "-b:a".into(),
                AUDIO_BITRATE_BPS.to_string(),
            ]);
        }

        if options.is_analysis_pass() {
            args.extend(["-f".into(), "null".into(), "-".into()]);
        } else {
            args.push(path_arg(output));
        }
        args
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(&self, input: &Path, output: &Path, options: &EncodeOptions) -> Result<()> {
        let args = Self::build_args(input, output, options);
        let progress = options
            .progress_secs
            .map(|secs| ProgressTarget::new(options.to_string(), secs));

        debug!(input = %input.display(), output = %output.display(), %options, "Encoding");
        let elapsed = run_ffmpeg(&args, progress).map_err(|e| SizeTargetError::EncodingFailure {
            input: input.to_path_buf(),
            context: options.to_string(),
            exit_code: e.exit_code,
            reason: e.summary(),
        })?;

        if options.is_analysis_pass() {
            return Ok(());
        }

        // ffmpeg can exit 0 without writing anything (e.g. zero-length input)
        match fs::metadata(output) {
            Ok(meta) if meta.len() > 0 => {
                debug!(
                    bytes = meta.len(),
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Encode finished"
                );
                Ok(())
            }
            _ => Err(SizeTargetError::EncodingFailure {
                input: input.to_path_buf(),
                context: options.to_string(),
                exit_code: Some(0),
                reason: format!("no output written to {}", output.display()),
            }),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FfprobeProber;

impl Prober for FfprobeProber {
    fn duration(&self, path: &Path) -> Result<f64> {
        get_duration(path)
    }

    fn has_audio(&self, path: &Path) -> Result<bool> {
        Ok(probe_video(path)?.has_audio)
    }
}

/// Joins clips with the concat demuxer and stream copy, dropping audio.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegJoiner;

/// One `file '...'` line of a concat list. Single quotes close the quoted
/// string, are escaped, then reopen it.
pub fn concat_list_entry(path: &Path) -> String {
    format!("file '{}'", path_arg(path).replace('\'', "'\\''"))
}

impl FfmpegJoiner {
    pub fn build_args(list_file: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            path_arg(list_file),
            "-c".into(),
            "copy".into(),
            "-an".into(),
            path_arg(output),
        ]
    }
}

impl Joiner for FfmpegJoiner {
    fn concatenate(&self, files: &[PathBuf], output: &Path) -> Result<()> {
        if files.is_empty() {
            return Err(SizeTargetError::ConcatenationFailure(
                "no input clips to join".to_string(),
            ));
        }

        // The concat demuxer resolves relative entries against the list file.
        let mut list = tempfile::Builder::new()
            .prefix("vid_target_concat.")
            .suffix(".txt")
            .tempfile()?;
        for file in files {
            let absolute = fs::canonicalize(file).map_err(|e| {
                SizeTargetError::ConcatenationFailure(format!(
                    "cannot read clip {}: {}",
                    file.display(),
                    e
                ))
            })?;
            writeln!(list, "{}", concat_list_entry(&absolute))?;
        }
        list.flush()?;

        info!(clips = files.len(), output = %output.display(), "Joining clips");
        let args = Self::build_args(list.path(), output);
        run_ffmpeg(&args, None)
            .map_err(|e| SizeTargetError::ConcatenationFailure(e.to_string()))?;

        match fs::metadata(output) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(SizeTargetError::ConcatenationFailure(format!(
                "no output written to {}",
                output.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::Crf;

    fn joined(args: &[String]) -> String {
        args.join(" ")
    }

    #[test]
    fn test_crf_args() {
        let opts = EncodeOptions::crf(Crf::new(23).unwrap(), VideoCodec::X264);
        let args = FfmpegEncoder::build_args(Path::new("in.mov"), Path::new("out.mp4"), &opts);
        assert_eq!(
            joined(&args),
            "-y -i in.mov -c:v libx264 -crf 23 -an out.mp4"
        );
    }

    #[test]
    fn test_crf_args_keep_audio() {
        let opts = EncodeOptions::crf(Crf::new(18).unwrap(), VideoCodec::X265).with_audio(true);
        let args = FfmpegEncoder::build_args(Path::new("in.mov"), Path::new("out.mp4"), &opts);
        assert_eq!(
            joined(&args),
            "-y -i in.mov -c:v libx265 -crf 18 -c:a aac -b:a 128000 out.mp4"
        );
    }

    #[test]
    fn test_sample_cut_keeps_audio_stream() {
        let opts = EncodeOptions::stream_copy()
            .with_duration_limit(120.0)
            .with_audio(true);
        let args = FfmpegEncoder::build_args(Path::new("full.mov"), Path::new("sample.mov"), &opts);
        assert_eq!(joined(&args), "-y -i full.mov -t 120.000 -c copy sample.mov");
    }

    #[test]
    fn test_sample_cut_args() {
        let opts = EncodeOptions::stream_copy().with_duration_limit(120.0);
        let args = FfmpegEncoder::build_args(Path::new("full.mov"), Path::new("sample.mov"), &opts);
        assert_eq!(
            joined(&args),
            "-y -i full.mov -t 120.000 -c copy -an sample.mov"
        );
    }

    fn pass(stage: TwoPassStage, codec: VideoCodec) -> EncodeOptions {
        EncodeOptions::new(
            RateControl::Bitrate {
                target_bps: 28_060_453,
                max_bps: 35_075_567,
                bufsize_bits: 70_151_134,
                stage,
                passlog: PathBuf::from("/work/passlog"),
            },
            codec,
        )
        .with_audio(true)
    }

    #[test]
    fn test_first_pass_discards_output() {
        let args = FfmpegEncoder::build_args(
            Path::new("in.mov"),
            Path::new("out.mp4"),
            &pass(TwoPassStage::Analysis, VideoCodec::X264),
        );
        assert_eq!(
            joined(&args),
            "-y -i in.mov -c:v libx264 -b:v 28060453 -maxrate 35075567 -bufsize 70151134 \
             -pass 1 -passlogfile /work/passlog -an -f null -"
        );
        assert!(!args.contains(&"out.mp4".to_string()));
    }

    #[test]
    fn test_second_pass_writes_output() {
        let args = FfmpegEncoder::build_args(
            Path::new("in.mov"),
            Path::new("out.mp4"),
            &pass(TwoPassStage::Final, VideoCodec::X264),
        );
        let line = joined(&args);
        assert!(line.contains("-pass 2 -passlogfile /work/passlog"));
        assert!(line.contains("-c:a aac -b:a 128000"));
        assert!(!line.contains("-an"));
        assert!(line.ends_with("out.mp4"));
    }

    #[test]
    fn test_x265_pass_params() {
        let args = FfmpegEncoder::build_args(
            Path::new("in.mov"),
            Path::new("out.mp4"),
            &pass(TwoPassStage::Final, VideoCodec::X265),
        );
        assert!(joined(&args).contains("-x265-params pass=2:stats=/work/passlog.log"));
        assert!(!args.contains(&"-pass".to_string()));
    }

    #[test]
    fn test_concat_list_entry_escapes_quotes() {
        assert_eq!(
            concat_list_entry(Path::new("/clips/a.mov")),
            "file '/clips/a.mov'"
        );
        assert_eq!(
            concat_list_entry(Path::new("/clips/Bob's day.mov")),
            "file '/clips/Bob'\\''s day.mov'"
        );
    }

    #[test]
    fn test_join_args() {
        let args = FfmpegJoiner::build_args(Path::new("/tmp/list.txt"), Path::new("joined.mov"));
        assert_eq!(
            joined(&args),
            "-y -f concat -safe 0 -i /tmp/list.txt -c copy -an joined.mov"
        );
    }

    #[test]
    fn test_join_rejects_empty_list() {
        let err = FfmpegJoiner
            .concatenate(&[], Path::new("/tmp/never.mov"))
            .unwrap_err();
        assert_eq!(err.kind(), "concatenation_failure");
    }

    #[test]
    fn test_join_missing_clip() {
        let err = FfmpegJoiner
            .concatenate(
                &[PathBuf::from("/nonexistent/clip.mov")],
                Path::new("/tmp/never.mov"),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "concatenation_failure");
    }
}
