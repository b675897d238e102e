//! Pipeline
//!
//! Source clips → joined full video → size-targeted encode.
//! - Clips: `*.mov` directly inside the source directory, recording order
//! - Joined: `<output_dir>/<YYYY.MM.DD>.<Descriptor>.mov`, date of the first clip
//! - Final: `<output_dir>/<YYYY.MM.DD>.<Descriptor>.compressed.mp4`
//!
//! Scratch files (sample, probe encodes, pass logs) live in a hidden work
//! directory inside the output directory and are removed however the run ends.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::{info, warn};

use shared_utils::constants::{COMPRESSED_SUFFIX, SOURCE_CLIP_EXTENSION};
use shared_utils::{collect_source_clips, creation_time, Result, SizeTargetError};

use crate::config::{validate_descriptor, TargetConfig};
use crate::strategy::{create_strategy, TargetContext, TargetOutcome};
use crate::tools::{Encoder, Joiner, Prober};

/// The three external collaborators a run needs.
pub struct Toolchain<'a> {
    pub encoder: &'a dyn Encoder,
    pub prober: &'a dyn Prober,
    pub joiner: &'a dyn Joiner,
}

/// `YYYY.MM.DD` in local time.
pub fn date_stamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%Y.%m.%d").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    pub joined: PathBuf,
    pub compressed: PathBuf,
}

impl OutputNames {
    pub fn new(output_dir: &Path, date: &str, descriptor: &str) -> Self {
        let base = format!("{}.{}", date, descriptor);
        Self {
            joined: output_dir.join(format!("{}.{}", base, SOURCE_CLIP_EXTENSION)),
            compressed: output_dir.join(format!("{}.{}.mp4", base, COMPRESSED_SUFFIX)),
        }
    }

    /// Names for an existing full video: it is its own "joined" file.
    pub fn for_input(output_dir: &Path, input: &Path) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        Self {
            joined: input.to_path_buf(),
            compressed: output_dir.join(format!("{}.{}.mp4", stem, COMPRESSED_SUFFIX)),
        }
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove file"),
    }
}

/// Joins the source clips. A partially written joined file is removed.
///
/// When the output directory is the source directory, a joined file left by
/// an earlier run is not treated as a clip.
fn join_source_clips(config: &TargetConfig, joiner: &dyn Joiner) -> Result<OutputNames> {
    let descriptor = validate_descriptor(&config.descriptor)?;
    let no_clips = || {
        SizeTargetError::ConcatenationFailure(format!(
            "no .{} clips in {}",
            SOURCE_CLIP_EXTENSION,
            config.source_dir.display()
        ))
    };
    let mut clips = collect_source_clips(&config.source_dir, SOURCE_CLIP_EXTENSION)?;
    let first = clips.first().ok_or_else(no_clips)?;

    let names = OutputNames::new(&config.output_dir, &date_stamp(creation_time(first)?), descriptor);
    clips.retain(|clip| {
        let stale = is_same_file(clip, &names.joined);
        if stale {
            info!(path = %clip.display(), "Skipping joined video from an earlier run");
        }
        !stale
    });
    if clips.is_empty() {
        return Err(no_clips());
    }
    info!(
        clips = clips.len(),
        joined = %names.joined.display(),
        "🔗 Joining source clips"
    );

    if let Err(e) = joiner.concatenate(&clips, &names.joined) {
        remove_if_present(&names.joined);
        return Err(e);
    }
    Ok(names)
}

pub fn run_pipeline(config: &TargetConfig, tools: &Toolchain) -> Result<TargetOutcome> {
    config.validate()?;
    fs::create_dir_all(&config.output_dir)?;

    let (names, joined_here) = match &config.input {
        Some(input) => {
            if !input.is_file() {
                return Err(SizeTargetError::invalid(format!(
                    "input video not found: {}",
                    input.display()
                )));
            }
            (OutputNames::for_input(&config.output_dir, input), false)
        }
        None => (join_source_clips(config, tools.joiner)?, true),
    };

    let result = target_size(config, tools, &names);

    if joined_here && config.discard_joined {
        info!(path = %names.joined.display(), "Removing joined video");
        remove_if_present(&names.joined);
    }
    result
}

fn target_size(config: &TargetConfig, tools: &Toolchain, names: &OutputNames) -> Result<TargetOutcome> {
    let full_duration = tools.prober.duration(&names.joined)?;
    let strategy = create_strategy(config)?;
    info!(
        mode = %strategy.mode(),
        duration_secs = full_duration,
        budget = %config.target.display(),
        "🎯 {}",
        strategy.description()
    );

    let work_dir = tempfile::Builder::new()
        .prefix(".vid_target.work.")
        .tempdir_in(&config.output_dir)?;

    let keep_audio = config.keep_audio && tools.prober.has_audio(&names.joined)?;
    if config.keep_audio && !keep_audio {
        info!("Input has no audio stream, encoding video only");
    }

    let ctx = TargetContext {
        encoder: tools.encoder,
        prober: tools.prober,
        input: &names.joined,
        output: &names.compressed,
        full_duration,
        work_dir: work_dir.path(),
        budget: config.target,
        codec: config.codec,
        keep_audio,
    };
    let outcome = strategy.run(&ctx)?;

    if let Err(e) = work_dir.close() {
        warn!(error = %e, "Could not remove work directory");
    }
    Ok(outcome)
}
