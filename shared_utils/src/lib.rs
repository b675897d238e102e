//! Shared Utilities for vid-target
//!
//! Common functionality behind the size targeting tool:
//! - Error types shared by every collaborator
//! - Typed CRF values, CRF windows and byte sizes
//! - FFprobe wrapper for duration and stream summary
//! - FFmpeg process runner (deadlock-free stderr draining, progress bar)
//! - Source clip enumeration in recording order
//! - Logging setup and external tool logging

pub mod codecs;
pub mod constants;
pub mod errors;
pub mod ffmpeg_process;
pub mod ffprobe;
pub mod file_sorter;
pub mod logging;
pub mod progress;
pub mod types;

pub use codecs::VideoCodec;
pub use errors::{Result, SizeTargetError};
pub use ffmpeg_process::{
    format_ffmpeg_error, is_ffmpeg_available, run_ffmpeg, FfmpegError, FfmpegProcess,
    FfmpegProgressParser, ProgressTarget,
};
pub use ffprobe::{get_duration, is_ffprobe_available, probe_video, FFprobeResult};
pub use file_sorter::{collect_source_clips, creation_time, sort_by_creation};
pub use progress::{create_progress_bar, format_duration};
pub use types::{format_bytes_f64, Crf, CrfError, CrfRange, FileSize};
