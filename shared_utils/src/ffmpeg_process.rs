//! ffmpeg process handling
//!
//! When both stdout and stderr are piped but only stdout is read, ffmpeg
//! blocks once the stderr pipe buffer (~64KB) is full. `FfmpegProcess`
//! drains stderr on its own thread so progress can be read from stdout.
//!
//! ```ignore
//! use shared_utils::ffmpeg_process::{run_ffmpeg, ProgressTarget};
//!
//! let args = vec!["-y".to_string(), "-i".to_string(), "in.mov".to_string(), "out.mp4".to_string()];
//! run_ffmpeg(&args, Some(ProgressTarget::new("Encoding", 1800.0)))?;
//! ```

use std::io::{self, BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::logging::log_external_tool;
use crate::progress::create_progress_bar;

// ═══════════════════════════════════════════════════════════════
// FfmpegProcess
// ═══════════════════════════════════════════════════════════════

pub struct FfmpegProcess {
    child: Child,
    stderr_thread: Option<JoinHandle<String>>,
}

impl FfmpegProcess {
    /// Spawns the command with piped stdout/stderr; stderr is collected on a
    /// background thread.
    pub fn spawn(cmd: &mut Command) -> io::Result<Self> {
        info!(command = ?cmd, "Executing FFmpeg command");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture FFmpeg stderr"))?;

        let stderr_thread = thread::spawn(move || {
            let mut buf = String::new();
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(|l| l.ok()) {
                buf.push_str(&line);
                buf.push('\n');
            }
            buf
        });

        Ok(Self {
            child,
            stderr_thread: Some(stderr_thread),
        })
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Waits for exit and returns the status with everything written to stderr.
    pub fn wait_with_output(mut self) -> io::Result<(ExitStatus, String)> {
        let status = self.child.wait()?;
        let stderr = self
            .stderr_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();
        Ok((status, stderr))
    }
}

// ═══════════════════════════════════════════════════════════════
// FfmpegProgressParser (`-progress pipe:1`)
// ═══════════════════════════════════════════════════════════════

/// Parses ffmpeg progress lines into a completion fraction.
///
/// Understands the `-progress` key/value format (`out_time_us=`,
/// `out_time=`, `frame=`, `speed=`, `progress=end`) as well as the
/// `time=HH:MM:SS.ms` token of classic stats lines.
#[derive(Debug, Clone)]
pub struct FfmpegProgressParser {
    total_duration: f64,
    current_frame: u64,
    current_time: f64,
    current_speed: f64,
    finished: bool,
}

impl FfmpegProgressParser {
    pub fn with_duration(total_duration: f64) -> Self {
        Self {
            total_duration,
            current_frame: 0,
            current_time: 0.0,
            current_speed: 0.0,
            finished: false,
        }
    }

    /// Returns progress in `0.0..=1.0` when it can be computed.
    pub fn parse_line(&mut self, line: &str) -> Option<f64> {
        let line = line.trim();

        if let Some(us) = line
            .strip_prefix("out_time_us=")
            .or_else(|| line.strip_prefix("out_time_ms="))
        {
            // ffmpeg reports microseconds under both keys
            if let Ok(us) = us.trim().parse::<i64>() {
                self.current_time = us.max(0) as f64 / 1_000_000.0;
            }
        } else if let Some(time_str) = line.strip_prefix("out_time=") {
            if let Some(time) = Self::parse_time(time_str.trim()) {
                self.current_time = time;
            }
        } else if let Some(time_str) = line.strip_prefix("time=") {
            if let Some(time) = Self::parse_time(time_str.split_whitespace().next()?) {
                self.current_time = time;
            }
        } else if let Some(frame_str) = line.strip_prefix("frame=") {
            if let Ok(frame) = frame_str.split_whitespace().next()?.parse::<u64>() {
                self.current_frame = frame;
            }
        } else if let Some(speed_str) = line.strip_prefix("speed=") {
            if let Ok(speed) = speed_str.trim().trim_end_matches('x').parse::<f64>() {
                self.current_speed = speed;
            }
        } else if line == "progress=end" {
            self.finished = true;
        }

        self.calculate_progress()
    }

    /// Parses `HH:MM:SS.micros` into seconds.
    fn parse_time(time_str: &str) -> Option<f64> {
        let parts: Vec<&str> = time_str.split(':').collect();
        if parts.len() != 3 {
            return None;
        }

        let hours: f64 = parts[0].parse().ok()?;
        let minutes: f64 = parts[1].parse().ok()?;
        let seconds: f64 = parts[2].parse().ok()?;

        Some(hours * 3600.0 + minutes * 60.0 + seconds)
    }

    fn calculate_progress(&self) -> Option<f64> {
        if self.finished {
            return Some(1.0);
        }
        if self.total_duration > 0.0 && self.current_time > 0.0 {
            return Some((self.current_time / self.total_duration).min(1.0));
        }
        None
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn current_speed(&self) -> f64 {
        self.current_speed
    }
}

// ═══════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════

/// Picks the last line mentioning "Error"/"error"; otherwise the last
/// non-progress line; otherwise "Unknown FFmpeg error".
pub fn format_ffmpeg_error(stderr: &str) -> String {
    if let Some(error_line) = stderr
        .lines()
        .rev()
        .find(|line| line.contains("Error") || line.contains("error"))
    {
        return error_line.trim().to_string();
    }

    stderr
        .lines()
        .rev()
        .find(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("frame=")
                && !trimmed.starts_with("fps=")
                && !trimmed.starts_with("size=")
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "Unknown FFmpeg error".to_string())
}

/// A failed ffmpeg run.
#[derive(Debug, Clone)]
pub struct FfmpegError {
    pub command: String,
    pub stderr: String,
    /// `None` when the process could not be started or was killed by a signal.
    pub exit_code: Option<i32>,
}

impl FfmpegError {
    /// The most relevant stderr line.
    pub fn summary(&self) -> String {
        format_ffmpeg_error(&self.stderr)
    }
}

impl std::fmt::Display for FfmpegError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "ffmpeg exited with {}: {}", code, self.summary()),
            None => write!(f, "ffmpeg did not complete: {}", self.summary()),
        }
    }
}

impl std::error::Error for FfmpegError {}

// ═══════════════════════════════════════════════════════════════
// run_ffmpeg
// ═══════════════════════════════════════════════════════════════

/// Progress bar settings for a run whose output length is known.
#[derive(Debug, Clone)]
pub struct ProgressTarget {
    pub label: String,
    pub total_secs: f64,
}

impl ProgressTarget {
    pub fn new(label: impl Into<String>, total_secs: f64) -> Self {
        Self {
            label: label.into(),
            total_secs,
        }
    }
}

pub fn is_ffmpeg_available() -> bool {
    which::which("ffmpeg").is_ok()
}

/// Runs ffmpeg to completion, blocking. With a `ProgressTarget` the run
/// reports through `-progress pipe:1` into a progress bar.
pub fn run_ffmpeg(args: &[String], progress: Option<ProgressTarget>) -> Result<Duration, FfmpegError> {
    let mut full_args: Vec<String> = vec!["-hide_banner".to_string(), "-nostdin".to_string()];
    if progress.is_some() {
        full_args.extend(["-progress", "pipe:1", "-nostats"].map(String::from));
    }
    full_args.extend_from_slice(args);

    let arg_refs: Vec<&str> = full_args.iter().map(String::as_str).collect();
    let command = format!("ffmpeg {}", arg_refs.join(" "));
    let started = Instant::now();

    let mut cmd = Command::new("ffmpeg");
    cmd.args(&full_args);
    let mut process = FfmpegProcess::spawn(&mut cmd).map_err(|e| FfmpegError {
        command: command.clone(),
        stderr: format!("failed to spawn ffmpeg: {}", e),
        exit_code: None,
    })?;

    if let Some(stdout) = process.take_stdout() {
        match progress {
            Some(target) => {
                let pb = create_progress_bar(1000, &target.label);
                let mut parser = FfmpegProgressParser::with_duration(target.total_secs);
                for line in BufReader::new(stdout).lines().map_while(|l| l.ok()) {
                    if let Some(fraction) = parser.parse_line(&line) {
                        pb.set_position((fraction * 1000.0) as u64);
                        pb.set_message(format!(
                            "frame {} @ {:.2}x",
                            parser.current_frame(),
                            parser.current_speed()
                        ));
                    }
                }
                pb.finish_and_clear();
            }
            None => {
                let mut stdout = stdout;
                let _ = io::copy(&mut stdout, &mut io::sink());
            }
        }
    }

    let (status, stderr) = process.wait_with_output().map_err(|e| FfmpegError {
        command: command.clone(),
        stderr: format!("failed to wait for ffmpeg: {}", e),
        exit_code: None,
    })?;
    let elapsed = started.elapsed();

    log_external_tool("ffmpeg", &arg_refs, &stderr, status.code(), elapsed);

    if status.success() {
        debug!(elapsed_secs = elapsed.as_secs_f64(), "ffmpeg run finished");
        Ok(elapsed)
    } else {
        Err(FfmpegError {
            command,
            stderr,
            exit_code: status.code(),
        })
    }
}
