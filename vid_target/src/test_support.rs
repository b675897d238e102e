//! Deterministic collaborators for tests. Sizes are produced with
//! `set_len`, so large "encodes" stay sparse and cheap.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use shared_utils::{Crf, Result, SizeTargetError};

use crate::tools::{EncodeOptions, Encoder, Joiner, Prober, RateControl, TwoPassStage};

pub fn write_stub_file(dir: &Path, name: &str, len: u64) -> PathBuf {
    let path = dir.join(name);
    File::create(&path).unwrap().set_len(len).unwrap();
    path
}

/// Sorted directory listing, empty when the directory is gone.
pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    };
    entries.sort();
    entries
}

#[derive(Debug, Clone)]
pub struct EncodeCall {
    pub input: PathBuf,
    pub output: PathBuf,
    pub options: EncodeOptions,
}

pub struct StubEncoder {
    size_fn: Box<dyn Fn(Crf) -> u64>,
    fail_at: Vec<u8>,
    final_pass_bytes: u64,
    audio_bytes: u64,
    fail_final: bool,
    calls: RefCell<Vec<EncodeCall>>,
}

impl StubEncoder {
    /// `size_fn` gives the bytes written for a CRF encode.
    pub fn new(size_fn: impl Fn(Crf) -> u64 + 'static) -> Self {
        Self {
            size_fn: Box::new(size_fn),
            fail_at: Vec::new(),
            final_pass_bytes: 4096,
            audio_bytes: 0,
            fail_final: false,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn failing_at(mut self, crfs: &[u8]) -> Self {
        self.fail_at = crfs.to_vec();
        self
    }

    pub fn with_final_pass_bytes(mut self, bytes: u64) -> Self {
        self.final_pass_bytes = bytes;
        self
    }

    /// Bytes added to every CRF encode that keeps audio.
    pub fn with_audio_bytes(mut self, bytes: u64) -> Self {
        self.audio_bytes = bytes;
        self
    }

    /// Fails the full-length output encode (CRF or second pass).
    pub fn failing_final_encode(mut self) -> Self {
        self.fail_final = true;
        self
    }

    pub fn calls(&self) -> Vec<EncodeCall> {
        self.calls.borrow().clone()
    }

    pub fn crf_calls(&self) -> Vec<u8> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c.options.rate {
                RateControl::Crf(crf) => Some(crf.value()),
                _ => None,
            })
            .collect()
    }

    fn fail(&self, input: &Path, output: &Path, options: &EncodeOptions) -> Result<()> {
        // leave a partial file behind like an interrupted encoder would
        fs::write(output, b"partial")?;
        Err(SizeTargetError::EncodingFailure {
            input: input.to_path_buf(),
            context: options.to_string(),
            exit_code: Some(1),
            reason: "stub failure".to_string(),
        })
    }
}

impl Encoder for StubEncoder {
    fn encode(&self, input: &Path, output: &Path, options: &EncodeOptions) -> Result<()> {
        self.calls.borrow_mut().push(EncodeCall {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            options: options.clone(),
        });

        let is_final = options.progress_secs.is_some() && !options.is_analysis_pass();
        if self.fail_final && is_final {
            return self.fail(input, output, options);
        }

        match &options.rate {
            RateControl::Crf(crf) => {
                if self.fail_at.contains(&crf.value()) {
                    return self.fail(input, output, options);
                }
                let audio = if options.audio_enabled { self.audio_bytes } else { 0 };
                File::create(output)?.set_len((self.size_fn)(*crf) + audio)?;
            }
            RateControl::StreamCopy => {
                fs::copy(input, output)?;
            }
            RateControl::Bitrate {
                stage: TwoPassStage::Analysis,
                passlog,
                ..
            } => {
                let mut stats = passlog.clone().into_os_string();
                stats.push("-0.log");
                fs::write(stats, b"stats")?;
            }
            RateControl::Bitrate {
                stage: TwoPassStage::Final,
                ..
            } => {
                File::create(output)?.set_len(self.final_pass_bytes)?;
            }
        }
        Ok(())
    }
}

/// Durations keyed by file name; unknown names get the default.
pub struct StubProber {
    default_secs: f64,
    by_name: HashMap<String, f64>,
    audio: bool,
}

impl StubProber {
    pub fn new(default_secs: f64) -> Self {
        Self {
            default_secs,
            by_name: HashMap::new(),
            audio: false,
        }
    }

    /// Every probed file reports an audio stream.
    pub fn with_audio_stream(mut self) -> Self {
        self.audio = true;
        self
    }

    pub fn with(mut self, file_name: &str, secs: f64) -> Self {
        self.by_name.insert(file_name.to_string(), secs);
        self
    }
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(SizeTargetError::ProbeFailure {
            path: path.to_path_buf(),
            reason: "file not found".to_string(),
        })
    }
}

impl Prober for StubProber {
    fn duration(&self, path: &Path) -> Result<f64> {
        require_file(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let secs = self.by_name.get(&name).copied().unwrap_or(self.default_secs);
        shared_utils::ffprobe::validate_duration(secs).map_err(|reason| {
            SizeTargetError::ProbeFailure {
                path: path.to_path_buf(),
                reason,
            }
        })
    }

    fn has_audio(&self, path: &Path) -> Result<bool> {
        require_file(path)?;
        Ok(self.audio)
    }
}

#[derive(Default)]
pub struct StubJoiner {
    fail: bool,
    joined: RefCell<Vec<Vec<PathBuf>>>,
}

impl StubJoiner {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn joined(&self) -> Vec<Vec<PathBuf>> {
        self.joined.borrow().clone()
    }
}

impl Joiner for StubJoiner {
    fn concatenate(&self, files: &[PathBuf], output: &Path) -> Result<()> {
        if files.is_empty() {
            return Err(SizeTargetError::ConcatenationFailure(
                "no input clips".to_string(),
            ));
        }
        if self.fail {
            return Err(SizeTargetError::ConcatenationFailure(
                "stub failure".to_string(),
            ));
        }
        self.joined.borrow_mut().push(files.to_vec());
        let total: u64 = files
            .iter()
            .map(|f| fs::metadata(f).map(|m| m.len()).unwrap_or(0))
            .sum();
        File::create(output)?.set_len(total.max(1))?;
        Ok(())
    }
}
