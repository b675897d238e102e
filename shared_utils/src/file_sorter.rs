//! File Sorting Module
//!
//! Source clips are joined in recording order: creation time first, then
//! modification time where the filesystem has no birth time, then name.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::errors::{Result, SizeTargetError};

#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub created: SystemTime,
}

impl FileInfo {
    pub fn new(path: PathBuf) -> Option<Self> {
        let created = creation_time(&path).ok()?;
        Some(FileInfo { path, created })
    }
}

/// Birth time, or modification time where birth time is unsupported.
pub fn creation_time(path: &Path) -> std::io::Result<SystemTime> {
    let meta = fs::metadata(path)?;
    meta.created().or_else(|_| meta.modified())
}

/// Oldest first; equal timestamps fall back to path order. Files whose
/// metadata cannot be read are dropped.
pub fn sort_by_creation(files: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut file_infos: Vec<FileInfo> = files.into_iter().filter_map(FileInfo::new).collect();
    file_infos.sort_by(|a, b| match a.created.cmp(&b.created) {
        Ordering::Equal => a.path.cmp(&b.path),
        other => other,
    });
    file_infos.into_iter().map(|f| f.path).collect()
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Files directly inside `dir` with the given extension (case-insensitive),
/// in creation order. Subdirectories are not descended into.
pub fn collect_source_clips(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SizeTargetError::InvalidInput(format!(
            "source directory not found: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            SizeTargetError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        if entry.file_type().is_file() && has_extension(entry.path(), extension) {
            files.push(entry.into_path());
        }
    }

    tracing::trace!(count = files.len(), dir = %dir.display(), "Source clips found");
    Ok(sort_by_creation(files))
}
