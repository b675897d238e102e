//! FileSize Type-Safe Wrapper
//!
//! Byte counts for budgets and measured outputs, with human-readable parsing
//! (`2GiB`, `700M`, `1.5G`) and display. Units are binary (1 KB = 1024 B).

use std::fmt;
use std::str::FromStr;

// ============================================================================
// FileSize Newtype
// ============================================================================

/// File size in bytes.
///
/// # Examples
/// ```
/// use shared_utils::types::file_size::FileSize;
///
/// let size: FileSize = "2GiB".parse().unwrap();
/// assert_eq!(size.bytes(), 2 * 1024 * 1024 * 1024);
/// assert_eq!(size.display(), "2.00 GB");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileSize(u64);

impl FileSize {
    pub const ZERO: FileSize = FileSize(0);

    pub const KB: u64 = 1024;
    pub const MB: u64 = 1024 * 1024;
    pub const GB: u64 = 1024 * 1024 * 1024;
    pub const TB: u64 = 1024 * 1024 * 1024 * 1024;

    #[inline]
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn from_mb(mb: u64) -> Self {
        Self(mb * Self::MB)
    }

    #[inline]
    pub const fn from_gb(gb: u64) -> Self {
        Self(gb * Self::GB)
    }

    #[inline]
    pub const fn bytes(&self) -> u64 {
        self.0
    }

    /// Size in GB as a float, for log messages.
    pub fn as_gb(&self) -> f64 {
        self.0 as f64 / Self::GB as f64
    }

    /// `self × factor` as a float, e.g. a budget with a safety margin.
    pub fn scaled(&self, factor: f64) -> f64 {
        self.0 as f64 * factor
    }

    /// Human-readable form with the unit picked automatically.
    pub fn display(&self) -> String {
        format_bytes_f64(self.0 as f64)
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// Formats a (possibly fractional) byte count, used for predicted sizes.
pub fn format_bytes_f64(bytes: f64) -> String {
    if bytes >= FileSize::GB as f64 {
        format!("{:.2} GB", bytes / FileSize::GB as f64)
    } else if bytes >= FileSize::MB as f64 {
        format!("{:.2} MB", bytes / FileSize::MB as f64)
    } else if bytes >= FileSize::KB as f64 {
        format!("{:.2} KB", bytes / FileSize::KB as f64)
    } else {
        format!("{} B", bytes.round() as u64)
    }
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ParseFileSizeError(String);

impl fmt::Display for ParseFileSizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid size '{}' (expected e.g. 2GiB, 700M, 1.5G or a byte count)",
            self.0
        )
    }
}

impl std::error::Error for ParseFileSizeError {}

impl FromStr for FileSize {
    type Err = ParseFileSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseFileSizeError(s.to_string());
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);
        let number: f64 = number.trim().parse().map_err(|_| err())?;
        if !number.is_finite() || number < 0.0 {
            return Err(err());
        }

        let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" | "kb" | "kib" => Self::KB,
            "m" | "mb" | "mib" => Self::MB,
            "g" | "gb" | "gib" => Self::GB,
            "t" | "tb" | "tib" => Self::TB,
            _ => return Err(err()),
        };

        let bytes = number * multiplier as f64;
        if bytes > u64::MAX as f64 {
            return Err(err());
        }
        Ok(FileSize(bytes.round() as u64))
    }
}

// ============================================================================
// Trait Implementations
// ============================================================================

impl fmt::Debug for FileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileSize({} = {})", self.0, self.display())
    }
}

impl fmt::Display for FileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl Default for FileSize {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<u64> for FileSize {
    fn from(bytes: u64) -> Self {
        Self::new(bytes)
    }
}

impl From<FileSize> for u64 {
    fn from(size: FileSize) -> Self {
        size.0
    }
}
