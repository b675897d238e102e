//! Type-Safe Wrappers Module
//!
//! ## Modules
//! - `crf`: CRF value and search window
//! - `file_size`: byte counts with human-readable parsing

pub mod crf;
pub mod file_size;

// Re-exports for convenience
pub use crf::{Crf, CrfError, CrfRange};
pub use file_size::{format_bytes_f64, FileSize, ParseFileSizeError};

// ============================================================================
// Property-Based Tests
// ============================================================================
