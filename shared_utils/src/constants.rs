//! Constants Module
//!
//! CRF ranges, size budgets and rate-control defaults shared by the size
//! targeting strategies and the CLI.

// ============================================================================
// x264/H.264 and x265/HEVC Constants
// ============================================================================

/// x264 minimum CRF (lossless)
pub const X264_CRF_MIN: u8 = 0;

/// x264 maximum CRF (lowest quality)
pub const X264_CRF_MAX: u8 = 51;

/// HEVC minimum CRF (lossless)
pub const HEVC_CRF_MIN: u8 = 0;

/// HEVC maximum CRF (lowest quality)
pub const HEVC_CRF_MAX: u8 = 51;

// ============================================================================
// Search Defaults
// ============================================================================

/// Lower end of the searched CRF window
pub const SEARCH_CRF_MIN: u8 = 0;

/// Upper end of the searched CRF window; beyond this the picture degrades too much
pub const SEARCH_CRF_MAX: u8 = 35;

/// Sample length used for size extrapolation (seconds)
pub const DEFAULT_SAMPLE_DURATION_SECS: f64 = 120.0;

/// Budget factor applied on the CRF search path (no margin)
pub const DEFAULT_SEARCH_MARGIN: f64 = 1.0;

// ============================================================================
// Two-Pass Defaults
// ============================================================================

/// Budget factor absorbing encoder overshoot and container overhead
pub const DEFAULT_TWO_PASS_MARGIN: f64 = 0.98;

/// `-maxrate` relative to the target bitrate
pub const DEFAULT_MAXRATE_MULTIPLIER: f64 = 1.25;

/// `-bufsize` relative to `-maxrate`
pub const BUFSIZE_MULTIPLIER: u64 = 2;

// ============================================================================
// Audio
// ============================================================================

/// AAC bitrate used when audio is kept; two-pass reserves it out of the budget
pub const AUDIO_BITRATE_BPS: u64 = 128_000;

// ============================================================================
// Budget / Naming
// ============================================================================

/// 2 GiB
pub const DEFAULT_TARGET_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Source clip extension (matched case-insensitively)
pub const SOURCE_CLIP_EXTENSION: &str = "mov";

/// Suffix inserted before the final `.mp4`
pub const COMPRESSED_SUFFIX: &str = "compressed";
