//! CRF (Constant Rate Factor) Type-Safe Wrapper
//!
//! Integer CRF values and the inclusive search window they are drawn from.
//!
//! ## Design
//! - `Crf` is validated once on construction against the encoder range
//! - `CrfRange` keeps `min <= max`, so a search over it always has a candidate
//! - lower CRF means higher quality and larger output

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{SEARCH_CRF_MAX, SEARCH_CRF_MIN, X264_CRF_MAX};

// ============================================================================
// CrfError
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CrfError {
    /// CRF value outside the encoder range
    OutOfRange { value: i64, min: u8, max: u8 },
    /// Window with `min > max`
    InvertedRange { min: u8, max: u8 },
}

impl fmt::Display for CrfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrfError::OutOfRange { value, min, max } => {
                write!(f, "CRF {} out of range [{}, {}]", value, min, max)
            }
            CrfError::InvertedRange { min, max } => {
                write!(f, "CRF window [{}, {}] is empty (min > max)", min, max)
            }
        }
    }
}

impl std::error::Error for CrfError {}

impl From<CrfError> for crate::errors::SizeTargetError {
    fn from(e: CrfError) -> Self {
        crate::errors::SizeTargetError::InvalidInput(e.to_string())
    }
}

// ============================================================================
// Crf Newtype
// ============================================================================

/// A CRF value valid for both x264 and x265.
///
/// # Examples
/// ```
/// use shared_utils::types::crf::Crf;
///
/// let crf = Crf::new(23).unwrap();
/// assert_eq!(crf.value(), 23);
/// assert!(Crf::new(60).is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Crf(u8);

impl Crf {
    pub const MIN: Crf = Crf(0);
    pub const MAX: Crf = Crf(X264_CRF_MAX);

    pub fn new(value: u8) -> Result<Self, CrfError> {
        if value > X264_CRF_MAX {
            return Err(CrfError::OutOfRange {
                value: value as i64,
                min: 0,
                max: X264_CRF_MAX,
            });
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Debug for Crf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crf({})", self.0)
    }
}

impl fmt::Display for Crf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CrfRange
// ============================================================================

/// Inclusive CRF window `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrfRange {
    min: Crf,
    max: Crf,
}

impl CrfRange {
    pub fn new(min: u8, max: u8) -> Result<Self, CrfError> {
        let min = Crf::new(min)?;
        let max = Crf::new(max)?;
        if min > max {
            return Err(CrfError::InvertedRange {
                min: min.value(),
                max: max.value(),
            });
        }
        Ok(Self { min, max })
    }

    #[inline]
    pub fn min(&self) -> Crf {
        self.min
    }

    #[inline]
    pub fn max(&self) -> Crf {
        self.max
    }

    /// Number of candidate values in the window.
    pub fn len(&self) -> u32 {
        (self.max.value() - self.min.value()) as u32 + 1
    }

    pub fn contains(&self, crf: Crf) -> bool {
        crf >= self.min && crf <= self.max
    }

    /// Upper bound on probes a binary search needs: `ceil(log2(len + 1))`.
    pub fn max_probes(&self) -> u32 {
        let n = self.len() + 1;
        u32::BITS - (n - 1).leading_zeros()
    }
}

/// The default search window `[0, 35]`.
impl Default for CrfRange {
    fn default() -> Self {
        Self {
            min: Crf(SEARCH_CRF_MIN),
            max: Crf(SEARCH_CRF_MAX),
        }
    }
}

impl fmt::Display for CrfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crf_valid_range() {
        assert!(Crf::new(0).is_ok());
        assert!(Crf::new(51).is_ok());
        assert!(Crf::new(23).is_ok());
        assert!(Crf::new(52).is_err());
    }

    #[test]
    fn test_crf_ordering() {
        assert!(Crf::new(18).unwrap() < Crf::new(23).unwrap());
        assert_eq!(Crf::MIN.value(), 0);
        assert_eq!(Crf::MAX.value(), 51);
    }

    #[test]
    fn test_crf_display() {
        let crf = Crf::new(23).unwrap();
        assert_eq!(format!("{}", crf), "23");
        assert_eq!(format!("{:?}", crf), "Crf(23)");
    }

    #[test]
    fn test_range_rejects_inverted() {
        assert_eq!(
            CrfRange::new(30, 10),
            Err(CrfError::InvertedRange { min: 30, max: 10 })
        );
        assert!(CrfRange::new(0, 60).is_err());
    }

    #[test]
    fn test_range_len_and_contains() {
        let range = CrfRange::new(0, 35).unwrap();
        assert_eq!(range.len(), 36);
        assert!(range.contains(Crf::new(35).unwrap()));
        assert!(!range.contains(Crf::new(36).unwrap()));

        assert_eq!(CrfRange::default(), range);

        let single = CrfRange::new(20, 20).unwrap();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_max_probes() {
        // 36 candidates -> ceil(log2(37)) = 6
        assert_eq!(CrfRange::new(0, 35).unwrap().max_probes(), 6);
        assert_eq!(CrfRange::new(20, 20).unwrap().max_probes(), 1);
        assert_eq!(CrfRange::new(0, 2).unwrap().max_probes(), 2);
        assert_eq!(CrfRange::new(0, 51).unwrap().max_probes(), 6);
    }
}
