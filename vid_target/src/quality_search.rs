//! CRF binary search
//!
//! Finds the lowest CRF (highest quality) whose predicted size fits the
//! budget. Predicted size is assumed non-increasing in CRF, so the search
//! needs at most `ceil(log2(len + 1))` probes over the window.
//!
//! Every probe that fits is recorded; the answer is the smallest recorded
//! CRF. The table of recorded estimates is logged after each probe.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use shared_utils::{format_bytes_f64, Crf, CrfRange, Result, SizeTargetError};

use crate::estimator::SizeEstimator;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub best: Crf,
    pub predicted_bytes: f64,
    /// Probes that fit the budget.
    pub estimates: BTreeMap<Crf, f64>,
    pub probes: u32,
}

impl SearchOutcome {
    pub fn estimates_table(&self) -> BTreeMap<u8, f64> {
        self.estimates.iter().map(|(c, b)| (c.value(), *b)).collect()
    }
}

pub struct QualitySearch {
    bounds: CrfRange,
    target_bytes: f64,
}

impl QualitySearch {
    pub fn new(bounds: CrfRange, target_bytes: f64) -> Result<Self> {
        if !target_bytes.is_finite() || target_bytes <= 0.0 {
            return Err(SizeTargetError::invalid(format!(
                "target size must be positive (got {})",
                target_bytes
            )));
        }
        Ok(Self {
            bounds,
            target_bytes,
        })
    }

    pub fn run(&self, estimator: &dyn SizeEstimator) -> Result<SearchOutcome> {
        let mut low = self.bounds.min().value() as i32;
        let mut high = self.bounds.max().value() as i32;
        let mut estimates = BTreeMap::new();
        let mut probes = 0u32;

        info!(
            bounds = %self.bounds,
            target = %format_bytes_f64(self.target_bytes),
            max_probes = self.bounds.max_probes(),
            "Starting CRF search"
        );

        while low <= high {
            let mid = (low + high) / 2;
            let crf = Crf::new(mid as u8)?;
            debug_assert!(self.bounds.contains(crf));
            probes += 1;

            let predicted = estimator.estimate(crf)?;

            if predicted <= self.target_bytes {
                info!(
                    crf = mid,
                    predicted = %format_bytes_f64(predicted),
                    "Fits budget, trying higher quality"
                );
                estimates.insert(crf, predicted);
                high = mid - 1;
            } else {
                warn!(
                    crf = mid,
                    predicted = %format_bytes_f64(predicted),
                    target = %format_bytes_f64(self.target_bytes),
                    "Over budget, trying lower quality"
                );
                low = mid + 1;
            }
            log_estimates(&estimates);
        }

        debug_assert!(probes <= self.bounds.max_probes());

        match estimates.iter().next() {
            Some((&best, &predicted_bytes)) => {
                info!(
                    crf = best.value(),
                    predicted = %format_bytes_f64(predicted_bytes),
                    probes,
                    "CRF search finished"
                );
                Ok(SearchOutcome {
                    best,
                    predicted_bytes,
                    estimates,
                    probes,
                })
            }
            None => Err(SizeTargetError::NoFeasibleQuality {
                min_crf: self.bounds.min().value(),
                max_crf: self.bounds.max().value(),
                target_bytes: self.target_bytes.floor() as u64,
            }),
        }
    }
}

fn log_estimates(estimates: &BTreeMap<Crf, f64>) {
    let table: BTreeMap<u8, u64> = estimates
        .iter()
        .map(|(c, b)| (c.value(), b.round() as u64))
        .collect();
    match serde_json::to_string_pretty(&table) {
        Ok(json) => debug!("Estimates so far:\n{}", json),
        Err(e) => debug!(error = %e, "Could not render estimate table"),
    }
}
