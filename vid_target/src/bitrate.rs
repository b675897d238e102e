//! Two-pass bitrate planning
//!
//! Turns a byte budget and a duration into an average video bitrate and a
//! max-rate ceiling. When audio is kept its bitrate is reserved first and
//! the video gets the rest. Pure arithmetic, no encoding happens here.

use serde::Serialize;
use tracing::debug;

use shared_utils::constants::{
    BUFSIZE_MULTIPLIER, DEFAULT_MAXRATE_MULTIPLIER, DEFAULT_TWO_PASS_MARGIN,
};
use shared_utils::{FileSize, Result, SizeTargetError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BitratePlan {
    /// Average video bitrate, bits per second.
    pub target_bitrate_bps: f64,
    /// `ceil(target × multiplier)`, bits per second.
    pub max_rate_bps: u64,
    /// Reserved for the audio track, 0 when audio is dropped.
    pub audio_bitrate_bps: u64,
    pub passes: u8,
}

impl BitratePlan {
    /// Integer bitrate handed to the encoder (rounded down).
    pub fn video_bitrate(&self) -> u64 {
        self.target_bitrate_bps.floor() as u64
    }

    /// Rate-control buffer, twice the max rate.
    pub fn bufsize_bits(&self) -> u64 {
        self.max_rate_bps.saturating_mul(BUFSIZE_MULTIPLIER)
    }

    /// Size the plan aims at for `duration_secs` of video and audio.
    pub fn expected_bytes(&self, duration_secs: f64) -> f64 {
        (self.target_bitrate_bps + self.audio_bitrate_bps as f64) * duration_secs / 8.0
    }
}

/// Computes two-pass bitrate plans with a fixed margin and max-rate multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitrateTargeter {
    margin_factor: f64,
    maxrate_multiplier: f64,
    audio_reserve_bps: u64,
}

impl Default for BitrateTargeter {
    fn default() -> Self {
        Self {
            margin_factor: DEFAULT_TWO_PASS_MARGIN,
            maxrate_multiplier: DEFAULT_MAXRATE_MULTIPLIER,
            audio_reserve_bps: 0,
        }
    }
}

impl BitrateTargeter {
    pub fn new(margin_factor: f64, maxrate_multiplier: f64) -> Result<Self> {
        validate_margin(margin_factor)?;
        if !maxrate_multiplier.is_finite() || maxrate_multiplier < 1.0 {
            return Err(SizeTargetError::invalid(format!(
                "max-rate multiplier must be >= 1.0 (got {})",
                maxrate_multiplier
            )));
        }
        Ok(Self {
            margin_factor,
            maxrate_multiplier,
            audio_reserve_bps: 0,
        })
    }

    /// Sets aside `bps` of the budget for an audio track.
    pub fn with_audio_reserve(mut self, bps: u64) -> Self {
        self.audio_reserve_bps = bps;
        self
    }

    pub fn margin_factor(&self) -> f64 {
        self.margin_factor
    }

    pub fn maxrate_multiplier(&self) -> f64 {
        self.maxrate_multiplier
    }

    pub fn audio_reserve_bps(&self) -> u64 {
        self.audio_reserve_bps
    }

    pub fn plan(&self, target: FileSize, duration_secs: f64) -> Result<BitratePlan> {
        plan_bitrate(
            target.bytes(),
            duration_secs,
            self.margin_factor,
            self.maxrate_multiplier,
            self.audio_reserve_bps,
        )
    }
}

/// Margins scale a budget down, so they live in `(0, 1]`.
pub fn validate_margin(margin: f64) -> Result<f64> {
    if margin.is_finite() && margin > 0.0 && margin <= 1.0 {
        Ok(margin)
    } else {
        Err(SizeTargetError::invalid(format!(
            "margin factor must be in (0, 1] (got {})",
            margin
        )))
    }
}

/// `target = bytes × margin × 8 / duration - audio`, `max = ceil(target × multiplier)`.
pub fn plan_bitrate(
    target_bytes: u64,
    duration_secs: f64,
    margin_factor: f64,
    maxrate_multiplier: f64,
    audio_bitrate_bps: u64,
) -> Result<BitratePlan> {
    if target_bytes == 0 {
        return Err(SizeTargetError::invalid("target size must be greater than zero"));
    }
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(SizeTargetError::invalid(format!(
            "duration must be positive (got {})",
            duration_secs
        )));
    }
    validate_margin(margin_factor)?;

    let total_bps = target_bytes as f64 * margin_factor * 8.0 / duration_secs;
    let target_bitrate_bps = total_bps - audio_bitrate_bps as f64;
    if target_bitrate_bps <= 0.0 {
        return Err(SizeTargetError::invalid(format!(
            "budget of {} bps leaves no room for video next to {} bps of audio",
            total_bps.floor(),
            audio_bitrate_bps
        )));
    }
    let max_rate_bps = (target_bitrate_bps * maxrate_multiplier).ceil() as u64;

    debug!(
        target_bytes,
        duration_secs,
        margin_factor,
        audio_bitrate_bps,
        target_bitrate_bps,
        max_rate_bps,
        "Bitrate plan"
    );

    Ok(BitratePlan {
        target_bitrate_bps,
        max_rate_bps,
        audio_bitrate_bps,
        passes: 2,
    })
}
