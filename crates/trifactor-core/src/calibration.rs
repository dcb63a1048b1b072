//! Affine score rescaling.
//!
//! Raw comparator scores live in modality-specific ranges; a calibration
//! profile maps them into a normalized [0, 1] confidence so scores can be
//! compared and reported uniformly. The mapping is a clamped affine
//! transform with a hard floor: raw scores below the original minimum are
//! calibrated to zero confidence, not to the target minimum.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("degenerate raw-score domain: min {original_min} must be below max {original_max}")]
    DegenerateDomain { original_min: f64, original_max: f64 },
    #[error("target range out of order: {target_min} > {target_max}")]
    TargetOutOfOrder { target_min: f64, target_max: f64 },
    #[error("target bounds must lie within [0, 1]: got [{target_min}, {target_max}]")]
    TargetOutOfBounds { target_min: f64, target_max: f64 },
    #[error("profile bounds must be finite")]
    NonFinite,
}

/// Per-modality affine rescaling profile, immutable and validated at
/// construction: `original_min < original_max`, `target_min <= target_max`,
/// targets within [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationProfile {
    pub(crate) original_min: f64,
    pub(crate) original_max: f64,
    pub(crate) target_min: f64,
    pub(crate) target_max: f64,
}

impl CalibrationProfile {
    pub fn new(
        original_min: f64,
        original_max: f64,
        target_min: f64,
        target_max: f64,
    ) -> Result<Self, CalibrationError> {
        if ![original_min, original_max, target_min, target_max]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(CalibrationError::NonFinite);
        }
        if original_min >= original_max {
            return Err(CalibrationError::DegenerateDomain {
                original_min,
                original_max,
            });
        }
        if target_min > target_max {
            return Err(CalibrationError::TargetOutOfOrder {
                target_min,
                target_max,
            });
        }
        if target_min < 0.0 || target_max > 1.0 {
            return Err(CalibrationError::TargetOutOfBounds {
                target_min,
                target_max,
            });
        }
        Ok(Self {
            original_min,
            original_max,
            target_min,
            target_max,
        })
    }

    /// The [0, 1] → [0, 1] identity mapping.
    pub fn identity() -> Self {
        Self {
            original_min: 0.0,
            original_max: 1.0,
            target_min: 0.0,
            target_max: 1.0,
        }
    }

    /// Map a raw score into a calibrated [0, `target_max`] confidence.
    ///
    /// Below-floor raw scores calibrate to 0.0; everything else is the
    /// affine transform clamped to at most `target_max`.
    pub fn calibrate(&self, raw: f64) -> f64 {
        if raw < self.original_min {
            return 0.0;
        }
        // Unreachable through `new`, kept as the documented fallback for a
        // degenerate domain.
        if self.original_min >= self.original_max {
            return self.target_min;
        }
        let scaled = self.target_min
            + (raw - self.original_min) * (self.target_max - self.target_min)
                / (self.original_max - self.original_min);
        scaled.min(self.target_max)
    }
}
