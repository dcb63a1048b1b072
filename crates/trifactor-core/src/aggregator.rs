//! Sequential-gate aggregation of modality results.
//!
//! The four factors are evaluated in the fixed order face → palm →
//! secondary factor → voice as a short-circuiting AND: the first failing
//! stage stops evaluation, later stages are never invoked and report
//! [`StageOutcome::NotAttempted`]. This prevents a weak factor from being
//! averaged up by strong factors — a security property bought with user
//! friction, since failing early means later factors are never exercised.

use crate::sample::Modality;
use crate::session::{ModalityResult, SessionError};

/// One gate in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Face,
    Palm,
    SecondaryFactor,
    Voice,
}

impl Stage {
    /// The biometric modality this stage compares, if it is one.
    pub fn modality(&self) -> Option<Modality> {
        match self {
            Stage::Face => Some(Modality::Face),
            Stage::Palm => Some(Modality::Palm),
            Stage::Voice => Some(Modality::Voice),
            Stage::SecondaryFactor => None,
        }
    }
}

/// Evaluation order. The short-circuit policy is this list, not nested
/// control flow.
pub const STAGE_ORDER: [Stage; 4] = [
    Stage::Face,
    Stage::Palm,
    Stage::SecondaryFactor,
    Stage::Voice,
];

/// What happened to one biometric stage. Skipped, no-feature, errored and
/// attempted-but-mismatched are all distinct — they require different user
/// remediation (nothing, recapture, retry later, re-enroll respectively).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// An earlier gate failed first; this stage was never evaluated.
    NotAttempted,
    /// The comparator found no usable biometric feature.
    NoFeatureDetected,
    /// Processing error (comparator runtime failure, timeout, I/O).
    Failed { reason: String },
    Completed { result: ModalityResult },
}

impl StageOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, StageOutcome::Completed { result } if result.passed)
    }

    pub fn attempted(&self) -> bool {
        !matches!(self, StageOutcome::NotAttempted)
    }
}

/// Final multi-factor decision. Terminal: handed to the reporting layer and
/// discarded, never persisted by the engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VerificationOutcome {
    pub face: StageOutcome,
    pub palm: StageOutcome,
    pub voice: StageOutcome,
    /// `None` when an earlier gate failed before the device-level check ran.
    pub secondary_factor: Option<bool>,
    pub verified: bool,
}

impl VerificationOutcome {
    fn not_attempted() -> Self {
        Self {
            face: StageOutcome::NotAttempted,
            palm: StageOutcome::NotAttempted,
            voice: StageOutcome::NotAttempted,
            secondary_factor: None,
            verified: false,
        }
    }

    fn slot_mut(&mut self, modality: Modality) -> &mut StageOutcome {
        match modality {
            Modality::Face => &mut self.face,
            Modality::Palm => &mut self.palm,
            Modality::Voice => &mut self.voice,
        }
    }
}

/// Supplies the per-stage work: a modality comparison (capture through
/// accept decision) or the device-level secondary factor check.
pub trait StageRunner {
    fn run_modality(&mut self, modality: Modality) -> Result<ModalityResult, SessionError>;

    /// Device-level authentication result, asserted by the platform layer.
    fn run_secondary_factor(&mut self) -> bool;
}

/// Walk [`STAGE_ORDER`], stopping at the first gate that does not pass.
pub fn run_pipeline(runner: &mut dyn StageRunner) -> VerificationOutcome {
    let mut outcome = VerificationOutcome::not_attempted();

    for stage in STAGE_ORDER {
        let passed = match stage.modality() {
            Some(modality) => {
                let stage_outcome = match runner.run_modality(modality) {
                    Ok(result) => StageOutcome::Completed { result },
                    Err(SessionError::NoFeatureDetected) => StageOutcome::NoFeatureDetected,
                    Err(e) => StageOutcome::Failed {
                        reason: e.to_string(),
                    },
                };
                let passed = stage_outcome.passed();
                *outcome.slot_mut(modality) = stage_outcome;
                passed
            }
            None => {
                let passed = runner.run_secondary_factor();
                outcome.secondary_factor = Some(passed);
                passed
            }
        };

        if !passed {
            tracing::info!(?stage, "verification stage failed — short-circuiting");
            return outcome;
        }
    }

    outcome.verified = true;
    outcome
}
