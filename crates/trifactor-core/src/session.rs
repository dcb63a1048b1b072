//! Per-modality verification session: compare → calibrate → accept.

use thiserror::Error;

use crate::comparator::{CompareError, Comparator, ModalityConfig};
use crate::sample::{BiometricSample, Modality};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    /// The comparator found no usable biometric feature; the session is
    /// back in a re-capturable state.
    #[error("no comparable biometric feature detected")]
    NoFeatureDetected,
    #[error("session configured for {expected} but comparator handles {got}")]
    WrongComparator { expected: Modality, got: Modality },
    #[error(transparent)]
    Comparator(CompareError),
}

/// Outcome of one modality's verification attempt. Created once, never
/// mutated, consumed by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ModalityResult {
    pub modality: Modality,
    pub raw: f64,
    pub calibrated: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingCapture,
    Comparing,
    Complete,
    /// A previous attempt failed; the caller may capture again.
    Recapture,
}

/// Sequences one modality's capture → compare → calibrate → record cycle.
///
/// Steps within a session are strictly ordered; session state must not be
/// shared across concurrent verification attempts for the same user. The
/// session never retries on its own — after a failure it parks in
/// [`SessionState::Recapture`] and the decision to try again is the
/// caller's.
pub struct VerificationSession {
    config: ModalityConfig,
    comparator: Box<dyn Comparator>,
    state: SessionState,
}

impl std::fmt::Debug for VerificationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationSession")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl VerificationSession {
    pub fn new(
        config: ModalityConfig,
        comparator: Box<dyn Comparator>,
    ) -> Result<Self, SessionError> {
        if comparator.modality() != config.modality {
            return Err(SessionError::WrongComparator {
                expected: config.modality,
                got: comparator.modality(),
            });
        }
        Ok(Self {
            config,
            comparator,
            state: SessionState::AwaitingCapture,
        })
    }

    pub fn config(&self) -> &ModalityConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether capture must wait for a blink authorization. Only the face
    /// factor is liveness-gated; palm and voice captures are direct user
    /// actions.
    pub fn needs_liveness_gate(&self) -> bool {
        self.config.modality == Modality::Face
    }

    /// Run the compare → calibrate → accept sequence for one captured probe
    /// against the enrolled reference.
    pub fn verify(
        &mut self,
        reference: &BiometricSample,
        probe: &BiometricSample,
    ) -> Result<ModalityResult, SessionError> {
        self.state = SessionState::Comparing;

        let raw = match self.comparator.compare(reference, probe) {
            Ok(raw) => raw,
            Err(CompareError::NoFeatureDetected) => {
                tracing::info!(modality = %self.config.modality, "no feature detected");
                self.state = SessionState::Recapture;
                return Err(SessionError::NoFeatureDetected);
            }
            Err(e) => {
                tracing::warn!(modality = %self.config.modality, error = %e, "comparison failed");
                self.state = SessionState::Recapture;
                return Err(SessionError::Comparator(e));
            }
        };

        let calibrated = self.config.calibration.calibrate(raw);
        let passed = self.config.accept.accepts(raw, calibrated);
        self.state = SessionState::Complete;

        tracing::debug!(
            modality = %self.config.modality,
            raw,
            calibrated,
            passed,
            "modality verified"
        );

        Ok(ModalityResult {
            modality: self.config.modality,
            raw,
            calibrated,
            passed,
        })
    }

    /// Return to a capturable state for a fresh attempt.
    pub fn reset(&mut self) {
        self.state = SessionState::AwaitingCapture;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::features_to_payload;
    use crate::sample::Orientation;

    /// Comparator returning a fixed score or error.
    struct FixedComparator {
        modality: Modality,
        result: Result<f64, CompareError>,
    }

    impl Comparator for FixedComparator {
        fn modality(&self) -> Modality {
            self.modality
        }

        fn compare(
            &self,
            _reference: &BiometricSample,
            _probe: &BiometricSample,
        ) -> Result<f64, CompareError> {
            self.result.clone()
        }
    }

    fn sample(modality: Modality) -> BiometricSample {
        BiometricSample::new(modality, features_to_payload(&[1.0]), Orientation::Deg0)
    }

    fn session_with(modality: Modality, result: Result<f64, CompareError>) -> VerificationSession {
        VerificationSession::new(
            ModalityConfig::for_modality(modality),
            Box::new(FixedComparator { modality, result }),
        )
        .unwrap()
    }

    #[test]
    fn face_accepts_on_the_raw_score() {
        let mut s = session_with(Modality::Face, Ok(0.75));
        let result = s.verify(&sample(Modality::Face), &sample(Modality::Face)).unwrap();
        assert!(result.passed);
        assert_eq!(result.raw, 0.75);
        assert_eq!(s.state(), SessionState::Complete);
    }

    #[test]
    fn face_at_threshold_is_rejected() {
        // Strictly-greater rule: 0.60 exactly does not pass.
        let mut s = session_with(Modality::Face, Ok(0.60));
        let result = s.verify(&sample(Modality::Face), &sample(Modality::Face)).unwrap();
        assert!(!result.passed);
    }

    #[test]
    fn palm_accepts_on_the_calibrated_score() {
        let mut s = session_with(Modality::Palm, Ok(0.50));
        let result = s.verify(&sample(Modality::Palm), &sample(Modality::Palm)).unwrap();
        assert!((result.calibrated - 0.8361).abs() < 1e-4);
        assert!(result.passed);
    }

    #[test]
    fn palm_below_floor_is_rejected() {
        let mut s = session_with(Modality::Palm, Ok(0.20));
        let result = s.verify(&sample(Modality::Palm), &sample(Modality::Palm)).unwrap();
        assert_eq!(result.calibrated, 0.0);
        assert!(!result.passed);
    }

    #[test]
    fn voice_threshold_is_strict() {
        let mut s = session_with(Modality::Voice, Ok(0.75));
        let result = s.verify(&sample(Modality::Voice), &sample(Modality::Voice)).unwrap();
        assert!(!result.passed);

        let mut s = session_with(Modality::Voice, Ok(0.80));
        let result = s.verify(&sample(Modality::Voice), &sample(Modality::Voice)).unwrap();
        assert!(result.passed);
    }

    #[test]
    fn no_feature_parks_in_recapture() {
        let mut s = session_with(Modality::Face, Err(CompareError::NoFeatureDetected));
        let err = s.verify(&sample(Modality::Face), &sample(Modality::Face)).unwrap_err();
        assert_eq!(err, SessionError::NoFeatureDetected);
        assert_eq!(s.state(), SessionState::Recapture);

        s.reset();
        assert_eq!(s.state(), SessionState::AwaitingCapture);
    }

    #[test]
    fn comparator_failure_is_propagated_not_swallowed() {
        let mut s = session_with(
            Modality::Palm,
            Err(CompareError::Failed("model runtime error".into())),
        );
        let err = s.verify(&sample(Modality::Palm), &sample(Modality::Palm)).unwrap_err();
        assert!(matches!(err, SessionError::Comparator(CompareError::Failed(_))));
        assert_eq!(s.state(), SessionState::Recapture);
    }

    #[test]
    fn mismatched_comparator_rejected_at_construction() {
        let err = VerificationSession::new(
            ModalityConfig::face(),
            Box::new(FixedComparator {
                modality: Modality::Palm,
                result: Ok(1.0),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::WrongComparator { .. }));
    }

    #[test]
    fn only_face_is_liveness_gated() {
        assert!(session_with(Modality::Face, Ok(1.0)).needs_liveness_gate());
        assert!(!session_with(Modality::Palm, Ok(1.0)).needs_liveness_gate());
        assert!(!session_with(Modality::Voice, Ok(1.0)).needs_liveness_gate());
    }
}
