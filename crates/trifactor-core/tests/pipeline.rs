//! End-to-end pipeline runs with real sessions, the blink gate, and the
//! cosine comparator.

use trifactor_core::comparator::features_to_payload;
use trifactor_core::{
    run_pipeline, BiometricSample, BlinkGate, CompareError, Comparator, LandmarkFrame, Modality,
    ModalityConfig, ModalityResult, Orientation, SessionError, StageOutcome, StageRunner,
    VerificationSession,
};

/// Comparator stub emitting a scripted raw score.
struct ScoreComparator {
    modality: Modality,
    result: Result<f64, CompareError>,
}

impl Comparator for ScoreComparator {
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
    BiometricSample::new(modality, features_to_payload(&[1.0, 0.5]), Orientation::Deg0)
}

/// Runner backed by real [`VerificationSession`]s over scripted comparators.
struct SessionRunner {
    face_raw: Result<f64, CompareError>,
    palm_raw: Result<f64, CompareError>,
    voice_raw: Result<f64, CompareError>,
    secondary_passes: bool,
}

impl StageRunner for SessionRunner {
    fn run_modality(&mut self, modality: Modality) -> Result<ModalityResult, SessionError> {
        let result = match modality {
            Modality::Face => self.face_raw.clone(),
            Modality::Palm => self.palm_raw.clone(),
            Modality::Voice => self.voice_raw.clone(),
        };
        let mut session = VerificationSession::new(
            ModalityConfig::for_modality(modality),
            Box::new(ScoreComparator { modality, result }),
        )?;
        session.verify(&sample(modality), &sample(modality))
    }

    fn run_secondary_factor(&mut self) -> bool {
        self.secondary_passes
    }
}

#[test]
fn full_chain_accepts_a_matching_user() {
    let mut runner = SessionRunner {
        face_raw: Ok(0.75),
        palm_raw: Ok(0.50),
        voice_raw: Ok(0.80),
        secondary_passes: true,
    };

    let outcome = run_pipeline(&mut runner);

    assert!(outcome.verified);
    let StageOutcome::Completed { result } = &outcome.palm else {
        panic!("palm stage should complete");
    };
    // Palm raw 0.50 rescales into [0.80, 1.0]: 0.80 + 0.11 * 0.20 / 0.61.
    assert!((result.calibrated - 0.8361).abs() < 1e-4);
    assert!(result.passed);
    assert_eq!(outcome.secondary_factor, Some(true));
}

#[test]
fn missing_face_feature_stops_the_chain_immediately() {
    let mut runner = SessionRunner {
        face_raw: Err(CompareError::NoFeatureDetected),
        palm_raw: Ok(0.99),
        voice_raw: Ok(0.99),
        secondary_passes: true,
    };

    let outcome = run_pipeline(&mut runner);

    assert!(!outcome.verified);
    assert_eq!(outcome.face, StageOutcome::NoFeatureDetected);
    assert_eq!(outcome.palm, StageOutcome::NotAttempted);
    assert_eq!(outcome.voice, StageOutcome::NotAttempted);
    assert_eq!(outcome.secondary_factor, None);
}

#[test]
fn weak_voice_cannot_be_averaged_up_by_strong_factors() {
    let mut runner = SessionRunner {
        face_raw: Ok(0.99),
        palm_raw: Ok(0.99),
        voice_raw: Ok(0.10),
        secondary_passes: true,
    };

    let outcome = run_pipeline(&mut runner);

    assert!(!outcome.verified);
    assert!(outcome.face.passed());
    assert!(outcome.palm.passed());
    assert!(!outcome.voice.passed());
}

#[tokio::test]
async fn blink_gate_releases_a_face_capture() {
    let (gate, mut rx) = BlinkGate::new(None);

    // Analysis worker delivers frames; capture path awaits authorization.
    gate.arm();
    let worker = std::thread::spawn({
        let frames = vec![
            LandmarkFrame::new(0.9, 0.9),
            LandmarkFrame::absent(),
            LandmarkFrame::new(0.1, 0.2),
        ];
        move || frames.iter().map(|f| gate.observe(f)).filter(|f| *f).count()
    });

    let authorized = rx.recv().await;
    assert!(authorized.is_some());
    assert_eq!(worker.join().unwrap(), 1);
}
