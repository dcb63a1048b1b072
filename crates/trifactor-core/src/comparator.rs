//! Modality comparator contract and per-modality acceptance configuration.

use thiserror::Error;

use crate::calibration::CalibrationProfile;
use crate::sample::{BiometricSample, Modality};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompareError {
    /// The expected biometric feature could not be located in one or both
    /// samples. Distinct from a genuine low-similarity score of 0.0.
    #[error("no comparable biometric feature detected")]
    NoFeatureDetected,
    #[error("modality mismatch: reference is {reference}, probe is {probe}")]
    ModalityMismatch {
        reference: Modality,
        probe: Modality,
    },
    #[error("comparison failed: {0}")]
    Failed(String),
}

/// Compares two samples of one modality and produces a raw similarity score.
///
/// Preconditions: both samples carry this comparator's modality and are in
/// canonical upright orientation — rotation correction is the capture
/// layer's job (see [`ModalityConfig::rotation_correction_degrees`]).
/// Implementations may be long-running and must be driven off the capture
/// and frame-analysis threads; they read the sample bytes and nothing else.
pub trait Comparator: Send {
    fn modality(&self) -> Modality;

    fn compare(
        &self,
        reference: &BiometricSample,
        probe: &BiometricSample,
    ) -> Result<f64, CompareError>;
}

/// Which score the acceptance threshold is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBasis {
    Raw,
    Calibrated,
}

/// Per-modality acceptance rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptRule {
    pub basis: ScoreBasis,
    pub threshold: f64,
    /// `true`: score >= threshold passes; `false`: strictly greater only.
    pub inclusive: bool,
}

impl AcceptRule {
    pub fn accepts(&self, raw: f64, calibrated: f64) -> bool {
        let score = match self.basis {
            ScoreBasis::Raw => raw,
            ScoreBasis::Calibrated => calibrated,
        };
        if self.inclusive {
            score >= self.threshold
        } else {
            score > self.threshold
        }
    }
}

/// Everything the pipeline needs to know about one modality: how to accept,
/// how to calibrate, and how far the capture layer must rotate samples
/// before they are upright.
#[derive(Debug, Clone, PartialEq)]
pub struct ModalityConfig {
    pub modality: Modality,
    pub accept: AcceptRule,
    pub calibration: CalibrationProfile,
    /// Degrees the capture layer applies before presenting a sample.
    /// Device- and sensor-specific; −90 for the front camera, +90 for the
    /// back camera on the reference hardware.
    pub rotation_correction_degrees: i32,
}

impl ModalityConfig {
    /// Face: accepted on the *raw* score, strictly above 0.60.
    ///
    /// The raw basis (rather than calibrated, as palm uses) is deliberate
    /// behavioral parity with the observed system; see DESIGN.md before
    /// unifying the two.
    pub fn face() -> Self {
        Self {
            modality: Modality::Face,
            accept: AcceptRule {
                basis: ScoreBasis::Raw,
                threshold: 0.60,
                inclusive: false,
            },
            calibration: CalibrationProfile::identity(),
            rotation_correction_degrees: -90,
        }
    }

    /// Palm: raw similarity rescaled from [0.39, 1.0] into [0.80, 1.0],
    /// accepted at a calibrated 0.75 or better.
    pub fn palm() -> Self {
        Self {
            modality: Modality::Palm,
            accept: AcceptRule {
                basis: ScoreBasis::Calibrated,
                threshold: 0.75,
                inclusive: true,
            },
            calibration: CalibrationProfile {
                original_min: 0.39,
                original_max: 1.0,
                target_min: 0.80,
                target_max: 1.0,
            },
            rotation_correction_degrees: 90,
        }
    }

    /// Voice: the upstream speaker model already emits a [0, 1] confidence,
    /// so calibration is the identity; accepted strictly above 0.75.
    pub fn voice() -> Self {
        Self {
            modality: Modality::Voice,
            accept: AcceptRule {
                basis: ScoreBasis::Calibrated,
                threshold: 0.75,
                inclusive: false,
            },
            calibration: CalibrationProfile::identity(),
            rotation_correction_degrees: 0,
        }
    }

    pub fn for_modality(modality: Modality) -> Self {
        match modality {
            Modality::Face => Self::face(),
            Modality::Palm => Self::palm(),
            Modality::Voice => Self::voice(),
        }
    }
}

/// Cosine similarity over little-endian f32 feature vectors.
///
/// Upstream feature extraction (face embedding network, palm feature
/// transform, voice model) is external; this comparator consumes the
/// resulting vectors as sample payloads. Container payloads such as a
/// WAV-wrapped recording are refused — samples enrolled as raw recordings
/// need a backend that runs its own feature extraction. Similarity is
/// clamped into [0, 1].
pub struct CosineComparator {
    modality: Modality,
}

impl CosineComparator {
    pub fn new(modality: Modality) -> Self {
        Self { modality }
    }
}

impl Comparator for CosineComparator {
    fn modality(&self) -> Modality {
        self.modality
    }

    fn compare(
        &self,
        reference: &BiometricSample,
        probe: &BiometricSample,
    ) -> Result<f64, CompareError> {
        if reference.modality() != probe.modality() {
            return Err(CompareError::ModalityMismatch {
                reference: reference.modality(),
                probe: probe.modality(),
            });
        }
        if reference.modality() != self.modality {
            return Err(CompareError::Failed(format!(
                "{} comparator given {} samples",
                self.modality,
                reference.modality()
            )));
        }

        let a = decode_features(reference.payload())?;
        let b = decode_features(probe.payload())?;
        if a.len() != b.len() {
            return Err(CompareError::Failed(format!(
                "feature dimension mismatch: {} vs {}",
                a.len(),
                b.len()
            )));
        }

        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;
        for (&x, &y) in a.iter().zip(b.iter()) {
            dot += f64::from(x) * f64::from(y);
            norm_a += f64::from(x) * f64::from(x);
            norm_b += f64::from(y) * f64::from(y);
        }
        if norm_a == 0.0 || norm_b == 0.0 {
            return Err(CompareError::NoFeatureDetected);
        }

        Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0))
    }
}

/// Decode a little-endian f32 feature vector from a sample payload.
///
/// Empty payloads mean the upstream extractor found nothing to encode.
fn decode_features(payload: &[u8]) -> Result<Vec<f32>, CompareError> {
    if payload.is_empty() {
        return Err(CompareError::NoFeatureDetected);
    }
    // A RIFF container is a raw recording, not a feature vector; its header
    // bytes would decode to garbage f32s and a meaningless similarity.
    if payload.starts_with(b"RIFF") {
        return Err(CompareError::Failed(
            "audio container payload; feature extraction must run first".into(),
        ));
    }
    if payload.len() % 4 != 0 {
        return Err(CompareError::Failed(format!(
            "feature payload length {} is not a multiple of 4",
            payload.len()
        )));
    }

    let mut values = Vec::with_capacity(payload.len() / 4);
    for chunk in payload.chunks_exact(4) {
        let v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if !v.is_finite() {
            return Err(CompareError::Failed("non-finite feature value".into()));
        }
        values.push(v);
    }
    Ok(values)
}

/// Encode an f32 feature vector as a sample payload.
pub fn features_to_payload(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for &v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Orientation;

    fn sample(modality: Modality, features: &[f32]) -> BiometricSample {
        BiometricSample::new(modality, features_to_payload(features), Orientation::Deg0)
    }

    #[test]
    fn identical_vectors_score_one() {
        let cmp = CosineComparator::new(Modality::Face);
        let a = sample(Modality::Face, &[0.1, 0.2, 0.3, 0.4]);
        let score = cmp.compare(&a, &a.clone()).unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let cmp = CosineComparator::new(Modality::Face);
        let a = sample(Modality::Face, &[1.0, 0.0]);
        let b = sample(Modality::Face, &[0.0, 1.0]);
        assert_eq!(cmp.compare(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn opposed_vectors_clamp_to_zero() {
        let cmp = CosineComparator::new(Modality::Face);
        let a = sample(Modality::Face, &[1.0, 0.0]);
        let b = sample(Modality::Face, &[-1.0, 0.0]);
        assert_eq!(cmp.compare(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn empty_payload_is_no_feature() {
        let cmp = CosineComparator::new(Modality::Face);
        let a = sample(Modality::Face, &[]);
        let b = sample(Modality::Face, &[1.0]);
        assert_eq!(cmp.compare(&a, &b).unwrap_err(), CompareError::NoFeatureDetected);
    }

    #[test]
    fn zero_norm_is_no_feature() {
        let cmp = CosineComparator::new(Modality::Face);
        let a = sample(Modality::Face, &[0.0, 0.0]);
        let b = sample(Modality::Face, &[1.0, 0.0]);
        assert_eq!(cmp.compare(&a, &b).unwrap_err(), CompareError::NoFeatureDetected);
    }

    #[test]
    fn modality_mismatch_rejected() {
        let cmp = CosineComparator::new(Modality::Face);
        let a = sample(Modality::Face, &[1.0]);
        let b = sample(Modality::Palm, &[1.0]);
        assert!(matches!(
            cmp.compare(&a, &b).unwrap_err(),
            CompareError::ModalityMismatch { .. }
        ));
    }

    #[test]
    fn dimension_mismatch_is_a_failure() {
        let cmp = CosineComparator::new(Modality::Palm);
        let a = sample(Modality::Palm, &[1.0, 2.0]);
        let b = sample(Modality::Palm, &[1.0]);
        assert!(matches!(
            cmp.compare(&a, &b).unwrap_err(),
            CompareError::Failed(_)
        ));
    }

    #[test]
    fn wav_container_payload_is_refused() {
        let cmp = CosineComparator::new(Modality::Voice);
        let wav = crate::wav::write_wav(&[0u8; 64], crate::wav::WavSpec::voice()).unwrap();
        let a = BiometricSample::new(Modality::Voice, wav, Orientation::Deg0);
        let b = sample(Modality::Voice, &[1.0]);
        assert!(matches!(
            cmp.compare(&a, &b).unwrap_err(),
            CompareError::Failed(_)
        ));
    }

    #[test]
    fn ragged_payload_is_a_failure() {
        let cmp = CosineComparator::new(Modality::Voice);
        let a = BiometricSample::new(Modality::Voice, vec![1, 2, 3], Orientation::Deg0);
        let b = sample(Modality::Voice, &[1.0]);
        assert!(matches!(
            cmp.compare(&a, &b).unwrap_err(),
            CompareError::Failed(_)
        ));
    }

    #[test]
    fn accept_rule_bases_and_strictness() {
        let raw_rule = AcceptRule {
            basis: ScoreBasis::Raw,
            threshold: 0.60,
            inclusive: false,
        };
        assert!(raw_rule.accepts(0.75, 0.0));
        assert!(!raw_rule.accepts(0.60, 1.0));

        let cal_rule = AcceptRule {
            basis: ScoreBasis::Calibrated,
            threshold: 0.75,
            inclusive: true,
        };
        assert!(cal_rule.accepts(0.0, 0.75));
        assert!(!cal_rule.accepts(1.0, 0.74));
    }

    #[test]
    fn builtin_configs_match_the_observed_rules() {
        let face = ModalityConfig::face();
        assert_eq!(face.accept.basis, ScoreBasis::Raw);
        assert_eq!(face.accept.threshold, 0.60);
        assert_eq!(face.rotation_correction_degrees, -90);

        let palm = ModalityConfig::palm();
        assert_eq!(palm.accept.basis, ScoreBasis::Calibrated);
        assert!(palm.accept.inclusive);
        assert_eq!(palm.calibration.calibrate(0.39), 0.80);
        assert_eq!(palm.rotation_correction_degrees, 90);

        let voice = ModalityConfig::voice();
        assert!(!voice.accept.inclusive);
        assert_eq!(voice.accept.threshold, 0.75);
    }

    #[test]
    fn feature_payload_roundtrip_is_bit_exact() {
        let values = vec![0.0f32, -0.0, 1.0, -1.0, f32::MIN_POSITIVE, std::f32::consts::PI];
        let payload = features_to_payload(&values);
        let recovered = decode_features(&payload).unwrap();
        for (orig, rec) in values.iter().zip(recovered.iter()) {
            assert_eq!(orig.to_bits(), rec.to_bits());
        }
    }
}
