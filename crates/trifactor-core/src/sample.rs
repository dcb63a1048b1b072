//! Sample and modality value types.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// One biometric channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Face,
    Palm,
    Voice,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Face => "face",
            Modality::Palm => "palm",
            Modality::Voice => "voice",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "face" => Ok(Modality::Face),
            "palm" => Ok(Modality::Palm),
            "voice" => Ok(Modality::Voice),
            other => Err(format!("unknown modality '{other}' (expected face, palm or voice)")),
        }
    }
}

/// Rotation already applied to a sample, in degrees clockwise.
///
/// Capture devices deliver sensor-native orientations; the capture layer is
/// responsible for rotating samples upright before they reach a comparator.
/// The metadata is carried so that layer knows how far it still has to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Orientation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Orientation {
    /// Parse a rotation in degrees; accepts negatives (−90 == 270).
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Orientation::Deg0),
            90 => Some(Orientation::Deg90),
            180 => Some(Orientation::Deg180),
            270 => Some(Orientation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> i32 {
        match self {
            Orientation::Deg0 => 0,
            Orientation::Deg90 => 90,
            Orientation::Deg180 => 180,
            Orientation::Deg270 => 270,
        }
    }
}

/// A captured biometric sample: opaque payload plus capture metadata.
///
/// Immutable once constructed. Owned by the session that captured it until
/// handed to a comparator, after which it is read-only shared input.
#[derive(Debug, Clone)]
pub struct BiometricSample {
    modality: Modality,
    payload: Vec<u8>,
    captured_at: DateTime<Utc>,
    orientation: Orientation,
}

impl BiometricSample {
    pub fn new(modality: Modality, payload: Vec<u8>, orientation: Orientation) -> Self {
        Self {
            modality,
            payload,
            captured_at: Utc::now(),
            orientation,
        }
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Whether the sample is already in canonical upright orientation.
    pub fn is_upright(&self) -> bool {
        self.orientation == Orientation::Deg0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modality_parse_roundtrip() {
        for m in [Modality::Face, Modality::Palm, Modality::Voice] {
            assert_eq!(m.as_str().parse::<Modality>().unwrap(), m);
        }
        assert!("fingerprint".parse::<Modality>().is_err());
    }

    #[test]
    fn orientation_normalizes_negative_degrees() {
        assert_eq!(Orientation::from_degrees(-90), Some(Orientation::Deg270));
        assert_eq!(Orientation::from_degrees(450), Some(Orientation::Deg90));
        assert_eq!(Orientation::from_degrees(45), None);
    }

    #[test]
    fn sample_carries_metadata() {
        let s = BiometricSample::new(Modality::Palm, vec![1, 2, 3], Orientation::Deg90);
        assert_eq!(s.modality(), Modality::Palm);
        assert_eq!(s.payload(), &[1, 2, 3]);
        assert!(!s.is_upright());
    }
}
