use std::path::PathBuf;
use trifactor_core::{Modality, ModalityConfig};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite reference-sample database.
    pub db_path: PathBuf,
    /// Eye-open probability below which an eye counts as closed.
    pub blink_threshold: f64,
    /// Seconds a blink-gate arm cycle stays valid before frames are ignored.
    pub liveness_arm_timeout_secs: u64,
    /// Timeout in seconds for a single comparator invocation.
    pub compare_timeout_secs: u64,
    /// Face acceptance threshold, applied to the raw score.
    pub face_threshold: f64,
    /// Palm acceptance threshold, applied to the rescaled score.
    pub palm_threshold: f64,
    /// Voice acceptance threshold, applied to the calibrated score.
    pub voice_threshold: f64,
    /// Rotation the capture layer applies to face samples (front camera).
    pub face_rotation_degrees: i32,
    /// Rotation the capture layer applies to palm samples (back camera).
    pub palm_rotation_degrees: i32,
    /// Whether the daemon registers on the session bus (development mode).
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `TRIFACTOR_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("trifactor");

        let db_path = std::env::var("TRIFACTOR_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("references.db"));

        Self {
            db_path,
            blink_threshold: env_f64("TRIFACTOR_BLINK_THRESHOLD", 0.4),
            liveness_arm_timeout_secs: env_u64("TRIFACTOR_LIVENESS_ARM_TIMEOUT_SECS", 30),
            compare_timeout_secs: env_u64("TRIFACTOR_COMPARE_TIMEOUT_SECS", 10),
            face_threshold: env_f64("TRIFACTOR_FACE_THRESHOLD", 0.60),
            palm_threshold: env_f64("TRIFACTOR_PALM_THRESHOLD", 0.75),
            voice_threshold: env_f64("TRIFACTOR_VOICE_THRESHOLD", 0.75),
            face_rotation_degrees: env_i32("TRIFACTOR_FACE_ROTATION_DEGREES", -90),
            palm_rotation_degrees: env_i32("TRIFACTOR_PALM_ROTATION_DEGREES", 90),
            session_bus: std::env::var("TRIFACTOR_SESSION_BUS").is_ok(),
        }
    }

    /// The pipeline configuration for one modality: built-in calibration and
    /// score basis, with threshold and rotation overridden from the
    /// environment.
    pub fn modality_config(&self, modality: Modality) -> ModalityConfig {
        let mut config = ModalityConfig::for_modality(modality);
        match modality {
            Modality::Face => {
                config.accept.threshold = self.face_threshold;
                config.rotation_correction_degrees = self.face_rotation_degrees;
            }
            Modality::Palm => {
                config.accept.threshold = self.palm_threshold;
                config.rotation_correction_degrees = self.palm_rotation_degrees;
            }
            Modality::Voice => {
                config.accept.threshold = self.voice_threshold;
            }
        }
        config
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
