use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use zbus::interface;

use trifactor_core::{
    run_pipeline, BiometricSample, CompareError, LandmarkFrame, Modality, ModalityResult,
    Orientation, SessionError, StageRunner,
};

use crate::capture::CaptureWindow;
use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};
use crate::rate_limiter::RateLimiter;
use crate::store::{ReferenceStore, StoreError};

/// Shared state accessible by D-Bus method handlers.
pub struct AppState {
    pub config: Config,
    pub engine: EngineHandle,
    pub store: ReferenceStore,
    pub rate_limiter: RateLimiter,
    pub capture: CaptureWindow,
}

/// D-Bus interface for the Trifactor verification daemon.
///
/// Bus name: org.freedesktop.Trifactor1
/// Object path: /org/freedesktop/Trifactor1
pub struct TrifactorService {
    pub state: Arc<Mutex<AppState>>,
}

/// Bridges the synchronous stage walk onto the async engine.  Runs inside
/// `spawn_blocking`; each modality comparison blocks on the engine's reply.
struct PipelineRunner {
    handle: tokio::runtime::Handle,
    engine: EngineHandle,
    samples: HashMap<Modality, (BiometricSample, BiometricSample)>,
    secondary_passed: bool,
}

impl StageRunner for PipelineRunner {
    fn run_modality(&mut self, modality: Modality) -> Result<ModalityResult, SessionError> {
        let (reference, probe) = self
            .samples
            .remove(&modality)
            .ok_or_else(|| {
                SessionError::Comparator(CompareError::Failed(format!(
                    "no captured {modality} sample"
                )))
            })?;

        match self
            .handle
            .block_on(self.engine.compare(modality, reference, probe))
        {
            Ok(result) => Ok(result),
            Err(EngineError::Session(e)) => Err(e),
            Err(e @ EngineError::Timeout(_)) | Err(e @ EngineError::ChannelClosed) => {
                Err(SessionError::Comparator(CompareError::Failed(e.to_string())))
            }
        }
    }

    fn run_secondary_factor(&mut self) -> bool {
        self.secondary_passed
    }
}

fn parse_modality(s: &str) -> zbus::fdo::Result<Modality> {
    Modality::from_str(s)
        .map_err(|_| zbus::fdo::Error::InvalidArgs(format!("unknown modality '{s}'")))
}

fn store_err(context: &str, e: StoreError) -> zbus::fdo::Error {
    tracing::error!(error = %e, "{context}");
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "org.freedesktop.Trifactor1")]
impl TrifactorService {
    /// Enroll (or replace) a user's reference sample for one modality.
    ///
    /// `rotation_degrees` is the residual rotation the capture layer left
    /// on the sample; references must arrive upright (0°).  Voice payloads
    /// carrying a RIFF header are validated as canonical 16 kHz mono PCM
    /// WAV before storage — note the built-in cosine backend consumes f32
    /// feature vectors and refuses containers, so WAV references are for
    /// deployments with a voice backend that extracts its own features.
    /// Returns the SHA-256 digest of the stored payload.
    async fn enroll(
        &self,
        user: &str,
        modality: &str,
        payload: Vec<u8>,
        rotation_degrees: i32,
    ) -> zbus::fdo::Result<String> {
        let modality = parse_modality(modality)?;
        tracing::info!(user, %modality, bytes = payload.len(), rotation_degrees, "enroll requested");

        if payload.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs(
                "empty reference payload".to_string(),
            ));
        }

        match Orientation::from_degrees(rotation_degrees) {
            Some(Orientation::Deg0) => {}
            Some(residual) => {
                return Err(zbus::fdo::Error::InvalidArgs(format!(
                    "reference must be rotated upright before enrollment ({}° residual)",
                    residual.degrees()
                )));
            }
            None => {
                return Err(zbus::fdo::Error::InvalidArgs(format!(
                    "rotation must be a right angle, got {rotation_degrees}°"
                )));
            }
        }

        if modality == Modality::Voice && payload.starts_with(b"RIFF") {
            let (spec, pcm) = trifactor_core::wav::read_wav(&payload)
                .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid WAV: {e}")))?;
            tracing::debug!(
                sample_rate_hz = spec.sample_rate_hz,
                channels = spec.channels,
                bits = spec.bits_per_sample,
                pcm_bytes = pcm.len(),
                "voice reference WAV validated"
            );
        }

        let state = self.state.lock().await;
        let digest = state
            .store
            .put(user, modality, &payload)
            .await
            .map_err(|e| store_err("enroll: store write failed", e))?;

        tracing::info!(user, %modality, digest, "enrolled");
        Ok(digest)
    }

    /// Run the full sequential verification pipeline for a user.
    ///
    /// The three probe payloads are compared against the user's enrolled
    /// references in the fixed order face → palm → secondary factor →
    /// voice; the first failing gate short-circuits the rest.
    /// `secondary_factor_passed` is asserted by the platform layer (device
    /// credential check).  Returns the full outcome as JSON.
    async fn verify(
        &self,
        user: &str,
        face_probe: Vec<u8>,
        palm_probe: Vec<u8>,
        voice_probe: Vec<u8>,
        secondary_factor_passed: bool,
    ) -> zbus::fdo::Result<String> {
        let attempt = uuid::Uuid::new_v4();
        tracing::info!(user, %attempt, "verify requested");

        // --- Rate limit check ---
        {
            let mut state = self.state.lock().await;
            if let Err(retry_after) = state.rate_limiter.check(user) {
                tracing::warn!(user, retry_secs = retry_after.as_secs(), "verify: rate limited");
                return Err(zbus::fdo::Error::AccessDenied(format!(
                    "too many failed attempts; try again in {}s",
                    retry_after.as_secs()
                )));
            }
        }

        // --- Fetch references and engine handle (release lock before pipeline) ---
        let (engine, store) = {
            let state = self.state.lock().await;
            (state.engine.clone(), state.store.clone())
        };

        let mut samples = HashMap::new();
        for (modality, probe) in [
            (Modality::Face, face_probe),
            (Modality::Palm, palm_probe),
            (Modality::Voice, voice_probe),
        ] {
            let reference = match store.get(user, modality).await {
                Ok(payload) => BiometricSample::new(modality, payload, Orientation::Deg0),
                Err(StoreError::NotFound(key)) => {
                    tracing::warn!(user, %modality, key, "verify: not enrolled");
                    return Err(zbus::fdo::Error::Failed(format!(
                        "no enrolled {modality} reference for user '{user}'"
                    )));
                }
                Err(e) => return Err(store_err("verify: reference fetch failed", e)),
            };
            let probe = BiometricSample::new(modality, probe, Orientation::Deg0);
            samples.insert(modality, (reference, probe));
        }

        // --- Walk the pipeline off the async runtime (no lock held) ---
        let handle = tokio::runtime::Handle::current();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut runner = PipelineRunner {
                handle,
                engine,
                samples,
                secondary_passed: secondary_factor_passed,
            };
            run_pipeline(&mut runner)
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "verify: pipeline task panicked");
            zbus::fdo::Error::Failed("verification pipeline failed".to_string())
        })?;

        // --- Record rate-limit outcome ---
        {
            let mut state = self.state.lock().await;
            state.rate_limiter.record_outcome(user, &outcome);
        }

        tracing::info!(user, %attempt, verified = outcome.verified, "verify complete");
        serde_json::to_string(&outcome).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Arm the blink gate for a face capture.  The next detected blink
    /// authorizes exactly one capture; the arm expires after the configured
    /// timeout.
    async fn arm_capture(&self) -> zbus::fdo::Result<()> {
        let mut state = self.state.lock().await;
        state.capture.arm();
        tracing::debug!("blink gate armed");
        Ok(())
    }

    /// Withdraw a pending capture request.
    async fn cancel_capture(&self) -> zbus::fdo::Result<()> {
        let mut state = self.state.lock().await;
        state.capture.cancel();
        tracing::debug!("blink gate disarmed");
        Ok(())
    }

    /// Feed one face-landmark frame from the analysis worker.  Eye-open
    /// probabilities are ignored for an eye whose `*_present` flag is false
    /// (no face detected on that side).  Returns true iff this frame
    /// triggered a capture authorization.
    async fn submit_landmark_frame(
        &self,
        left_present: bool,
        left_eye_open: f64,
        right_present: bool,
        right_eye_open: f64,
    ) -> zbus::fdo::Result<bool> {
        let frame = LandmarkFrame {
            left_eye_open: left_present.then_some(left_eye_open),
            right_eye_open: right_present.then_some(right_eye_open),
        };

        let mut state = self.state.lock().await;
        Ok(state.capture.observe(&frame))
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let state = self.state.lock().await;
        let reference_count = state.store.count_all().await.unwrap_or(0);

        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "references_enrolled": reference_count,
            "face_threshold": state.config.face_threshold,
            "palm_threshold": state.config.palm_threshold,
            "voice_threshold": state.config.voice_threshold,
            "blink_threshold": state.config.blink_threshold,
            "gate_armed": state.capture.is_armed(),
        })
        .to_string())
    }

    /// Remove every enrolled reference for a user.  Returns the number of
    /// references removed.
    async fn remove_enrollment(&self, user: &str) -> zbus::fdo::Result<u64> {
        tracing::info!(user, "remove_enrollment requested");
        let state = self.state.lock().await;
        let removed = state
            .store
            .remove_user(user)
            .await
            .map_err(|e| store_err("remove_enrollment: store delete failed", e))?;
        if removed > 0 {
            tracing::info!(user, removed, "enrollment removed");
        } else {
            tracing::warn!(user, "no enrollment found");
        }
        Ok(removed)
    }
}

