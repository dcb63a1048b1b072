//! Active liveness via blink detection.
//!
//! A static photograph cannot blink. The capture layer is only allowed to
//! fire the shutter after a detected eye-closure event: the caller arms the
//! gate, landmark frames stream in from the analysis worker, and on the
//! first frame where both eye-open probabilities drop below the threshold
//! the gate emits exactly one capture authorization and returns to idle.
//!
//! # Threat coverage
//!
//! - **Blocks:** printed photographs and other static images held in front
//!   of the camera.
//! - **Does not block:** video replay attacks (a video can blink) or
//!   high-quality 3D masks with articulated eyelids.
//!
//! # Concurrency
//!
//! Arming happens on the caller's thread; frames arrive on a dedicated
//! analysis worker. The gate state is a single atomic tri-state flag driven
//! by compare-and-swap, so concurrent frame delivery can never produce a
//! missed or duplicated trigger: the ARMED → TRIGGERED transition is won by
//! at most one frame per arm cycle.

use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;

/// Eye-open probability below which an eye counts as closed.
///
/// ML-grade landmark detectors report eye-open probabilities near 1.0 for a
/// wide-open eye and near 0.0 mid-blink; 0.4 catches a deliberate blink
/// without firing on squints.
const DEFAULT_BLINK_THRESHOLD: f64 = 0.4;

const IDLE: u8 = 0;
const ARMED: u8 = 1;
const TRIGGERED: u8 = 2;

/// One face-landmark frame from the analysis worker.
///
/// Probabilities are absent when no face was detected in the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkFrame {
    pub left_eye_open: Option<f64>,
    pub right_eye_open: Option<f64>,
}

impl LandmarkFrame {
    pub fn new(left_eye_open: f64, right_eye_open: f64) -> Self {
        Self {
            left_eye_open: Some(left_eye_open),
            right_eye_open: Some(right_eye_open),
        }
    }

    /// Frame in which no face was detected.
    pub fn absent() -> Self {
        Self {
            left_eye_open: None,
            right_eye_open: None,
        }
    }
}

/// Marker delivered through the gate's channel when a capture is authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureAuthorized;

/// Blink-detection capture gate.
///
/// Created together with the receiving half of its authorization channel;
/// the capture path awaits the channel while the analysis worker feeds
/// frames into [`BlinkGate::observe`].
pub struct BlinkGate {
    state: AtomicU8,
    threshold: f64,
    authorizations: mpsc::Sender<CaptureAuthorized>,
}

impl BlinkGate {
    /// Build a gate and the receiver yielding at most one authorization per
    /// arm cycle. `threshold` defaults to [`DEFAULT_BLINK_THRESHOLD`].
    pub fn new(threshold: Option<f64>) -> (Self, mpsc::Receiver<CaptureAuthorized>) {
        let (tx, rx) = mpsc::channel(1);
        (
            Self {
                state: AtomicU8::new(IDLE),
                threshold: threshold.unwrap_or(DEFAULT_BLINK_THRESHOLD),
                authorizations: tx,
            },
            rx,
        )
    }

    /// Request a capture. Idempotent while already armed; a no-op during the
    /// transient triggered window.
    pub fn arm(&self) {
        let _ = self
            .state
            .compare_exchange(IDLE, ARMED, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Withdraw a pending capture request (e.g. on session timeout).
    pub fn disarm(&self) {
        let _ = self
            .state
            .compare_exchange(ARMED, IDLE, Ordering::AcqRel, Ordering::Acquire);
    }

    pub fn is_armed(&self) -> bool {
        self.state.load(Ordering::Acquire) == ARMED
    }

    /// Feed one landmark frame. Returns `true` iff this frame triggered a
    /// capture authorization.
    ///
    /// Frames with absent probabilities, open eyes, or arriving while the
    /// gate is idle are silently dropped.
    pub fn observe(&self, frame: &LandmarkFrame) -> bool {
        let (Some(left), Some(right)) = (frame.left_eye_open, frame.right_eye_open) else {
            return false;
        };
        if left >= self.threshold || right >= self.threshold {
            return false;
        }

        // Debounce: only the frame that wins this CAS may authorize.
        if self
            .state
            .compare_exchange(ARMED, TRIGGERED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if self.authorizations.try_send(CaptureAuthorized).is_err() {
            // Receiver gone or a previous authorization was never consumed.
            tracing::warn!("capture authorization dropped — receiver not ready");
        }
        self.state.store(IDLE, Ordering::Release);
        true
    }
}
