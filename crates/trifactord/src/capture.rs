use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use trifactor_core::{BlinkGate, CaptureAuthorized, LandmarkFrame};

/// Blink gate plus the wall-clock bound on an arm cycle.
///
/// The gate itself has no notion of time; this wrapper expires a stale arm
/// before any frame can trigger it, and consumes the authorization token
/// when one fires so the next cycle starts clean.
pub struct CaptureWindow {
    gate: BlinkGate,
    authorizations: mpsc::Receiver<CaptureAuthorized>,
    timeout: Duration,
    armed_at: Option<Instant>,
}

impl CaptureWindow {
    pub fn new(blink_threshold: Option<f64>, timeout: Duration) -> Self {
        let (gate, authorizations) = BlinkGate::new(blink_threshold);
        Self {
            gate,
            authorizations,
            timeout,
            armed_at: None,
        }
    }

    /// Start (or restart) an arm cycle.
    pub fn arm(&mut self) {
        self.gate.arm();
        self.armed_at = Some(Instant::now());
    }

    /// Withdraw a pending capture request.
    pub fn cancel(&mut self) {
        self.gate.disarm();
        self.armed_at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.gate.is_armed()
    }

    /// Feed one landmark frame. Returns `true` iff this frame authorized a
    /// capture. An arm cycle older than the timeout is disarmed and the
    /// frame dropped, qualifying blink or not.
    pub fn observe(&mut self, frame: &LandmarkFrame) -> bool {
        if let Some(armed_at) = self.armed_at {
            if armed_at.elapsed() >= self.timeout {
                self.gate.disarm();
                self.armed_at = None;
                tracing::info!("blink gate arm expired");
                return false;
            }
        }

        let fired = self.gate.observe(frame);
        if fired {
            let _ = self.authorizations.try_recv();
            self.armed_at = None;
            tracing::info!("blink detected — capture authorized");
        }
        fired
    }
}
