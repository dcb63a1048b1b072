//! Core engine for multi-factor biometric verification.
//!
//! Three biometric factors (face, palm, voice) plus a device-level secondary
//! factor are evaluated as a fixed-order, short-circuiting AND pipeline:
//! face → palm → secondary factor → voice. The first failing stage stops
//! evaluation and later stages are never invoked.
//!
//! Sequential gating is deliberate: a weak factor can never be averaged up
//! by strong factors, at the cost of user friction — failing an early stage
//! means the later factors are never exercised. The stage order is data
//! ([`aggregator::STAGE_ORDER`]), not control flow, so the policy is visible
//! and testable with stage stubs.
//!
//! The heavy comparison math (face embeddings, palm features, voice models)
//! lives behind the [`Comparator`] trait; this crate owns the pipeline that
//! gates, calls, calibrates, and combines those comparators.

pub mod aggregator;
pub mod calibration;
pub mod comparator;
pub mod liveness;
pub mod sample;
pub mod session;
pub mod wav;

pub use aggregator::{run_pipeline, Stage, StageOutcome, StageRunner, VerificationOutcome, STAGE_ORDER};
pub use calibration::{CalibrationError, CalibrationProfile};
pub use comparator::{AcceptRule, CompareError, Comparator, CosineComparator, ModalityConfig, ScoreBasis};
pub use liveness::{BlinkGate, CaptureAuthorized, LandmarkFrame};
pub use sample::{BiometricSample, Modality, Orientation};
pub use session::{ModalityResult, SessionError, SessionState, VerificationSession};
