use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use trifactor_core::{
    BiometricSample, Comparator, CosineComparator, Modality, ModalityConfig, ModalityResult,
    SessionError, VerificationSession,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("comparison timed out after {0:?}")]
    Timeout(Duration),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Builds the comparator for a modality. Injected so tests can substitute
/// scripted comparators for the default cosine backend.
pub type ComparatorFactory = Box<dyn Fn(Modality) -> Box<dyn Comparator> + Send>;

pub fn cosine_factory() -> ComparatorFactory {
    Box::new(|modality| Box::new(CosineComparator::new(modality)))
}

/// Per-modality pipeline configuration handed to the engine at spawn.
pub struct EngineConfig {
    pub face: ModalityConfig,
    pub palm: ModalityConfig,
    pub voice: ModalityConfig,
    pub compare_timeout: Duration,
}

impl EngineConfig {
    fn for_modality(&self, modality: Modality) -> ModalityConfig {
        match modality {
            Modality::Face => self.face.clone(),
            Modality::Palm => self.palm.clone(),
            Modality::Voice => self.voice.clone(),
        }
    }
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Compare {
        modality: Modality,
        reference: BiometricSample,
        probe: BiometricSample,
        reply: oneshot::Sender<Result<ModalityResult, SessionError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    compare_timeout: Duration,
}

impl EngineHandle {
    /// Run one modality comparison on the engine thread.
    ///
    /// Comparisons are not cancellable mid-flight: on timeout the reply is
    /// abandoned and the engine finishes the in-flight request before
    /// serving the next.
    pub async fn compare(
        &self,
        modality: Modality,
        reference: BiometricSample,
        probe: BiometricSample,
    ) -> Result<ModalityResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Compare {
                modality,
                reference,
                probe,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;

        match tokio::time::timeout(self.compare_timeout, reply_rx).await {
            Err(_) => Err(EngineError::Timeout(self.compare_timeout)),
            Ok(Err(_)) => Err(EngineError::ChannelClosed),
            Ok(Ok(result)) => result.map_err(EngineError::Session),
        }
    }
}

/// Spawn the comparison engine on a dedicated OS thread.
///
/// Comparator work is computationally heavy and must never run on the async
/// runtime or the frame-analysis path; requests are serialized through an
/// mpsc channel and answered over oneshot replies.
pub fn spawn_engine(config: EngineConfig, factory: ComparatorFactory) -> EngineHandle {
    let compare_timeout = config.compare_timeout;
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("trifactor-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Compare {
                        modality,
                        reference,
                        probe,
                        reply,
                    } => {
                        let result = run_compare(&config, &factory, modality, &reference, &probe);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle {
        tx,
        compare_timeout,
    }
}

/// One comparison: a fresh session per attempt, discarded afterwards.
fn run_compare(
    config: &EngineConfig,
    factory: &ComparatorFactory,
    modality: Modality,
    reference: &BiometricSample,
    probe: &BiometricSample,
) -> Result<ModalityResult, SessionError> {
    let mut session =
        VerificationSession::new(config.for_modality(modality), factory(modality))?;
    session.verify(reference, probe)
}
