use crate::records::{EngineEvent, EngineEventSender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One-shot termination signal shared by the engine, its receiver thread and the caller.
///
/// Once raised it stays raised. Only the first `stop()` wakes the engine, later calls are no-ops.
#[derive(Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    wake_tx: EngineEventSender,
}

impl StopHandle {
    pub(crate) fn new(wake_tx: EngineEventSender) -> Self {
        StopHandle { stopped: Arc::new(AtomicBool::new(false)), wake_tx }
    }

    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("stop requested");
        // A full queue wakes the engine on its own; a closed one means it is already gone.
        let _ = self.wake_tx.try_send(EngineEvent::Stop);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopHandle").field("stopped", &self.is_stopped()).finish()
    }
}
