//! Job event emitter port.
//!
//! Abstracts event delivery so the orchestrator can push updates without
//! coupling to a transport (SSE, websocket, channels).

use crate::job::JobEvent;

/// Port for emitting job events.
///
/// Delivery is fire-and-forget; implementations must not block and must
/// never propagate failure back into the job pipeline.
pub trait JobEventEmitterPort: Send + Sync {
    /// Emit a job event.
    fn emit(&self, event: JobEvent);

    /// Clone this emitter into a boxed trait object.
    ///
    /// Enables cloning of `Arc<dyn JobEventEmitterPort>` without requiring
    /// the underlying type to implement `Clone`.
    fn clone_box(&self) -> Box<dyn JobEventEmitterPort>;
}

/// A no-op emitter for tests and headless contexts.
#[derive(Debug, Clone, Default)]
pub struct NoopJobEmitter;

impl NoopJobEmitter {
    /// Create a new no-op emitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl JobEventEmitterPort for NoopJobEmitter {
    fn emit(&self, _event: JobEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn JobEventEmitterPort> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobConfig};
    use std::sync::Arc;

    #[test]
    fn noop_emitter_accepts_events() {
        let emitter: Arc<dyn JobEventEmitterPort> = Arc::new(NoopJobEmitter::new());
        let job = Job::new(1, "u", JobConfig::default());
        emitter.emit(JobEvent::update(&job));
        let _boxed: Box<dyn JobEventEmitterPort> = emitter.clone_box();
    }
}
