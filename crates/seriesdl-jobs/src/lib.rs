//! Job orchestration for seriesdl.
//!
//! Owns the in-memory job registry and the orchestrator that drives each
//! job through its state machine: plugin dispatch or the native episode
//! pipeline, per-episode failure tolerance, merge, recovery planning and
//! retry. A per-job progress task samples throughput and emits events.

pub mod orchestrator;
pub mod registry;

pub use orchestrator::{JobOrchestrator, OrchestratorDeps};
pub use registry::{JobRegistry, SharedJob};
