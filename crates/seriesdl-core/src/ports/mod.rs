//! Port definitions for the hexagonal architecture.
//!
//! Ports are trait interfaces that decouple the job orchestration core
//! from infrastructure. Adapters (the db crate, the plugins crate, UI
//! transports) implement these traits and are injected as `Arc<dyn ...>`.

mod event_emitter;
mod job_store;
mod site_client;

pub use event_emitter::{JobEventEmitterPort, NoopJobEmitter};
pub use job_store::{JobStorePort, StoreError};
pub use site_client::{
    LogSink, SiteClientConfig, SiteClientFactoryPort, SiteClientPort, SiteError,
};
