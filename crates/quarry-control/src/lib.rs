//! # quarry-control
//!
//! The request control plane and the engine runtime behind it. Callers
//! hold an `EngineHandle`; every operation crosses the channel as a typed
//! request with a correlation id and comes back as a response or a typed
//! error. The execution domain — storage, cache, providers, queue,
//! retrieval — lives on its own runtime thread.

pub mod engine;
pub mod handle;
pub mod message;
pub mod metrics;

pub use engine::{Engine, EngineOptions};
pub use handle::EngineHandle;
pub use message::{
    DocId, LogMessage, Method, Request, Response, WireDocument, WireError, WireSearchOptions,
};
pub use metrics::{ControlMetrics, ControlMetricsSnapshot};
