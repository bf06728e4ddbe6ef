//! # quarry-queue
//!
//! The background ingest worker over the persistent embedding queue:
//! reserve → embed (via the pipeline) → write through storage →
//! complete, with per-item retry and a stale-reservation sweeper.

pub mod worker;

pub use worker::{QueueRunReport, QueueWorker};
