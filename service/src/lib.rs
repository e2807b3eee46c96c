//! stego-service
//!
//! Worker adapter over stego-core. Reads newline-delimited JSON commands,
//! hands the blocking work to the core, and writes replies and job
//! completion events back as newline-delimited JSON.
//!
//! Tokio lives only here; the core never sees a runtime.

pub mod commands;
pub mod config;
pub mod error;
pub mod worker;

pub use commands::{Command, CommandEnvelope, Reply, ReplyEnvelope};
pub use config::{CodecSelection, ServiceConfig};
pub use error::ServiceError;
pub use worker::{Worker, WorkerState};
