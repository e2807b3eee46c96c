//! Job lifecycle: record model, conditional store, state machine, the
//! requester-facing service and the worker-side executor/runner.

pub mod admission;
pub mod error;
pub mod executor;
pub mod machine;
pub mod model;
pub mod runner;
pub mod service;
pub mod store;

pub use admission::AdmissionCheck;
pub use error::JobError;
pub use executor::{ExecutionError, JobExecutor};
pub use machine::{CompletionOutcome, JobStateMachine};
pub use model::{Job, JobStatus, JobType, StorageRefs, TransitionFields};
pub use runner::JobRunner;
pub use service::JobService;
pub use store::{InMemoryJobStore, JobStore, TransitionOutcome};
