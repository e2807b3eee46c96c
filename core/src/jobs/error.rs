use thiserror::Error;

use crate::contract::{ContractError, TransportError};
use crate::jobs::executor::ExecutionError;
use crate::jobs::model::JobStatus;
use crate::types::JobId;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {0} already exists")]
    AlreadyExists(JobId),

    #[error("job {job_id}: illegal transition {from} -> {to}")]
    IllegalTransition { job_id: JobId, from: JobStatus, to: JobStatus },

    /// A completion contradicting the terminal state already recorded.
    #[error("job {job_id} is already {current}, refusing conflicting {incoming} completion")]
    CompletionConflict { job_id: JobId, current: JobStatus, incoming: JobStatus },

    /// Refused before a job record was created.
    #[error("request rejected: {0}")]
    Rejected(#[source] ExecutionError),

    #[error("job {job_id} output unavailable: {reason}")]
    OutputUnavailable { job_id: JobId, reason: String },

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("job store unavailable: {0}")]
    Store(String),
}
