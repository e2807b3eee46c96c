use std::io;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use stego_core::contract::TransportError;
use stego_core::jobs::JobError;
use stego_core::pipeline::PipelineError;
use stego_core::ports::{BlobError, KeyError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid service configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Lines(#[from] LinesCodecError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("worker task failed: {0}")]
    Worker(String),
}
