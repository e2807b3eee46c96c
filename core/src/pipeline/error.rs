use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::stego::StegoError;
use crate::telemetry::Stage;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Stego(#[from] StegoError),

    #[error("{stage} stage I/O failed: {source}")]
    StageIo {
        stage: Stage,
        #[source]
        source: io::Error,
    },

    #[error("{stage} stage lost its peer")]
    ChannelClosed { stage: Stage },

    #[error("pipeline exceeded its time limit of {limit:?}")]
    Timeout { limit: Duration },

    #[error("{stage} stage panicked")]
    Panicked { stage: Stage },

    #[error("carrier I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub fn stage_io(stage: Stage) -> impl FnOnce(io::Error) -> PipelineError {
        move |source| PipelineError::StageIo { stage, source }
    }

    /// Failures that are usually the echo of another stage going away.
    /// A process that exited non-zero on its own outranks these.
    pub fn is_secondary(&self) -> bool {
        match self {
            PipelineError::StageIo { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof | io::ErrorKind::Interrupted
            ),
            PipelineError::ChannelClosed { .. } => true,
            PipelineError::Stego(StegoError::TerminatorNotFound { .. })
            | PipelineError::Stego(StegoError::CapacityExceeded { .. }) => true,
            _ => false,
        }
    }
}
