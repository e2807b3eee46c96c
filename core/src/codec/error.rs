use std::io;
use thiserror::Error;

use crate::codec::process::StageRole;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to spawn {role} process `{program}`: {source}")]
    Spawn {
        role: StageRole,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{role} process {}{}", exit_label(.code), stderr_suffix(.stderr))]
    ProcessFailed {
        role: StageRole,
        /// `None` when the process was ended by a signal.
        code: Option<i32>,
        stderr: String,
    },

    #[error("{role} {pipe} pipe was not captured")]
    MissingPipe { role: StageRole, pipe: &'static str },

    #[error("{role} process still running at its deadline")]
    DeadlineExceeded { role: StageRole },

    #[error("unusable probe output: {0}")]
    Probe(String),

    #[error("invalid frame geometry: {0}")]
    InvalidGeometry(String),

    #[error("codec I/O error: {0}")]
    Io(#[from] io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exited with code {c}"),
        None => "was terminated by a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed.lines().last().unwrap_or(trimmed))
    }
}

impl CodecError {
    pub fn role(&self) -> Option<StageRole> {
        match self {
            CodecError::Spawn { role, .. }
            | CodecError::ProcessFailed { role, .. }
            | CodecError::MissingPipe { role, .. }
            | CodecError::DeadlineExceeded { role } => Some(*role),
            _ => None,
        }
    }
}
