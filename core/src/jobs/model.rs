use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BlobHandle, JobId, ParticipantRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Encode,
    Decode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// PENDING -> PROCESSING -> {COMPLETED, FAILED}. Nothing else.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        })
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobType::Encode => "ENCODE",
            JobType::Decode => "DECODE",
        })
    }
}

/// Blob handles only; bytes are resolved by the pipeline when it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRefs {
    pub input: BlobHandle,
    pub secret: Option<BlobHandle>,
    pub output: Option<BlobHandle>,
}

impl StorageRefs {
    pub fn new(input: BlobHandle, secret: Option<BlobHandle>) -> Self {
        Self { input, secret, output: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub status_message: Option<String>,
    pub sender_ref: ParticipantRef,
    pub recipient_ref: Option<ParticipantRef>,
    pub storage: StorageRefs,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        job_type: JobType,
        sender_ref: ParticipantRef,
        recipient_ref: Option<ParticipantRef>,
        storage: StorageRefs,
    ) -> Self {
        Self {
            job_id: JobId::generate(),
            job_type,
            status: JobStatus::Pending,
            status_message: None,
            sender_ref,
            recipient_ref,
            storage,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Output iff COMPLETED, error iff FAILED, completion time iff terminal.
    pub fn is_consistent(&self) -> bool {
        self.storage.output.is_some() == (self.status == JobStatus::Completed)
            && self.error_message.is_some() == (self.status == JobStatus::Failed)
            && self.completed_at.is_some() == self.status.is_terminal()
    }

    /// Move to `next`, writing only the fields that state owns.
    pub(crate) fn apply(&mut self, next: JobStatus, fields: TransitionFields) {
        self.status = next;
        if let Some(message) = fields.status_message {
            self.status_message = Some(message);
        }
        match next {
            JobStatus::Completed => self.storage.output = fields.output,
            JobStatus::Failed => self.error_message = fields.error_message,
            _ => {}
        }
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }
}

/// Fields written together with a status change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionFields {
    pub status_message: Option<String>,
    pub output: Option<BlobHandle>,
    pub error_message: Option<String>,
}

impl TransitionFields {
    pub fn message(message: impl Into<String>) -> Self {
        Self { status_message: Some(message.into()), ..Self::default() }
    }

    pub fn with_output(mut self, output: Option<BlobHandle>) -> Self {
        self.output = output;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error_message = error;
        self
    }
}
