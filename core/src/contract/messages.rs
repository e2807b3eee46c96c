use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jobs::{JobStatus, JobType};
use crate::ports::KeyMaterial;
use crate::types::{BlobHandle, JobId, ParticipantRef};

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("message is not valid JSON for its schema: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid completion for job {job_id}: {reason}")]
    InvalidCompletion { job_id: JobId, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeRequest {
    pub job_id: JobId,
    pub input_file_id: BlobHandle,
    pub secret_file_id: BlobHandle,
    pub recipient_user_id: ParticipantRef,
    pub sender_private_key: KeyMaterial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeRequest {
    pub job_id: JobId,
    pub input_file_id: BlobHandle,
    pub recipient_private_key: KeyMaterial,
}

/// Inbound work item. On the wire: one JSON object tagged by `jobType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "jobType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobRequest {
    Encode(EncodeRequest),
    Decode(DecodeRequest),
}

impl JobRequest {
    pub fn job_id(&self) -> &JobId {
        match self {
            JobRequest::Encode(r) => &r.job_id,
            JobRequest::Decode(r) => &r.job_id,
        }
    }

    pub fn job_type(&self) -> JobType {
        match self {
            JobRequest::Encode(_) => JobType::Encode,
            JobRequest::Decode(_) => JobType::Decode,
        }
    }

    pub fn input(&self) -> &BlobHandle {
        match self {
            JobRequest::Encode(r) => &r.input_file_id,
            JobRequest::Decode(r) => &r.input_file_id,
        }
    }
}

impl From<EncodeRequest> for JobRequest {
    fn from(r: EncodeRequest) -> Self {
        JobRequest::Encode(r)
    }
}

impl From<DecodeRequest> for JobRequest {
    fn from(r: DecodeRequest) -> Self {
        JobRequest::Decode(r)
    }
}

/// Outcome of one job. `outputFileId` iff COMPLETED, `errorMessage` iff FAILED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletion {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_id: Option<BlobHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobCompletion {
    pub fn completed(job_id: JobId, output: BlobHandle) -> Self {
        Self { job_id, status: JobStatus::Completed, output_file_id: Some(output), error_message: None }
    }

    pub fn failed(job_id: JobId, error: impl Into<String>) -> Self {
        Self { job_id, status: JobStatus::Failed, output_file_id: None, error_message: Some(error.into()) }
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        let reason = match (self.status, &self.output_file_id, &self.error_message) {
            (JobStatus::Completed, Some(_), None) | (JobStatus::Failed, None, Some(_)) => return Ok(()),
            (JobStatus::Pending | JobStatus::Processing, _, _) => "status must be COMPLETED or FAILED",
            (JobStatus::Completed, None, _) => "COMPLETED without outputFileId",
            (JobStatus::Completed, Some(_), Some(_)) => "COMPLETED with errorMessage",
            (JobStatus::Failed, Some(_), _) => "FAILED with outputFileId",
            (JobStatus::Failed, None, None) => "FAILED without errorMessage",
        };
        Err(ContractError::InvalidCompletion { job_id: self.job_id.clone(), reason })
    }
}

pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>, ContractError> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode_request(payload: &[u8]) -> Result<JobRequest, ContractError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Parse and check the COMPLETED/FAILED shape.
pub fn decode_completion(payload: &[u8]) -> Result<JobCompletion, ContractError> {
    let completion: JobCompletion = serde_json::from_slice(payload)?;
    completion.validate()?;
    Ok(completion)
}
