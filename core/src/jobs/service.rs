use std::sync::Arc;

use crossbeam::channel::Receiver;
use log::{error, info, warn};

use crate::contract::{
    decode_completion, publish_request, DecodeRequest, EncodeRequest, JobCompletion, JobRequest, MessageTransport,
    TransportRecord,
};
use crate::jobs::admission::AdmissionCheck;
use crate::jobs::error::JobError;
use crate::jobs::machine::{CompletionOutcome, JobStateMachine};
use crate::jobs::model::{Job, JobStatus, JobType, StorageRefs};
use crate::ports::KeyMaterial;
use crate::types::{BlobHandle, JobId, ParticipantRef};

/// Requester-facing side: creates jobs, publishes their requests and
/// applies the completions that come back.
pub struct JobService {
    machine: JobStateMachine,
    transport: Arc<dyn MessageTransport>,
    admission: Option<AdmissionCheck>,
}

impl JobService {
    pub fn new(machine: JobStateMachine, transport: Arc<dyn MessageTransport>) -> Self {
        Self { machine, transport, admission: None }
    }

    /// Reject encode requests that cannot fit their carrier before a job
    /// record is created.
    pub fn with_admission(mut self, admission: AdmissionCheck) -> Self {
        self.admission = Some(admission);
        self
    }

    pub fn machine(&self) -> &JobStateMachine {
        &self.machine
    }

    fn publish(&self, job: Job, request: JobRequest) -> Result<Job, JobError> {
        if let Err(e) = publish_request(self.transport.as_ref(), &request) {
            // The record stays PENDING; nothing will pick it up.
            error!("[JOB] {} request could not be published: {}", job.job_id, e);
            return Err(e.into());
        }
        Ok(job)
    }

    pub fn submit_encode(
        &self,
        sender: ParticipantRef,
        recipient: ParticipantRef,
        input: BlobHandle,
        secret: BlobHandle,
        sender_private_key: KeyMaterial,
    ) -> Result<Job, JobError> {
        if let Some(admission) = &self.admission {
            admission.check_encode(&sender, &input, &secret).map_err(|e| {
                warn!("[JOB] encode request from {} rejected: {}", sender, e);
                JobError::Rejected(e)
            })?;
        }
        let storage = StorageRefs::new(input.clone(), Some(secret.clone()));
        let job = self.machine.create_job(JobType::Encode, sender, Some(recipient.clone()), storage)?;
        let request = EncodeRequest {
            job_id: job.job_id.clone(),
            input_file_id: input,
            secret_file_id: secret,
            recipient_user_id: recipient,
            sender_private_key,
        };
        self.publish(job, request.into())
    }

    pub fn submit_decode(
        &self,
        requester: ParticipantRef,
        input: BlobHandle,
        recipient_private_key: KeyMaterial,
    ) -> Result<Job, JobError> {
        let storage = StorageRefs::new(input.clone(), None);
        let job = self.machine.create_job(JobType::Decode, requester, None, storage)?;
        let request = DecodeRequest { job_id: job.job_id.clone(), input_file_id: input, recipient_private_key };
        self.publish(job, request.into())
    }

    /// Only the participant who created a job can see it. Anyone else gets
    /// `NotFound`, same as for a job that does not exist.
    pub fn job_status(&self, job_id: &JobId, requester: &ParticipantRef) -> Result<Job, JobError> {
        self.machine
            .store()
            .find_by_id(job_id)?
            .filter(|job| &job.sender_ref == requester)
            .ok_or_else(|| JobError::NotFound(job_id.clone()))
    }

    pub fn output_handle(&self, job_id: &JobId, requester: &ParticipantRef) -> Result<BlobHandle, JobError> {
        let job = self.job_status(job_id, requester)?;
        if job.status != JobStatus::Completed {
            return Err(JobError::OutputUnavailable {
                job_id: job_id.clone(),
                reason: format!("job is {}", job.status),
            });
        }
        job.storage.output.ok_or_else(|| JobError::OutputUnavailable {
            job_id: job_id.clone(),
            reason: "completed without an output handle".into(),
        })
    }

    pub fn handle_completion(&self, completion: &JobCompletion) -> Result<CompletionOutcome, JobError> {
        info!("[JOB] completion for {}: {}", completion.job_id, completion.status);
        self.machine.apply_completion(completion)
    }

    pub fn handle_completion_record(&self, record: &TransportRecord) -> Result<CompletionOutcome, JobError> {
        let completion = decode_completion(&record.payload)?;
        self.handle_completion(&completion)
    }

    /// Apply completions until the topic closes. Rejected ones are logged
    /// and dropped, never retried.
    pub fn run_completion_loop(&self, completions: Receiver<TransportRecord>) {
        for record in completions.iter() {
            if let Err(e) = self.handle_completion_record(&record) {
                error!("[JOB] completion key={} not applied: {}", record.key, e);
            }
        }
        info!("[JOB] completion topic closed");
    }
}
