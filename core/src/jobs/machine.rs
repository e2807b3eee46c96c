use std::sync::Arc;

use log::{info, warn};

use crate::constants::status_messages;
use crate::contract::JobCompletion;
use crate::jobs::error::JobError;
use crate::jobs::model::{Job, JobStatus, JobType, StorageRefs, TransitionFields};
use crate::jobs::store::{JobStore, TransitionOutcome};
use crate::types::{JobId, ParticipantRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Applied(Job),
    /// Same outcome delivered again; nothing changed.
    Duplicate(Job),
}

impl CompletionOutcome {
    pub fn job(&self) -> &Job {
        match self {
            CompletionOutcome::Applied(job) | CompletionOutcome::Duplicate(job) => job,
        }
    }
}

/// Every status change goes through here, and every change is a
/// conditional transition against the expected prior state.
#[derive(Clone)]
pub struct JobStateMachine {
    store: Arc<dyn JobStore>,
}

impl JobStateMachine {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn find(&self, job_id: &JobId) -> Result<Job, JobError> {
        self.store.find_by_id(job_id)?.ok_or_else(|| JobError::NotFound(job_id.clone()))
    }

    pub fn create_job(
        &self,
        job_type: JobType,
        sender: ParticipantRef,
        recipient: Option<ParticipantRef>,
        storage: StorageRefs,
    ) -> Result<Job, JobError> {
        let job = Job::new(job_type, sender, recipient, storage);
        self.store.create(job.clone())?;
        info!("[JOB] {} created ({}) for {}", job.job_id, job.job_type, job.sender_ref);
        Ok(job)
    }

    /// PENDING -> PROCESSING. `None` means some earlier delivery of the same
    /// request already started (or finished) the job.
    pub fn begin_processing(&self, job_id: &JobId) -> Result<Option<Job>, JobError> {
        let current = self.find(job_id)?;
        let message = match current.job_type {
            JobType::Encode => status_messages::EMBEDDING,
            JobType::Decode => status_messages::EXTRACTING,
        };

        match self.store.compare_and_transition(
            job_id,
            JobStatus::Pending,
            JobStatus::Processing,
            TransitionFields::message(message),
        )? {
            TransitionOutcome::Applied(job) => {
                info!("[JOB] {} PROCESSING", job_id);
                Ok(Some(job))
            }
            TransitionOutcome::Rejected(job) => {
                info!("[JOB] {} is already {}, ignoring repeated request", job_id, job.status);
                Ok(None)
            }
        }
    }

    /// PROCESSING -> COMPLETED | FAILED. Re-delivery of the recorded outcome
    /// is a no-op; a different outcome for a terminal job is rejected.
    pub fn apply_completion(&self, completion: &JobCompletion) -> Result<CompletionOutcome, JobError> {
        completion.validate()?;
        let job_id = &completion.job_id;
        let target = completion.status;
        let fields = match target {
            JobStatus::Completed => TransitionFields::message(status_messages::COMPLETED)
                .with_output(completion.output_file_id.clone()),
            _ => TransitionFields::message(status_messages::FAILED).with_error(completion.error_message.clone()),
        };

        match self.store.compare_and_transition(job_id, JobStatus::Processing, target, fields)? {
            TransitionOutcome::Applied(job) => {
                info!("[JOB] {} {}", job_id, job.status);
                Ok(CompletionOutcome::Applied(job))
            }
            TransitionOutcome::Rejected(current)
                if current.status == target && current.storage.output == completion.output_file_id =>
            {
                info!("[JOB] {} duplicate {} completion ignored", job_id, target);
                Ok(CompletionOutcome::Duplicate(current))
            }
            TransitionOutcome::Rejected(current) if current.status.is_terminal() => {
                warn!(
                    "[JOB] {} conflicting completion: recorded {} (output={:?}), got {} (output={:?})",
                    job_id, current.status, current.storage.output, target, completion.output_file_id
                );
                Err(JobError::CompletionConflict { job_id: job_id.clone(), current: current.status, incoming: target })
            }
            TransitionOutcome::Rejected(current) => {
                warn!("[JOB] {} completion {} arrived while {}", job_id, target, current.status);
                Err(JobError::IllegalTransition { job_id: job_id.clone(), from: current.status, to: target })
            }
        }
    }
}
