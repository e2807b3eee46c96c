//! Job record store with per-record conditional transitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::jobs::error::JobError;
use crate::jobs::model::{Job, JobStatus, TransitionFields};
use crate::types::JobId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The record was in the expected state; here is the updated record.
    Applied(Job),
    /// The record was in some other state and was left untouched.
    Rejected(Job),
}

pub trait JobStore: Send + Sync {
    fn create(&self, job: Job) -> Result<(), JobError>;

    fn find_by_id(&self, job_id: &JobId) -> Result<Option<Job>, JobError>;

    /// Move `job_id` from `expected` to `next` iff it currently is `expected`.
    fn compare_and_transition(
        &self,
        job_id: &JobId,
        expected: JobStatus,
        next: JobStatus,
        fields: TransitionFields,
    ) -> Result<TransitionOutcome, JobError>;
}

/// The map lock is only held to find or insert a record; transitions lock
/// just the record they touch.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    records: RwLock<HashMap<JobId, Arc<Mutex<Job>>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, job_id: &JobId) -> Result<Option<Arc<Mutex<Job>>>, JobError> {
        let records = self.records.read().map_err(|_| JobError::Store("record map poisoned".into()))?;
        Ok(records.get(job_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, job: Job) -> Result<(), JobError> {
        let mut records = self.records.write().map_err(|_| JobError::Store("record map poisoned".into()))?;
        if records.contains_key(&job.job_id) {
            return Err(JobError::AlreadyExists(job.job_id));
        }
        records.insert(job.job_id.clone(), Arc::new(Mutex::new(job)));
        Ok(())
    }

    fn find_by_id(&self, job_id: &JobId) -> Result<Option<Job>, JobError> {
        match self.record(job_id)? {
            Some(record) => {
                let job = record.lock().map_err(|_| JobError::Store(format!("record {job_id} poisoned")))?;
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    fn compare_and_transition(
        &self,
        job_id: &JobId,
        expected: JobStatus,
        next: JobStatus,
        fields: TransitionFields,
    ) -> Result<TransitionOutcome, JobError> {
        if !expected.can_transition_to(next) {
            return Err(JobError::IllegalTransition { job_id: job_id.clone(), from: expected, to: next });
        }
        let record = self.record(job_id)?.ok_or_else(|| JobError::NotFound(job_id.clone()))?;
        let mut job = record.lock().map_err(|_| JobError::Store(format!("record {job_id} poisoned")))?;

        if job.status != expected {
            return Ok(TransitionOutcome::Rejected(job.clone()));
        }
        job.apply(next, fields);
        Ok(TransitionOutcome::Applied(job.clone()))
    }
}
