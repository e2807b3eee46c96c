use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use bytes::Bytes;
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::topics;
use crate::contract::messages::{encode_message, ContractError, JobCompletion, JobRequest};
use crate::jobs::JobType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    EncodeRequest,
    DecodeRequest,
    JobCompletion,
}

impl Topic {
    pub fn name(&self) -> &'static str {
        match self {
            Topic::EncodeRequest => topics::ENCODE_REQUEST,
            Topic::DecodeRequest => topics::DECODE_REQUEST,
            Topic::JobCompletion => topics::JOB_COMPLETION,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Topic::EncodeRequest, Topic::DecodeRequest, Topic::JobCompletion]
            .into_iter()
            .find(|t| t.name() == name)
    }

    pub fn for_request(job_type: JobType) -> Self {
        match job_type {
            JobType::Encode => Topic::EncodeRequest,
            JobType::Decode => Topic::DecodeRequest,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One message on a topic. `key` is the job id, for partition affinity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRecord {
    pub topic: Topic,
    pub key: String,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// At-least-once publisher. Consumers must tolerate duplicates.
pub trait MessageTransport: Send + Sync {
    fn publish(&self, record: TransportRecord) -> Result<(), TransportError>;
}

pub fn publish_request(transport: &dyn MessageTransport, request: &JobRequest) -> Result<(), TransportError> {
    transport.publish(TransportRecord {
        topic: Topic::for_request(request.job_type()),
        key: request.job_id().to_string(),
        payload: Bytes::from(encode_message(request)?),
    })
}

pub fn publish_completion(transport: &dyn MessageTransport, completion: &JobCompletion) -> Result<(), TransportError> {
    completion.validate()?;
    transport.publish(TransportRecord {
        topic: Topic::JobCompletion,
        key: completion.job_id.to_string(),
        payload: Bytes::from(encode_message(completion)?),
    })
}

#[derive(Default)]
struct TopicState {
    subscribers: Vec<Sender<TransportRecord>>,
    /// Held until the first subscriber shows up.
    backlog: Vec<TransportRecord>,
}

/// Process-local topics. Every subscriber sees every record published after
/// it subscribed; records published with nobody listening are retained and
/// handed to the next subscriber.
#[derive(Default)]
pub struct InMemoryTransport {
    topics: Mutex<HashMap<Topic, TopicState>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic) -> Result<Receiver<TransportRecord>, TransportError> {
        let mut topics = self.lock()?;
        let state = topics.entry(topic).or_default();
        let (tx, rx) = unbounded();
        for record in state.backlog.drain(..) {
            // rx is alive right here
            let _ = tx.send(record);
        }
        state.subscribers.push(tx);
        Ok(rx)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Topic, TopicState>>, TransportError> {
        self.topics.lock().map_err(|_| TransportError::Unavailable("topic map poisoned".into()))
    }
}

impl MessageTransport for InMemoryTransport {
    fn publish(&self, record: TransportRecord) -> Result<(), TransportError> {
        let mut topics = self.lock()?;
        let state = topics.entry(record.topic).or_default();
        state.subscribers.retain(|s| s.send(record.clone()).is_ok());
        if state.subscribers.is_empty() {
            debug!("[TRANSPORT] no subscriber on {}, retaining key={}", record.topic, record.key);
            state.backlog.push(record);
        }
        Ok(())
    }
}

impl fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransport").finish_non_exhaustive()
    }
}
