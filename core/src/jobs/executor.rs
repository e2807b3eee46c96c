use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use log::{error, info};
use thiserror::Error;

use crate::codec::FrameCodec;
use crate::config::PipelineConfig;
use crate::contract::{publish_completion, DecodeRequest, EncodeRequest, JobCompletion, JobRequest, MessageTransport};
use crate::jobs::error::JobError;
use crate::jobs::machine::JobStateMachine;
use crate::jobs::model::{Job, JobType};
use crate::pipeline::{byte_channel, run_decode_pipeline, run_encode_pipeline, InputSource, PipelineError};
use crate::ports::{open_payload, parse_sealed, read_blob, seal_payload, BlobError, BlobStore, CryptoError, CryptoProvider, KeyError, KeyStore};
use crate::types::{BlobHandle, JobId};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("job {job_id} does not match its request: {reason}")]
    Mismatch { job_id: JobId, reason: &'static str },

    #[error("job execution panicked")]
    Panicked,
}

/// What a blob store reports when our writer went away mid-stream.
fn producer_aborted(err: &BlobError) -> bool {
    matches!(err, BlobError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
}

/// Worker side: turns one request into exactly one completion.
pub struct JobExecutor {
    machine: JobStateMachine,
    transport: Arc<dyn MessageTransport>,
    blobs: Arc<dyn BlobStore>,
    keys: Arc<dyn KeyStore>,
    crypto: Arc<dyn CryptoProvider>,
    codec: Arc<dyn FrameCodec>,
    config: PipelineConfig,
}

impl JobExecutor {
    pub fn new(
        machine: JobStateMachine,
        transport: Arc<dyn MessageTransport>,
        blobs: Arc<dyn BlobStore>,
        keys: Arc<dyn KeyStore>,
        crypto: Arc<dyn CryptoProvider>,
        codec: Arc<dyn FrameCodec>,
        config: PipelineConfig,
    ) -> Self {
        Self { machine, transport, blobs, keys, crypto, codec, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// `Ok(None)`: the job was not PENDING (repeated delivery), nothing ran
    /// and nothing was published.
    pub fn execute(&self, request: &JobRequest) -> Result<Option<JobCompletion>, JobError> {
        let job_id = request.job_id();
        let Some(job) = self.machine.begin_processing(job_id)? else {
            return Ok(None);
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run(&job, request)))
            .unwrap_or(Err(ExecutionError::Panicked));

        let completion = match result {
            Ok(output) => {
                info!("[JOB] {} produced {}", job_id, output);
                JobCompletion::completed(job_id.clone(), output)
            }
            Err(e) => {
                error!("[JOB] {} failed: {}", job_id, e);
                JobCompletion::failed(job_id.clone(), e.to_string())
            }
        };
        publish_completion(self.transport.as_ref(), &completion)?;
        Ok(Some(completion))
    }

    fn run(&self, job: &Job, request: &JobRequest) -> Result<BlobHandle, ExecutionError> {
        match (job.job_type, request) {
            (JobType::Encode, JobRequest::Encode(r)) => self.run_encode(job, r),
            (JobType::Decode, JobRequest::Decode(r)) => self.run_decode(r),
            _ => Err(ExecutionError::Mismatch { job_id: job.job_id.clone(), reason: "job type differs" }),
        }
    }

    fn run_encode(&self, job: &Job, request: &EncodeRequest) -> Result<BlobHandle, ExecutionError> {
        if job.recipient_ref.as_ref() != Some(&request.recipient_user_id) {
            return Err(ExecutionError::Mismatch { job_id: job.job_id.clone(), reason: "recipient differs" });
        }

        let secret = read_blob(self.blobs.as_ref(), &request.secret_file_id)?;
        let recipient_key = self.keys.encryption_key(&request.recipient_user_id)?;
        let signing_key = request.sender_private_key.decode()?;
        let sealed = seal_payload(self.crypto.as_ref(), &job.sender_ref, &signing_key, &recipient_key, &secret)?;

        let carrier = InputSource::from_blob(self.blobs.clone(), request.input_file_id.clone());
        let (mut writer, mut reader) = byte_channel(self.config.frame_queue_depth.max(4));
        let blobs = self.blobs.clone();

        // The encoded stream goes straight into the store while it is produced.
        let (pipeline, closed, stored) = thread::scope(|scope| {
            let store = scope.spawn(move || blobs.put(&mut reader));
            let pipeline = run_encode_pipeline(self.codec.as_ref(), &carrier, &sealed, &mut writer, &self.config);
            let closed = match &pipeline {
                Ok(_) => writer.finish(),
                Err(_) => {
                    drop(writer);
                    Ok(())
                }
            };
            (pipeline, closed, store.join())
        });
        let stored = stored.map_err(|_| ExecutionError::Panicked)?;

        match (pipeline, stored) {
            (Ok(report), Ok(handle)) => {
                closed.map_err(PipelineError::Io)?;
                info!("[JOB] {} encode: {}", job.job_id, report.telemetry.summary());
                Ok(handle)
            }
            // The store gave up first; the pipeline only saw its sink close.
            (Err(_), Err(b)) if !producer_aborted(&b) => Err(b.into()),
            (Err(p), _) => Err(p.into()),
            (Ok(_), Err(b)) => Err(b.into()),
        }
    }

    fn run_decode(&self, request: &DecodeRequest) -> Result<BlobHandle, ExecutionError> {
        let carrier = InputSource::from_blob(self.blobs.clone(), request.input_file_id.clone());
        let report = run_decode_pipeline(self.codec.as_ref(), &carrier, &self.config)?;
        info!("[JOB] {} decode: {}", request.job_id, report.telemetry.summary());

        let sealed = parse_sealed(&report.payload)?;
        let verification_key = self.keys.verification_key(&sealed.sender)?;
        let recipient_key = request.recipient_private_key.decode()?;
        let plaintext = open_payload(self.crypto.as_ref(), &sealed, &verification_key, &recipient_key)?;

        Ok(self.blobs.put(&mut plaintext.as_slice())?)
    }
}
