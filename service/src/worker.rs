//! The worker: a line loop on the async side, the core on blocking threads.

use std::sync::Arc;
use std::thread;

use crossbeam::channel::{bounded, select, Receiver};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use stego_core::codec::{FfmpegCodec, FrameCodec, RawCodec};
use stego_core::config::PipelineConfig;
use stego_core::contract::{InMemoryTransport, Topic, TransportRecord};
use stego_core::jobs::{
    AdmissionCheck, CompletionOutcome, InMemoryJobStore, JobExecutor, JobRunner, JobService, JobStateMachine,
};
use stego_core::pipeline::{estimate_capacity, InputSource};
use stego_core::ports::{FsBlobStore, LocalCrypto};

use crate::commands::{Command, CommandEnvelope, Reply, ReplyEnvelope};
use crate::config::{CodecSelection, ServiceConfig};
use crate::error::ServiceError;

const MAX_LINE_BYTES: usize = 64 * 1024;
const REPLY_QUEUE_DEPTH: usize = 64;

/// What command handlers share. Everything here is blocking.
pub struct WorkerState {
    service: JobService,
    blobs: Arc<FsBlobStore>,
    codec: Arc<dyn FrameCodec>,
    config: PipelineConfig,
}

impl WorkerState {
    pub fn handle(&self, command: Command) -> Result<Reply, ServiceError> {
        match command {
            Command::SubmitEncode { sender, recipient, carrier_path, secret_path, sender_private_key } => {
                let input = self.blobs.ingest(&carrier_path)?;
                let secret = self.blobs.ingest(&secret_path)?;
                let job = self.service.submit_encode(sender, recipient, input, secret, sender_private_key)?;
                Ok(Reply::Submitted { job })
            }
            Command::SubmitDecode { requester, carrier_path, recipient_private_key } => {
                let input = self.blobs.ingest(&carrier_path)?;
                let job = self.service.submit_decode(requester, input, recipient_private_key)?;
                Ok(Reply::Submitted { job })
            }
            Command::Status { job_id, requester } => {
                Ok(Reply::Status { job: self.service.job_status(&job_id, &requester)? })
            }
            Command::Output { job_id, requester } => {
                let handle = self.service.output_handle(&job_id, &requester)?;
                let path = self.blobs.path_of(&handle);
                Ok(Reply::Output { job_id, output_file_id: handle, path })
            }
            Command::Estimate { carrier_path } => {
                let carrier = InputSource::File(carrier_path);
                let estimate = estimate_capacity(self.codec.as_ref(), &carrier, &self.config)?;
                Ok(Reply::Estimate { estimate })
            }
            Command::Shutdown => Ok(Reply::ShuttingDown),
        }
    }

    /// Apply one completion record and turn it into an event line.
    fn forward(&self, record: &TransportRecord) -> Option<ReplyEnvelope> {
        match self.service.handle_completion_record(record) {
            Ok(CompletionOutcome::Applied(job)) => Some(ReplyEnvelope::event(Reply::JobCompleted { job })),
            Ok(CompletionOutcome::Duplicate(job)) => {
                debug!("[WORKER] duplicate completion for {} not forwarded", job.job_id);
                None
            }
            Err(e) => {
                error!("[WORKER] completion key={} not applied: {}", record.key, e);
                Some(ReplyEnvelope::error(None, e.to_string()))
            }
        }
    }
}

pub struct Worker {
    state: Arc<WorkerState>,
    runner: JobRunner,
    completions: Receiver<TransportRecord>,
}

impl Worker {
    /// Wire the core together and start the job runner.
    pub fn start(config: &ServiceConfig) -> Result<Self, ServiceError> {
        config.validate()?;

        let blobs = Arc::new(FsBlobStore::open(&config.blob_root)?);
        let keys = Arc::new(config.load_keys()?);
        let codec: Arc<dyn FrameCodec> = match &config.codec {
            CodecSelection::Ffmpeg => Arc::new(FfmpegCodec::new(&config.pipeline)),
            CodecSelection::Raw(geometry) => Arc::new(RawCodec::new(*geometry)),
        };

        let transport = Arc::new(InMemoryTransport::new());
        let machine = JobStateMachine::new(Arc::new(InMemoryJobStore::new()));
        let admission =
            AdmissionCheck::new(codec.clone(), blobs.clone(), Arc::new(LocalCrypto), config.pipeline.clone());
        let service = JobService::new(machine.clone(), transport.clone()).with_admission(admission);
        let completions = transport.subscribe(Topic::JobCompletion)?;

        let executor = Arc::new(JobExecutor::new(
            machine,
            transport.clone(),
            blobs.clone(),
            keys,
            Arc::new(LocalCrypto),
            codec.clone(),
            config.pipeline.clone(),
        ));
        let runner = JobRunner::from_transport(executor, &transport, config.pipeline.max_concurrent_pipelines)?;

        info!(
            "[WORKER] ready: codec={} blobs={} workers={}",
            codec.name(),
            blobs.root().display(),
            config.pipeline.max_concurrent_pipelines
        );
        let state = WorkerState { service, blobs, codec, config: config.pipeline.clone() };
        Ok(Self { state: Arc::new(state), runner, completions })
    }

    /// Serve until `input` closes or a `shutdown` command arrives. In-flight
    /// jobs are finished and their completions written before returning.
    pub async fn serve<R, W>(self, input: R, output: W) -> Result<(), ServiceError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let Worker { state, runner, completions } = self;
        let (reply_tx, reply_rx) = mpsc::channel::<ReplyEnvelope>(REPLY_QUEUE_DEPTH);

        let writer = tokio::spawn(write_replies(output, reply_rx));

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let forwarder = {
            let state = state.clone();
            let replies = reply_tx.clone();
            thread::Builder::new()
                .name("stego-completions".into())
                .spawn(move || forward_completions(&state, completions, stop_rx, replies))?
        };

        let mut lines = FramedRead::new(input, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
        let mut inflight = JoinSet::new();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            let line = tokio::select! {
                line = lines.next() => line,
                _ = &mut ctrl_c => {
                    info!("[WORKER] interrupted");
                    break;
                }
            };
            let line = match line {
                None => break,
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!("[WORKER] unreadable input line: {}", e);
                    send(&reply_tx, ReplyEnvelope::error(None, e.to_string())).await;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let envelope = match serde_json::from_str::<CommandEnvelope>(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("[WORKER] rejected command: {}", e);
                    send(&reply_tx, ReplyEnvelope::error(None, format!("malformed command: {e}"))).await;
                    continue;
                }
            };
            let CommandEnvelope { id, command } = envelope;
            if matches!(command, Command::Shutdown) {
                info!("[WORKER] shutdown requested");
                send(&reply_tx, ReplyEnvelope::to(id, Reply::ShuttingDown)).await;
                break;
            }

            let state = state.clone();
            let replies = reply_tx.clone();
            inflight.spawn(async move {
                let reply = match tokio::task::spawn_blocking(move || state.handle(command)).await {
                    Ok(Ok(reply)) => ReplyEnvelope::to(id, reply),
                    Ok(Err(e)) => ReplyEnvelope::error(id, e.to_string()),
                    Err(e) => ReplyEnvelope::error(id, format!("command handler failed: {e}")),
                };
                send(&replies, reply).await;
            });
        }

        while let Some(joined) = inflight.join_next().await {
            if let Err(e) = joined {
                error!("[WORKER] command task lost: {}", e);
            }
        }

        // Finish running jobs, then drain the completions they published.
        tokio::task::spawn_blocking(move || runner.shutdown())
            .await
            .map_err(|e| ServiceError::Worker(e.to_string()))?;
        let _ = stop_tx.send(());
        tokio::task::spawn_blocking(move || forwarder.join())
            .await
            .map_err(|e| ServiceError::Worker(e.to_string()))?
            .map_err(|_| ServiceError::Worker("completion forwarder panicked".into()))?;

        drop(reply_tx);
        writer.await.map_err(|e| ServiceError::Worker(e.to_string()))??;
        info!("[WORKER] stopped");
        Ok(())
    }
}

async fn send(replies: &mpsc::Sender<ReplyEnvelope>, reply: ReplyEnvelope) {
    if replies.send(reply).await.is_err() {
        debug!("[WORKER] reply writer gone, dropping reply");
    }
}

async fn write_replies<W>(output: W, mut replies: mpsc::Receiver<ReplyEnvelope>) -> Result<(), ServiceError>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(output, LinesCodec::new());
    while let Some(reply) = replies.recv().await {
        match serde_json::to_string(&reply) {
            Ok(line) => sink.send(line).await?,
            Err(e) => error!("[WORKER] reply not serialisable: {}", e),
        }
    }
    SinkExt::<String>::flush(&mut sink).await?;
    Ok(())
}

fn forward_completions(
    state: &WorkerState,
    records: Receiver<TransportRecord>,
    stop: Receiver<()>,
    replies: mpsc::Sender<ReplyEnvelope>,
) {
    let emit = |record: &TransportRecord| {
        if let Some(reply) = state.forward(record) {
            if replies.blocking_send(reply).is_err() {
                debug!("[WORKER] reply writer gone, dropping completion event");
            }
        }
    };

    loop {
        select! {
            recv(records) -> msg => match msg {
                Ok(record) => emit(&record),
                Err(_) => break,
            },
            recv(stop) -> _ => {
                for record in records.try_iter() {
                    emit(&record);
                }
                break;
            }
        }
    }
    debug!("[WORKER] completion forwarder finished");
}
