//! Bounded worker pool fed from the request topics.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, never, select, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::contract::{decode_request, InMemoryTransport, JobRequest, Topic, TransportError, TransportRecord};
use crate::jobs::executor::JobExecutor;

pub struct JobRunner {
    shutdown: Sender<()>,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl JobRunner {
    /// `workers` bounds how many pipelines run at once.
    pub fn start(
        executor: Arc<JobExecutor>,
        encode_requests: Receiver<TransportRecord>,
        decode_requests: Receiver<TransportRecord>,
        workers: usize,
    ) -> io::Result<Self> {
        let workers = workers.max(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (work_tx, work_rx) = bounded::<JobRequest>(workers);

        let dispatcher = thread::Builder::new()
            .name("stego-dispatch".into())
            .spawn(move || dispatch(encode_requests, decode_requests, shutdown_rx, work_tx))?;

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let rx = work_rx.clone();
            let executor = executor.clone();
            handles.push(thread::Builder::new().name(format!("stego-worker-{i}")).spawn(move || {
                debug!("[WORKER-{i}] starting");
                work(i, &executor, rx);
                debug!("[WORKER-{i}] finished");
            })?);
        }
        info!("[RUNNER] started with {} worker(s)", workers);

        Ok(Self { shutdown: shutdown_tx, dispatcher: Some(dispatcher), workers: handles })
    }

    /// Subscribe to both request topics of `transport`.
    pub fn from_transport(
        executor: Arc<JobExecutor>,
        transport: &InMemoryTransport,
        workers: usize,
    ) -> Result<Self, TransportError> {
        let encode = transport.subscribe(Topic::EncodeRequest)?;
        let decode = transport.subscribe(Topic::DecodeRequest)?;
        Self::start(executor, encode, decode, workers).map_err(|e| TransportError::Unavailable(e.to_string()))
    }

    /// Stop taking requests, let in-flight jobs finish, join every thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.try_send(());
        self.join_all();
    }

    fn join_all(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        info!("[RUNNER] stopped");
    }
}

fn dispatch(
    encode: Receiver<TransportRecord>,
    decode: Receiver<TransportRecord>,
    shutdown: Receiver<()>,
    work: Sender<JobRequest>,
) {
    let mut encode = encode;
    let mut decode = decode;
    let mut open = 2;

    while open > 0 {
        let (topic, received) = select! {
            recv(shutdown) -> _ => break,
            recv(encode) -> msg => (Topic::EncodeRequest, msg),
            recv(decode) -> msg => (Topic::DecodeRequest, msg),
        };
        let record = match received {
            Ok(record) => record,
            Err(_) => {
                debug!("[DISPATCH] {} closed", topic);
                match topic {
                    Topic::EncodeRequest => encode = never(),
                    _ => decode = never(),
                }
                open -= 1;
                continue;
            }
        };

        let request = match decode_request(&record.payload) {
            Ok(request) => request,
            Err(e) => {
                error!("[DISPATCH] dropping undecodable record key={} on {}: {}", record.key, topic, e);
                continue;
            }
        };
        if Topic::for_request(request.job_type()) != topic {
            warn!("[DISPATCH] {} request for {} arrived on {}", request.job_type(), request.job_id(), topic);
        }
        if work.send(request).is_err() {
            break;
        }
    }
    debug!("[DISPATCH] exiting");
}

fn work(id: usize, executor: &JobExecutor, requests: Receiver<JobRequest>) {
    for request in requests.iter() {
        let job_id = request.job_id().clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&request)));
        match outcome {
            Ok(Ok(Some(completion))) => debug!("[WORKER-{id}] {} -> {}", job_id, completion.status),
            Ok(Ok(None)) => debug!("[WORKER-{id}] {} skipped, not pending", job_id),
            Ok(Err(e)) => error!("[WORKER-{id}] {} not executed: {}", job_id, e),
            Err(_) => error!("[WORKER-{id}] {} panicked outside the pipeline", job_id),
        }
    }
}
