use std::io::{self, Read};
use std::thread;
use std::time::Instant;

use crossbeam::channel::unbounded;
use log::info;

use crate::codec::{read_stderr_tail, FrameCodec, ProcessGroup, StageRole};
use crate::config::PipelineConfig;
use crate::pipeline::error::PipelineError;
use crate::pipeline::io::{pump, InputSource};
use crate::pipeline::supervisor::{settle, spawn_task, CancelFlag, Supervisor, TaskEvent};
use crate::stego::BitExtractor;
use crate::telemetry::{PipelineCounters, Stage, TelemetrySnapshot, TelemetryTimer};

#[derive(Debug, Clone)]
pub struct ExtractReport {
    /// Payload with the terminator stripped.
    pub payload: Vec<u8>,
    pub telemetry: TelemetrySnapshot,
}

/// decode | extract. The decoder is killed as soon as the terminator
/// matches; whatever it still had to say is discarded. A carrier that
/// yields `max_payload_bytes` without a terminator fails the job.
pub fn run_decode_pipeline(
    codec: &dyn FrameCodec,
    carrier: &InputSource,
    config: &PipelineConfig,
) -> Result<ExtractReport, PipelineError> {
    config.validate()?;
    let mut timer = TelemetryTimer::new();
    let chunk = config.pipe_chunk_size;
    let payload_limit = config.max_payload_bytes;
    let mut source = carrier.open()?;

    info!("[PIPELINE] Start decode pipeline via {}", codec.name());

    let mut group = ProcessGroup::new();
    let decoder = group.spawn(StageRole::Decoder, codec.decoder_command())?;
    let mut dec_in = decoder.take_stdin()?;
    let mut dec_out = decoder.take_stdout()?;
    let dec_err = decoder.take_stderr()?;

    let cancel = CancelFlag::default();
    let (events_tx, events_rx) = unbounded::<TaskEvent>();
    let mut supervisor =
        Supervisor::new(config.job_timeout(), timer.start_time).stop_on_success(Stage::Extract);

    let (payload, reports, stderr) = thread::scope(|scope| {
        let dec_tail = scope.spawn(move || read_stderr_tail(dec_err));

        // ---- Feed: carrier -> decoder stdin ----
        let feed_cancel = cancel.clone();
        spawn_task(scope, &events_tx, Stage::Feed, move || {
            let mut counters = PipelineCounters::default();
            let n = pump(&mut source, &mut dec_in, chunk, &feed_cancel)
                .map_err(PipelineError::stage_io(Stage::Feed))?;
            drop(dec_in);
            counters.add_carrier(n);
            Ok(((), counters))
        });

        // ---- Extract: decoder stdout -> LSB reader ----
        let extract = spawn_task(scope, &events_tx, Stage::Extract, move || {
            let mut extractor = BitExtractor::new().with_payload_limit(payload_limit);
            let mut buf = vec![0u8; chunk];
            loop {
                let n = match dec_out.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(PipelineError::StageIo { stage: Stage::Extract, source: e }),
                };
                if extractor.push(&buf[..n]).is_some() {
                    break;
                }
            }
            drop(dec_out);

            let mut counters = PipelineCounters::default();
            counters.raw_bytes = extractor.raw_bytes_scanned();
            counters.add_payload_bits(extractor.payload_bits());
            Ok((extractor.into_payload()?, counters))
        });

        drop(events_tx);
        supervisor.expect(2);
        supervisor.run(&events_rx, &mut group, &cancel, &mut timer);

        let reports = group.reap_all(Instant::now() + config.terminate_grace());
        let stderr = vec![(StageRole::Decoder, dec_tail.join().unwrap_or_default())];
        let payload = extract.join().ok().flatten();
        (payload, reports, stderr)
    });

    let mut outcome = supervisor.into_outcome();
    settle(&mut outcome, &reports?, &stderr)?;

    // A clean settle with no payload can only mean the extractor task was lost.
    let payload = payload.ok_or(PipelineError::Panicked { stage: Stage::Extract })?;

    timer.finish();
    let telemetry = TelemetrySnapshot::from(&outcome.counters, &timer);
    info!("[PIPELINE] decode finished: {} payload bytes, {}", payload.len(), telemetry.summary());
    Ok(ExtractReport { payload, telemetry })
}
