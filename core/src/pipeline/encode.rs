use std::io::Write;
use std::thread;
use std::time::Instant;

use bytes::BytesMut;
use crossbeam::channel::{bounded, unbounded};
use log::info;
use serde::Serialize;

use crate::codec::{read_stderr_tail, CodecError, FrameCodec, FrameGeometry, ProcessGroup, StageRole, VideoProbe};
use crate::config::PipelineConfig;
use crate::pipeline::error::PipelineError;
use crate::pipeline::io::{pump, read_frame, InputSource};
use crate::pipeline::supervisor::{deadline_after, settle, spawn_task, CancelFlag, Supervisor, TaskEvent};
use crate::stego::{BitEmbedder, CapacityEstimate, FrameTransform, PayloadEnvelope};
use crate::telemetry::{PipelineCounters, Stage, TelemetrySnapshot, TelemetryTimer};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    /// Present when the pipeline probed the carrier itself.
    pub probe: Option<VideoProbe>,
    pub telemetry: TelemetrySnapshot,
}

/// The probe shares the job deadline anchored at `started`.
fn probe_carrier(
    codec: &dyn FrameCodec,
    carrier: &InputSource,
    config: &PipelineConfig,
    started: Instant,
) -> Result<VideoProbe, PipelineError> {
    let mut reader = carrier.open()?;
    let limit = config.job_timeout();
    match codec.probe(&mut *reader, deadline_after(started, limit)) {
        Ok(probe) => Ok(probe),
        Err(CodecError::DeadlineExceeded { .. }) => Err(PipelineError::Timeout { limit }),
        Err(e) => Err(e.into()),
    }
}

/// Probe the carrier and report how much it can hold. Spawns nothing but
/// the probe, which is bounded by the job timeout.
pub fn estimate_capacity(
    codec: &dyn FrameCodec,
    carrier: &InputSource,
    config: &PipelineConfig,
) -> Result<CapacityEstimate, PipelineError> {
    config.validate()?;
    let probe = probe_carrier(codec, carrier, config, Instant::now())?;
    let estimate = CapacityEstimate::from_probe(&probe);
    info!(
        "[PIPELINE] capacity {}x{} frames={} bits={} max_payload={}B",
        estimate.width, estimate.height, estimate.frame_count, estimate.capacity_bits, estimate.max_payload_bytes
    );
    Ok(estimate)
}

/// probe -> capacity check -> decode | embed | encode -> sink.
///
/// The capacity check runs before any decoder or encoder process exists.
pub fn run_encode_pipeline(
    codec: &dyn FrameCodec,
    carrier: &InputSource,
    payload: &[u8],
    sink: &mut (dyn Write + Send),
    config: &PipelineConfig,
) -> Result<PipelineReport, PipelineError> {
    config.validate()?;
    let mut timer = TelemetryTimer::new();

    let started = timer.start_time;
    let probe = timer.time(Stage::Probe, || probe_carrier(codec, carrier, config, started))?;
    CapacityEstimate::from_probe(&probe).check(payload.len())?;

    let embedder = BitEmbedder::new(PayloadEnvelope::new(payload));
    transform_with_timer(codec, carrier, embedder, &probe.geometry, sink, config, timer, Some(probe))
}

/// Decode | transform | encode with a caller-supplied frame transform and a
/// known geometry.
pub fn run_transform_pipeline<T: FrameTransform>(
    codec: &dyn FrameCodec,
    carrier: &InputSource,
    transform: T,
    geometry: &FrameGeometry,
    sink: &mut (dyn Write + Send),
    config: &PipelineConfig,
) -> Result<PipelineReport, PipelineError> {
    config.validate()?;
    transform_with_timer(codec, carrier, transform, geometry, sink, config, TelemetryTimer::new(), None)
}

#[allow(clippy::too_many_arguments)]
fn transform_with_timer<T: FrameTransform>(
    codec: &dyn FrameCodec,
    carrier: &InputSource,
    transform: T,
    geometry: &FrameGeometry,
    sink: &mut (dyn Write + Send),
    config: &PipelineConfig,
    mut timer: TelemetryTimer,
    probe: Option<VideoProbe>,
) -> Result<PipelineReport, PipelineError> {
    geometry.validate()?;
    let frame_bytes = geometry.frame_bytes();
    let chunk = config.pipe_chunk_size;

    // Open the carrier first: a missing carrier must not leave processes behind.
    let mut source = carrier.open()?;

    info!(
        "[PIPELINE] Start encode pipeline: {}x{} @ {} via {}",
        geometry.width, geometry.height, geometry.frame_rate, codec.name()
    );

    // ---- Processes ----
    let mut group = ProcessGroup::new();
    let decoder = group.spawn(StageRole::Decoder, codec.decoder_command())?;
    let mut dec_in = decoder.take_stdin()?;
    let mut dec_out = decoder.take_stdout()?;
    let dec_err = decoder.take_stderr()?;
    let encoder = group.spawn(StageRole::Encoder, codec.encoder_command(geometry))?;
    let mut enc_in = encoder.take_stdin()?;
    let mut enc_out = encoder.take_stdout()?;
    let enc_err = encoder.take_stderr()?;

    // ---- Channels ----
    let cancel = CancelFlag::default();
    let (events_tx, events_rx) = unbounded::<TaskEvent>();
    let (frame_tx, frame_rx) = bounded::<BytesMut>(config.frame_queue_depth);
    let mut supervisor = Supervisor::new(config.job_timeout(), timer.start_time);

    let (reports, stderr) = thread::scope(|scope| {
        let dec_tail = scope.spawn(move || read_stderr_tail(dec_err));
        let enc_tail = scope.spawn(move || read_stderr_tail(enc_err));

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

        // ---- Decode: decoder stdout -> frames ----
        let decode_cancel = cancel.clone();
        spawn_task(scope, &events_tx, Stage::Decode, move || {
            let mut counters = PipelineCounters::default();
            while !decode_cancel.is_cancelled() {
                let mut frame = BytesMut::zeroed(frame_bytes);
                let n = read_frame(&mut dec_out, &mut frame).map_err(PipelineError::stage_io(Stage::Decode))?;
                if n == 0 {
                    break;
                }
                frame.truncate(n);
                counters.add_frame(n);
                frame_tx.send(frame).map_err(|_| PipelineError::ChannelClosed { stage: Stage::Decode })?;
                if n < frame_bytes {
                    break;
                }
            }
            Ok(((), counters))
        });

        // ---- Embed: frames -> transform -> encoder stdin ----
        spawn_task(scope, &events_tx, Stage::Embed, move || {
            let mut transform = transform;
            let mut counters = PipelineCounters::default();
            for mut frame in frame_rx.iter() {
                transform.apply(&mut frame)?;
                enc_in.write_all(&frame).map_err(PipelineError::stage_io(Stage::Embed))?;
            }
            enc_in.flush().map_err(PipelineError::stage_io(Stage::Embed))?;
            drop(enc_in);
            transform.finish()?;
            counters.add_payload_bits(transform.bits_written());
            Ok(((), counters))
        });

        // ---- Sink: encoder stdout -> sink ----
        let sink_cancel = cancel.clone();
        spawn_task(scope, &events_tx, Stage::Sink, move || {
            let mut counters = PipelineCounters::default();
            let n = pump(&mut enc_out, sink, chunk, &sink_cancel).map_err(PipelineError::stage_io(Stage::Sink))?;
            counters.add_encoded(n);
            Ok(((), counters))
        });

        drop(events_tx);
        supervisor.expect(4);
        supervisor.run(&events_rx, &mut group, &cancel, &mut timer);

        let reports = group.reap_all(Instant::now() + config.terminate_grace());
        let stderr = vec![
            (StageRole::Decoder, dec_tail.join().unwrap_or_default()),
            (StageRole::Encoder, enc_tail.join().unwrap_or_default()),
        ];
        (reports, stderr)
    });

    let mut outcome = supervisor.into_outcome();
    settle(&mut outcome, &reports?, &stderr)?;

    timer.finish();
    let telemetry = TelemetrySnapshot::from(&outcome.counters, &timer);
    info!("[PIPELINE] encode finished: {}", telemetry.summary());
    Ok(PipelineReport { probe, telemetry })
}
