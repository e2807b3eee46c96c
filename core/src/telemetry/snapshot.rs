//! telemetry/snapshot.rs
//! Frozen view of one pipeline invocation, serialisable for logs and replies.

use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::telemetry::counters::PipelineCounters;
use crate::telemetry::timers::{Stage, StageTimes, TelemetryTimer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub carrier_bytes: u64,
    pub frames: u64,
    pub raw_bytes: u64,
    pub payload_bits: u64,
    pub encoded_bytes: u64,
    pub throughput_raw_bytes_per_sec: f64,
    pub elapsed: Duration,
    pub stage_times: StageTimes,
}

impl TelemetrySnapshot {
    pub fn from(counters: &PipelineCounters, timer: &TelemetryTimer) -> Self {
        let elapsed = timer.elapsed();
        let throughput = if elapsed.as_secs_f64() > 0.0 {
            counters.raw_bytes as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        Self {
            carrier_bytes: counters.carrier_bytes,
            frames: counters.frames,
            raw_bytes: counters.raw_bytes,
            payload_bits: counters.payload_bits,
            encoded_bytes: counters.encoded_bytes,
            throughput_raw_bytes_per_sec: throughput,
            elapsed,
            stage_times: timer.stage_times.clone(),
        }
    }

    pub fn has_all_stages(&self, expected: &[Stage]) -> bool {
        expected.iter().all(|s| self.stage_times.contains(*s))
    }

    /// One-line summary for the executor's log.
    pub fn summary(&self) -> String {
        format!(
            "frames={} raw={}B payload_bits={} encoded={}B elapsed={:.1}ms",
            self.frames,
            self.raw_bytes,
            self.payload_bits,
            self.encoded_bytes,
            self.elapsed.as_secs_f64() * 1_000.0,
        )
    }
}
