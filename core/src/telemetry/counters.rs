//! telemetry/counters.rs
//! Mutable counters collected by pipeline tasks.
//!
//! Each task owns its own counters and they are merged once the task is
//! joined, so no locks or atomics sit on the hot path.
use std::ops::AddAssign;
use serde::{Deserialize, Serialize};

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounters {
    /// Carrier bytes fed to the decoder.
    pub carrier_bytes: u64,
    /// Raw frames seen between decoder and encoder (or extractor).
    pub frames: u64,
    pub raw_bytes: u64,
    /// Envelope bits written (embed) or payload bits recovered (extract).
    pub payload_bits: u64,
    /// Bytes produced by the encoder and handed to the sink.
    pub encoded_bytes: u64,
}

impl PipelineCounters {
    /// Record one raw frame (the last one may be short).
    pub fn add_frame(&mut self, len: usize) {
        self.frames += 1;
        self.raw_bytes += len as u64;
    }

    pub fn add_carrier(&mut self, len: u64) {
        self.carrier_bytes += len;
    }

    pub fn add_payload_bits(&mut self, bits: u64) {
        self.payload_bits += bits;
    }

    pub fn add_encoded(&mut self, len: u64) {
        self.encoded_bytes += len;
    }

    pub fn merge(&mut self, other: &PipelineCounters) {
        self.carrier_bytes += other.carrier_bytes;
        self.frames += other.frames;
        self.raw_bytes += other.raw_bytes;
        self.payload_bits += other.payload_bits;
        self.encoded_bytes += other.encoded_bytes;
    }
}

impl AddAssign for PipelineCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(&rhs);
    }
}
