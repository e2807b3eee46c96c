use serde::{Deserialize, Serialize};

use crate::codec::{FrameRate, VideoProbe};
use crate::constants::PAYLOAD_TERMINATOR;
use crate::stego::error::StegoError;

/// Read-only capacity report for a carrier. One carrier byte holds one bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityEstimate {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub frame_count: u64,
    pub total_raw_bytes: u64,
    pub capacity_bits: u64,
    /// Largest payload that still leaves room for the terminator.
    pub max_payload_bytes: u64,
}

impl CapacityEstimate {
    pub fn from_probe(probe: &VideoProbe) -> Self {
        let terminator_len = PAYLOAD_TERMINATOR.len() as u64;
        Self {
            width: probe.geometry.width,
            height: probe.geometry.height,
            frame_rate: probe.geometry.frame_rate,
            frame_count: probe.frame_count,
            total_raw_bytes: probe.total_raw_bytes,
            capacity_bits: probe.total_raw_bytes,
            max_payload_bytes: (probe.total_raw_bytes / 8).saturating_sub(terminator_len),
        }
    }

    pub fn required_bits(&self, payload_len: usize) -> u64 {
        self.required_bits_for(payload_len as u64)
    }

    pub fn required_bits_for(&self, payload_len: u64) -> u64 {
        payload_len.saturating_add(PAYLOAD_TERMINATOR.len() as u64).saturating_mul(8)
    }

    pub fn check(&self, payload_len: usize) -> Result<(), StegoError> {
        self.check_len(payload_len as u64)
    }

    /// `check` for a payload that is only known by its size.
    pub fn check_len(&self, payload_len: u64) -> Result<(), StegoError> {
        let required_bits = self.required_bits_for(payload_len);
        if required_bits > self.capacity_bits {
            return Err(StegoError::CapacityExceeded {
                required_bits,
                available_bits: self.capacity_bits,
            });
        }
        Ok(())
    }
}
