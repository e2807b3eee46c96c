use std::io::{Read, Write};

use log::debug;

use crate::pipeline::io::read_frame;
use crate::stego::envelope::PayloadEnvelope;
use crate::stego::error::StegoError;

/// In-place rewrite of one raw frame. Called once per frame, in order; the
/// last frame may be short.
pub trait FrameTransform: Send {
    fn apply(&mut self, frame: &mut [u8]) -> Result<(), StegoError>;

    /// Called once after the last frame.
    fn finish(&mut self) -> Result<(), StegoError> {
        Ok(())
    }

    /// Carrier bits written so far, for telemetry.
    fn bits_written(&self) -> u64 {
        0
    }
}

/// Writes envelope bits into the LSB of consecutive carrier bytes. Once
/// the envelope is exhausted every further byte passes through untouched.
#[derive(Debug, Clone)]
pub struct BitEmbedder {
    envelope: PayloadEnvelope,
    pos: u64,
}

impl BitEmbedder {
    pub fn new(envelope: PayloadEnvelope) -> Self {
        Self { envelope, pos: 0 }
    }

    pub fn is_done(&self) -> bool {
        self.pos >= self.envelope.bit_len()
    }

    pub fn remaining_bits(&self) -> u64 {
        self.envelope.bit_len() - self.pos
    }
}

impl FrameTransform for BitEmbedder {
    #[inline]
    fn apply(&mut self, frame: &mut [u8]) -> Result<(), StegoError> {
        if self.is_done() {
            return Ok(());
        }
        let mut bits = self.envelope.bits_from(self.pos);
        for carrier in frame.iter_mut() {
            let Some(bit) = bits.next() else { break };
            *carrier = (*carrier & 0xFE) | bit;
        }
        self.pos = bits.emitted();
        Ok(())
    }

    /// The carrier ended before the envelope did: the stream was shorter
    /// than the probe promised.
    fn finish(&mut self) -> Result<(), StegoError> {
        if self.is_done() {
            return Ok(());
        }
        Err(StegoError::CapacityExceeded {
            required_bits: self.envelope.bit_len(),
            available_bits: self.pos,
        })
    }

    fn bits_written(&self) -> u64 {
        self.pos
    }
}

/// Single-threaded frame loop over an in-memory or file stream. Holds one
/// frame buffer at a time. Returns the number of raw bytes processed.
pub fn embed_stream<R, W, T>(
    reader: &mut R,
    writer: &mut W,
    transform: &mut T,
    frame_bytes: usize,
) -> Result<u64, StegoError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    T: FrameTransform + ?Sized,
{
    let mut frame = vec![0u8; frame_bytes.max(1)];
    let mut total = 0u64;
    loop {
        let n = read_frame(reader, &mut frame)?;
        if n == 0 {
            break;
        }
        transform.apply(&mut frame[..n])?;
        writer.write_all(&frame[..n])?;
        total += n as u64;
        if n < frame.len() {
            break;
        }
    }
    writer.flush()?;
    transform.finish()?;
    debug!("[EMBED] {} raw bytes, {} bits written", total, transform.bits_written());
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lsb_changes() {
        let env = PayloadEnvelope::with_terminator(&[0xFF, 0x00], &[]);
        let mut emb = BitEmbedder::new(env);
        let mut frame = vec![0b1010_1010u8; 20];
        emb.apply(&mut frame).unwrap();
        for (i, b) in frame.iter().enumerate() {
            assert_eq!(b & 0xFE, 0b1010_1010);
            let expected = if i < 8 { 1 } else { 0 };
            if i < 16 {
                assert_eq!(b & 1, expected, "byte {i}");
            } else {
                assert_eq!(*b, 0b1010_1010, "tail byte {i} must pass through");
            }
        }
        assert!(emb.finish().is_ok());
    }

    #[test]
    fn bits_continue_across_frames() {
        let env = PayloadEnvelope::with_terminator(&[0b1100_0011], &[]);
        let mut emb = BitEmbedder::new(env);
        let mut a = [0u8; 3];
        let mut b = [0u8; 5];
        emb.apply(&mut a).unwrap();
        emb.apply(&mut b).unwrap();
        assert_eq!(a, [1, 1, 0]);
        assert_eq!(b, [0, 0, 0, 1, 1]);
    }

    #[test]
    fn short_carrier_fails_on_finish() {
        let env = PayloadEnvelope::with_terminator(b"abc", &[]);
        let mut emb = BitEmbedder::new(env);
        emb.apply(&mut [0u8; 10]).unwrap();
        match emb.finish() {
            Err(StegoError::CapacityExceeded { required_bits, available_bits }) => {
                assert_eq!(required_bits, 24);
                assert_eq!(available_bits, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
