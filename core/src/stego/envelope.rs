use crate::constants::PAYLOAD_TERMINATOR;

/// Payload immediately followed by the terminator. No length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEnvelope {
    bytes: Vec<u8>,
    payload_len: usize,
}

impl PayloadEnvelope {
    pub fn new(payload: &[u8]) -> Self {
        Self::with_terminator(payload, PAYLOAD_TERMINATOR)
    }

    pub fn with_terminator(payload: &[u8], terminator: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(payload.len() + terminator.len());
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(terminator);
        Self { bytes, payload_len: payload.len() }
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[..self.payload_len]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Carrier bytes needed: one per envelope bit.
    pub fn bit_len(&self) -> u64 {
        self.bytes.len() as u64 * 8
    }

    pub fn bits(&self) -> EnvelopeBits<'_> {
        self.bits_from(0)
    }

    /// Resume the bit stream at `pos` (clamped to the end).
    pub fn bits_from(&self, pos: u64) -> EnvelopeBits<'_> {
        EnvelopeBits { bytes: &self.bytes, pos: pos.min(self.bit_len()) }
    }
}

/// Envelope bits, most significant bit of each byte first.
#[derive(Debug, Clone)]
pub struct EnvelopeBits<'a> {
    bytes: &'a [u8],
    pos: u64,
}

impl EnvelopeBits<'_> {
    pub fn remaining(&self) -> u64 {
        self.bytes.len() as u64 * 8 - self.pos
    }

    pub fn emitted(&self) -> u64 {
        self.pos
    }
}

impl Iterator for EnvelopeBits<'_> {
    type Item = u8;

    #[inline]
    fn next(&mut self) -> Option<u8> {
        let byte = *self.bytes.get((self.pos / 8) as usize)?;
        let shift = 7 - (self.pos % 8) as u32;
        self.pos += 1;
        Some((byte >> shift) & 1)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for EnvelopeBits<'_> {}
