use std::io::{self, Read};

use log::debug;

use crate::constants::{DEFAULT_MAX_PAYLOAD_BYTES, PAYLOAD_TERMINATOR};
use crate::stego::error::StegoError;

/// Rebuilds bytes from carrier LSBs (MSB first) and stops at the first
/// terminator match, or once `limit` payload bytes went by without one.
#[derive(Debug, Clone)]
pub struct BitExtractor {
    terminator: Vec<u8>,
    limit: u64,
    out: Vec<u8>,
    acc: u8,
    nbits: u8,
    scanned: u64,
    found: bool,
    over_limit: bool,
}

impl Default for BitExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl BitExtractor {
    pub fn new() -> Self {
        Self::with_terminator(PAYLOAD_TERMINATOR)
    }

    pub fn with_terminator(terminator: &[u8]) -> Self {
        Self {
            terminator: terminator.to_vec(),
            limit: DEFAULT_MAX_PAYLOAD_BYTES,
            out: Vec::new(),
            acc: 0,
            nbits: 0,
            scanned: 0,
            found: false,
            over_limit: false,
        }
    }

    pub fn with_payload_limit(mut self, limit_bytes: u64) -> Self {
        self.limit = limit_bytes;
        self
    }

    /// Feed raw bytes. Returns `Some(consumed)` once extraction is over,
    /// either on a terminator match or at the payload limit; bytes after
    /// `consumed` were not looked at.
    pub fn push(&mut self, chunk: &[u8]) -> Option<usize> {
        if self.found || self.over_limit {
            return Some(0);
        }
        let max_len = self.limit.saturating_add(self.terminator.len() as u64);
        for (i, byte) in chunk.iter().enumerate() {
            self.acc = (self.acc << 1) | (byte & 1);
            self.nbits += 1;
            if self.nbits < 8 {
                continue;
            }
            self.out.push(self.acc);
            self.acc = 0;
            self.nbits = 0;

            if self.out.len() >= self.terminator.len() && self.out.ends_with(&self.terminator) {
                self.found = true;
                self.scanned += i as u64 + 1;
                return Some(i + 1);
            }
            if self.out.len() as u64 >= max_len {
                debug!("[EXTRACT] no terminator within {} payload bytes, giving up", self.limit);
                self.over_limit = true;
                self.scanned += i as u64 + 1;
                return Some(i + 1);
            }
        }
        self.scanned += chunk.len() as u64;
        None
    }

    pub fn is_found(&self) -> bool {
        self.found
    }

    pub fn raw_bytes_scanned(&self) -> u64 {
        self.scanned
    }

    /// Payload bits recovered so far, terminator excluded once matched.
    pub fn payload_bits(&self) -> u64 {
        let len = if self.found { self.out.len() - self.terminator.len() } else { self.out.len() };
        len as u64 * 8
    }

    /// Payload with the terminator stripped.
    pub fn into_payload(mut self) -> Result<Vec<u8>, StegoError> {
        if self.over_limit {
            return Err(StegoError::PayloadLimitExceeded {
                limit_bytes: self.limit,
                raw_bytes_scanned: self.scanned,
            });
        }
        if !self.found {
            return Err(StegoError::TerminatorNotFound { raw_bytes_scanned: self.scanned });
        }
        let end = self.out.len() - self.terminator.len();
        self.out.truncate(end);
        Ok(self.out)
    }
}

/// Read until the terminator matches or the stream ends.
pub fn extract_stream<R: Read + ?Sized>(reader: &mut R, chunk_size: usize) -> Result<Vec<u8>, StegoError> {
    let mut extractor = BitExtractor::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if extractor.push(&buf[..n]).is_some() {
            break;
        }
    }
    debug!("[EXTRACT] scanned {} raw bytes, found={}", extractor.raw_bytes_scanned(), extractor.is_found());
    extractor.into_payload()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lsb_encode(bytes: &[u8]) -> Vec<u8> {
        bytes.iter().flat_map(|b| (0..8).rev().map(move |s| 0xF0 | ((b >> s) & 1))).collect()
    }

    #[test]
    fn stops_at_terminator_and_reports_consumed() {
        let mut carrier = lsb_encode(b"xyEND");
        carrier.extend_from_slice(&[0xAA; 64]);
        let mut ex = BitExtractor::with_terminator(b"END");
        assert_eq!(ex.push(&carrier), Some(40));
        assert_eq!(ex.into_payload().unwrap(), b"xy");
    }

    #[test]
    fn empty_payload_matches_immediately() {
        let mut ex = BitExtractor::with_terminator(b"END");
        assert_eq!(ex.push(&lsb_encode(b"END")), Some(24));
        assert!(ex.into_payload().unwrap().is_empty());
    }

    #[test]
    fn payload_limit_bounds_the_rebuilt_bytes() {
        let mut ex = BitExtractor::with_terminator(b"END").with_payload_limit(4);
        // 4 payload bytes + 3 terminator bytes, 8 carrier bytes each.
        assert_eq!(ex.push(&[0u8; 4096]), Some(56));
        assert_eq!(ex.push(&[0u8; 16]), Some(0));
        match ex.into_payload() {
            Err(StegoError::PayloadLimitExceeded { limit_bytes, raw_bytes_scanned }) => {
                assert_eq!(limit_bytes, 4);
                assert_eq!(raw_bytes_scanned, 56);
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut ex = BitExtractor::with_terminator(b"END").with_payload_limit(4);
        assert_eq!(ex.push(&lsb_encode(b"abcdEND")), Some(56));
        assert_eq!(ex.into_payload().unwrap(), b"abcd");
    }

    #[test]
    fn missing_terminator_is_an_error() {
        let mut carrier: &[u8] = &[0u8; 512];
        match extract_stream(&mut carrier, 100) {
            Err(StegoError::TerminatorNotFound { raw_bytes_scanned }) => assert_eq!(raw_bytes_scanned, 512),
            other => panic!("unexpected {other:?}"),
        }
    }
}
