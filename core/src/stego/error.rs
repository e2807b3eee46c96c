use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StegoError {
    #[error("payload needs {required_bits} carrier bits but only {available_bits} are available")]
    CapacityExceeded { required_bits: u64, available_bits: u64 },

    #[error("terminator not found after scanning {raw_bytes_scanned} raw bytes")]
    TerminatorNotFound { raw_bytes_scanned: u64 },

    #[error("no terminator within the first {limit_bytes} payload bytes ({raw_bytes_scanned} raw bytes scanned)")]
    PayloadLimitExceeded { limit_bytes: u64, raw_bytes_scanned: u64 },

    /// A frame transform refused a frame.
    #[error("frame rejected: {0}")]
    Rejected(String),

    #[error("stego I/O error: {0}")]
    Io(#[from] io::Error),
}
