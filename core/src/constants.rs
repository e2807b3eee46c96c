/// End-of-payload marker appended after the sealed payload.
/// There is no length prefix: extraction scans for the first occurrence.
pub const PAYLOAD_TERMINATOR: &[u8] = b"PQCSTEGO_END";

/// Raw frames are exchanged with the codec as packed RGBA.
pub const RAW_PIXEL_FORMAT: &str = "rgba";
pub const BYTES_PER_PIXEL: usize = 4;

/// Largest payload extraction will rebuild before giving up on a carrier.
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// Pipe pump buffer (carrier -> decoder, decoder -> extractor).
pub const DEFAULT_PIPE_CHUNK_SIZE: usize = 64 * 1024;
pub const MIN_PIPE_CHUNK_SIZE: usize = 4 * 1024;
pub const MAX_PIPE_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Raw frames allowed in flight between the decoder reader and the embedder.
pub const DEFAULT_FRAME_QUEUE_DEPTH: usize = 4;

/// Wall-clock bound for a single pipeline invocation.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 15 * 60;

/// How long reaping may take once a stage is expected to exit.
pub const DEFAULT_TERMINATE_GRACE_MS: u64 = 2_000;

/// Bytes of stderr kept per external process for error reports.
pub const STDERR_TAIL_BYTES: usize = 4 * 1024;

/// Upper bound on geometry accepted from a probe (16K UHD).
pub const MAX_FRAME_DIMENSION: u32 = 16_384;

pub mod topics {
    pub const ENCODE_REQUEST: &str = "stego.request.encode";
    pub const DECODE_REQUEST: &str = "stego.request.decode";
    pub const JOB_COMPLETION: &str = "stego.job.completion";
}

pub mod status_messages {
    pub const EMBEDDING: &str = "Embedding payload into carrier.";
    pub const EXTRACTING: &str = "Extracting payload from carrier.";
    pub const COMPLETED: &str = "Job completed successfully.";
    pub const FAILED: &str = "Job failed.";
}
