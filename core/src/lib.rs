//! stego-core
//!
//! Streaming LSB video steganography engine.
//! Decodes a carrier through an external codec, rewrites the least-significant
//! bit plane of the raw frames, and re-encodes, while tracking each request as a
//! job with a conditional state machine.
//!
//! No async runtime here: every pipeline runs on scoped threads joined by
//! bounded `crossbeam` channels and OS pipes.

#![forbid(unsafe_code)]

// Shared and top level
pub mod constants;
pub mod types;
pub mod config;
pub mod telemetry;

// Boundary contracts + local collaborators
pub mod ports;
pub mod contract;

// Codec pipeline
pub mod codec;
pub mod stego;
pub mod pipeline;

// Job lifecycle
pub mod jobs;

// -----------------------------------------------------------------------------
// Prelude (Rust users)
// -----------------------------------------------------------------------------
pub mod prelude {
    pub use crate::codec::{FfmpegCodec, FrameCodec, FrameGeometry, FrameRate, RawCodec, VideoProbe};
    pub use crate::config::{EncoderProfile, PipelineConfig};
    pub use crate::contract::{DecodeRequest, EncodeRequest, JobCompletion, JobRequest};
    pub use crate::jobs::{Job, JobExecutor, JobRunner, JobService, JobStateMachine, JobStatus, JobType};
    pub use crate::pipeline::{estimate_capacity, run_decode_pipeline, run_encode_pipeline, InputSource};
    pub use crate::stego::CapacityEstimate;
    pub use crate::types::{BlobHandle, JobId, ParticipantRef};
}
