//! External codec boundary.
//!
//! A `FrameCodec` knows how to probe a carrier and which commands turn a
//! carrier into raw RGBA frames (decoder) and raw frames back into a
//! carrier (encoder). The pipeline owns the processes; the codec only
//! describes them.

pub mod error;
pub mod ffmpeg;
pub mod geometry;
pub mod probe;
pub mod process;
pub mod raw;

use std::io::Read;
use std::process::Command;
use std::time::Instant;

pub use error::CodecError;
pub use ffmpeg::FfmpegCodec;
pub use geometry::{FrameGeometry, FrameRate, VideoProbe};
pub use probe::parse_probe_output;
pub use process::{check_exit, read_stderr_tail, ExitReport, ProcessGroup, StageProcess, StageRole};
pub use raw::{CommandSpec, RawCodec};

pub trait FrameCodec: Send + Sync {
    fn name(&self) -> &str;

    /// Full pass over the carrier: geometry, exact rate and frame count.
    /// Gives up with `DeadlineExceeded` once `deadline` passes.
    fn probe(&self, carrier: &mut (dyn Read + Send), deadline: Instant) -> Result<VideoProbe, CodecError>;

    /// Carrier on stdin, raw RGBA frames on stdout.
    fn decoder_command(&self) -> Command;

    /// Raw RGBA frames of `geometry` on stdin, carrier on stdout.
    fn encoder_command(&self, geometry: &FrameGeometry) -> Command;
}
