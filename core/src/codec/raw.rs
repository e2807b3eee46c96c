use std::io::{self, Read};
use std::process::Command;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::codec::error::CodecError;
use crate::codec::geometry::{FrameGeometry, VideoProbe};
use crate::codec::process::StageRole;
use crate::codec::FrameCodec;

/// Program plus arguments for a stage that runs something other than ffmpeg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `sh -c <script>`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    /// Byte-for-byte pass-through.
    pub fn cat() -> Self {
        Self::new("cat")
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

/// Codec for carriers that already are raw RGBA frames of a known geometry.
///
/// Decoder and encoder default to `cat`, so the carrier bytes are the frame
/// bytes on both sides. The pipeline still runs real child processes,
/// which makes this the codec of choice for exercising the process plumbing
/// on hosts without ffmpeg.
#[derive(Debug, Clone)]
pub struct RawCodec {
    geometry: FrameGeometry,
    decoder: CommandSpec,
    encoder: CommandSpec,
}

impl RawCodec {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self { geometry, decoder: CommandSpec::cat(), encoder: CommandSpec::cat() }
    }

    pub fn with_decoder(mut self, decoder: CommandSpec) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_encoder(mut self, encoder: CommandSpec) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }
}

impl FrameCodec for RawCodec {
    fn name(&self) -> &str {
        "raw"
    }

    /// Counts whole frames; a trailing partial frame counts as one more.
    fn probe(&self, carrier: &mut (dyn Read + Send), deadline: Instant) -> Result<VideoProbe, CodecError> {
        let total = io::copy(carrier, &mut io::sink())?;
        if Instant::now() > deadline {
            return Err(CodecError::DeadlineExceeded { role: StageRole::Probe });
        }
        let frame = self.geometry.frame_bytes() as u64;
        let frames = total.div_ceil(frame);
        Ok(VideoProbe { geometry: self.geometry, frame_count: frames, total_raw_bytes: total })
    }

    fn decoder_command(&self) -> Command {
        self.decoder.to_command()
    }

    fn encoder_command(&self, _geometry: &FrameGeometry) -> Command {
        self.encoder.to_command()
    }
}
