use std::io::{self, Read};
use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, RecvTimeoutError};
use log::{debug, warn};

use crate::codec::error::CodecError;
use crate::codec::geometry::{FrameGeometry, VideoProbe};
use crate::codec::probe::parse_probe_output;
use crate::codec::process::{check_exit, read_stderr_tail, ExitReport, StageProcess, StageRole};
use crate::codec::FrameCodec;
use crate::config::{EncoderProfile, PipelineConfig};
use crate::constants::RAW_PIXEL_FORMAT;

const PROBE_REAP_GRACE: Duration = Duration::from_secs(5);

/// ffmpeg/ffprobe backed codec. Every stage reads `pipe:0` and writes `pipe:1`.
#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    profile: EncoderProfile,
}

impl FfmpegCodec {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            profile: config.encoder.clone(),
        }
    }

    pub fn decoder_args() -> Vec<String> {
        ["-v", "error", "-i", "pipe:0", "-f", "rawvideo", "-pix_fmt", RAW_PIXEL_FORMAT, "pipe:1"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn encoder_args(&self, geometry: &FrameGeometry) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-v".into(), "error".into(),
            "-f".into(), "rawvideo".into(),
            "-pix_fmt".into(), RAW_PIXEL_FORMAT.into(),
            "-s".into(), geometry.size_arg(),
            "-r".into(), geometry.frame_rate.to_string(),
            "-i".into(), "pipe:0".into(),
            "-c:v".into(), self.profile.video_codec.clone(),
        ];
        if !self.profile.pixel_format.is_empty() {
            args.push("-pix_fmt".into());
            args.push(self.profile.pixel_format.clone());
        }
        if self.profile.container == "mp4" {
            // mp4 needs a fragmented layout to be written to a pipe.
            args.push("-movflags".into());
            args.push("frag_keyframe+empty_moov".into());
        }
        args.push("-f".into());
        args.push(self.profile.container.clone());
        args.push("pipe:1".into());
        args
    }

    pub fn probe_args() -> Vec<String> {
        [
            "-v", "error",
            "-print_format", "json",
            "-show_streams",
            "-count_frames",
            "-select_streams", "v:0",
            "-i", "pipe:0",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

impl FrameCodec for FfmpegCodec {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    /// Runs ffprobe over the whole carrier. Feeding and reading happen on
    /// separate threads so neither pipe can fill up and stall the other.
    /// A probe still running at `deadline` is killed.
    fn probe(&self, carrier: &mut (dyn Read + Send), deadline: Instant) -> Result<VideoProbe, CodecError> {
        let mut command = Command::new(&self.ffprobe);
        command.args(Self::probe_args());
        let mut process = StageProcess::spawn(StageRole::Probe, command)?;
        let mut stdin = process.take_stdin()?;
        let mut stdout = process.take_stdout()?;
        let stderr = process.take_stderr()?;

        let (fed, output, stderr_tail, timed_out) = thread::scope(|scope| {
            let feeder = scope.spawn(move || -> io::Result<u64> {
                let copied = io::copy(carrier, &mut stdin);
                drop(stdin);
                match copied {
                    // The probe may stop reading early; its exit status decides.
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(0),
                    other => other,
                }
            });
            let errs = scope.spawn(move || read_stderr_tail(stderr));

            let (json_tx, json_rx) = bounded::<io::Result<Vec<u8>>>(1);
            scope.spawn(move || {
                let mut json = Vec::new();
                let _ = json_tx.send(stdout.read_to_end(&mut json).map(|_| json));
            });

            let (output, timed_out) = match json_rx.recv_deadline(deadline) {
                Ok(output) => (output, false),
                Err(RecvTimeoutError::Timeout) => {
                    warn!("[PROBE] pid={} still running at the job deadline, killing", process.id());
                    // Killing closes its pipes, which unblocks the three threads.
                    process.terminate();
                    (Err(io::ErrorKind::TimedOut.into()), true)
                }
                Err(RecvTimeoutError::Disconnected) => (Err(io::Error::other("probe reader panicked")), false),
            };
            (feeder.join(), output, errs.join(), timed_out)
        });

        if timed_out {
            process.reap(Instant::now() + PROBE_REAP_GRACE)?;
            return Err(CodecError::DeadlineExceeded { role: StageRole::Probe });
        }

        let fed = fed.map_err(|_| CodecError::Probe("probe feeder panicked".into()))??;
        let stderr_tail = stderr_tail.unwrap_or_default();
        let status = process.reap(Instant::now() + PROBE_REAP_GRACE)?;
        check_exit(
            &ExitReport { role: StageRole::Probe, status, terminated: process.was_terminated() },
            &stderr_tail,
        )?;
        debug!("[PROBE] fed {} carrier bytes", fed);

        parse_probe_output(&output?)
    }

    fn decoder_command(&self) -> Command {
        let mut command = Command::new(&self.ffmpeg);
        command.args(Self::decoder_args());
        command
    }

    fn encoder_command(&self, geometry: &FrameGeometry) -> Command {
        let mut command = Command::new(&self.ffmpeg);
        command.args(self.encoder_args(geometry));
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::geometry::FrameRate;

    #[test]
    fn encoder_args_carry_exact_geometry() {
        let codec = FfmpegCodec::new(&PipelineConfig::default());
        let g = FrameGeometry::new(640, 480, FrameRate::new(30000, 1001).unwrap()).unwrap();
        let args = codec.encoder_args(&g).join(" ");
        assert!(args.contains("-s 640x480"));
        assert!(args.contains("-r 30000/1001"));
        assert!(args.contains("-c:v ffv1"));
        assert!(args.ends_with("-f matroska pipe:1"));
    }

    #[test]
    fn mp4_profile_is_fragmented() {
        let cfg = PipelineConfig { encoder: EncoderProfile::h264_mp4(), ..PipelineConfig::default() };
        let g = FrameGeometry::new(2, 2, FrameRate::per_second(30).unwrap()).unwrap();
        let args = FfmpegCodec::new(&cfg).encoder_args(&g).join(" ");
        assert!(args.contains("-movflags frag_keyframe+empty_moov"));
    }

    #[test]
    fn decoder_emits_rgba_on_stdout() {
        assert_eq!(
            FfmpegCodec::decoder_args().join(" "),
            "-v error -i pipe:0 -f rawvideo -pix_fmt rgba pipe:1"
        );
    }
}
