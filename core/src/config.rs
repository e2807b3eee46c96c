use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_FRAME_QUEUE_DEPTH, DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_PIPE_CHUNK_SIZE,
    DEFAULT_TERMINATE_GRACE_MS, MAX_PIPE_CHUNK_SIZE, MIN_PIPE_CHUNK_SIZE,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Output side of the encoder. The LSB plane only survives a lossless
/// codec whose pixel format keeps every channel at full resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EncoderProfile {
    pub video_codec: String,
    pub pixel_format: String,
    pub container: String,
}

impl Default for EncoderProfile {
    fn default() -> Self {
        Self {
            video_codec: "ffv1".into(),
            pixel_format: "bgra".into(),
            container: "matroska".into(),
        }
    }
}

impl EncoderProfile {
    /// Profile used by the earlier service generation (lossy, for playback only).
    pub fn h264_mp4() -> Self {
        Self {
            video_codec: "libx264".into(),
            pixel_format: "yuv420p".into(),
            container: "mp4".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Decoder/encoder executable.
    pub ffmpeg_path: PathBuf,
    /// Probe executable.
    pub ffprobe_path: PathBuf,
    pub encoder: EncoderProfile,

    /// Read/write granularity for pipe pumps.
    pub pipe_chunk_size: usize,
    /// Bounded queue between the frame reader and the embedder.
    pub frame_queue_depth: usize,

    /// Wall-clock bound for one pipeline invocation.
    pub job_timeout_ms: u64,
    /// Bound on reaping once all stages have unwound.
    pub terminate_grace_ms: u64,

    /// Jobs allowed to run a pipeline at the same time.
    pub max_concurrent_pipelines: usize,

    /// Extraction fails once this many bytes were rebuilt without a
    /// terminator. Bounds decode memory on non-stego carriers.
    pub max_payload_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            encoder: EncoderProfile::default(),
            pipe_chunk_size: DEFAULT_PIPE_CHUNK_SIZE,
            frame_queue_depth: DEFAULT_FRAME_QUEUE_DEPTH,
            job_timeout_ms: DEFAULT_JOB_TIMEOUT_SECS * 1_000,
            terminate_grace_ms: DEFAULT_TERMINATE_GRACE_MS,
            max_concurrent_pipelines: num_cpus::get().max(1),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl PipelineConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_concurrent_pipelines(mut self, n: usize) -> Self {
        self.max_concurrent_pipelines = n;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_PIPE_CHUNK_SIZE..=MAX_PIPE_CHUNK_SIZE).contains(&self.pipe_chunk_size) {
            return Err(ConfigError::Invalid(format!(
                "pipe_chunk_size {} outside {}..={}",
                self.pipe_chunk_size, MIN_PIPE_CHUNK_SIZE, MAX_PIPE_CHUNK_SIZE
            )));
        }
        if self.frame_queue_depth == 0 {
            return Err(ConfigError::Invalid("frame_queue_depth must be at least 1".into()));
        }
        if self.job_timeout_ms == 0 {
            return Err(ConfigError::Invalid("job_timeout_ms must be non-zero".into()));
        }
        if self.max_concurrent_pipelines == 0 {
            return Err(ConfigError::Invalid("max_concurrent_pipelines must be at least 1".into()));
        }
        if self.encoder.video_codec.is_empty() || self.encoder.container.is_empty() {
            return Err(ConfigError::Invalid("encoder profile needs a codec and a container".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_queue_depth_rejected() {
        let cfg = PipelineConfig { frame_queue_depth: 0, ..PipelineConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"jobTimeoutMs": 500}"#).unwrap();
        assert_eq!(cfg.job_timeout(), Duration::from_millis(500));
        assert_eq!(cfg.encoder, EncoderProfile::default());
        assert_eq!(cfg.max_payload_bytes, DEFAULT_MAX_PAYLOAD_BYTES);
    }

    #[test]
    fn oversized_timeout_saturates() {
        let cfg = PipelineConfig::default().with_job_timeout(Duration::MAX);
        assert_eq!(cfg.job_timeout_ms, u64::MAX);

        let cfg = PipelineConfig::default().with_job_timeout(Duration::from_millis(1_500));
        assert_eq!(cfg.job_timeout_ms, 1_500);
    }
}
