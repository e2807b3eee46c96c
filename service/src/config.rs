use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use stego_core::codec::{FrameGeometry, FrameRate};
use stego_core::config::PipelineConfig;
use stego_core::ports::{InMemoryKeyStore, KeyMaterial};
use stego_core::types::ParticipantRef;

use crate::error::ServiceError;

/// Which frame codec the worker drives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CodecSelection {
    #[default]
    Ffmpeg,
    /// Carriers are already raw RGBA frames of this geometry.
    Raw(FrameGeometry),
}

impl CodecSelection {
    /// `ffmpeg` or `raw:WIDTHxHEIGHT@RATE` (e.g. `raw:640x480@30000/1001`).
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        let bad = || ServiceError::Config(format!("unrecognised codec `{value}`"));
        let value = value.trim();
        if value.eq_ignore_ascii_case("ffmpeg") {
            return Ok(CodecSelection::Ffmpeg);
        }
        let spec = value.strip_prefix("raw:").ok_or_else(bad)?;
        let (size, rate) = spec.split_once('@').ok_or_else(bad)?;
        let (w, h) = size.split_once('x').ok_or_else(bad)?;
        let rate: FrameRate = rate.parse().map_err(|_| bad())?;
        let geometry = FrameGeometry::new(w.parse().map_err(|_| bad())?, h.parse().map_err(|_| bad())?, rate)
            .map_err(|e| ServiceError::Config(e.to_string()))?;
        Ok(CodecSelection::Raw(geometry))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    pub pipeline: PipelineConfig,
    /// Directory backing the filesystem blob store.
    pub blob_root: PathBuf,
    /// JSON object mapping participant to base64 key.
    pub key_file: Option<PathBuf>,
    pub codec: CodecSelection,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            blob_root: PathBuf::from("stego-blobs"),
            key_file: None,
            codec: CodecSelection::default(),
        }
    }
}

impl ServiceConfig {
    /// Defaults, then the JSON file if given, then `STEGO_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ServiceError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ServiceError> {
        let buf = fs::read(path)?;
        Ok(serde_json::from_slice(&buf)?)
    }

    /// Overrides from the environment. `lookup` is `std::env::var` outside tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ServiceError> {
        let number = |name: &str, raw: String| {
            raw.trim().parse::<u64>().map_err(|_| ServiceError::Config(format!("{name} is not a number: `{raw}`")))
        };

        if let Some(v) = lookup("STEGO_FFMPEG") {
            self.pipeline.ffmpeg_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("STEGO_FFPROBE") {
            self.pipeline.ffprobe_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("STEGO_BLOB_ROOT") {
            self.blob_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("STEGO_KEY_FILE") {
            self.key_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("STEGO_CODEC") {
            self.codec = CodecSelection::parse(&v)?;
        }
        if let Some(v) = lookup("STEGO_JOB_TIMEOUT_MS") {
            self.pipeline.job_timeout_ms = number("STEGO_JOB_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("STEGO_MAX_CONCURRENT") {
            self.pipeline.max_concurrent_pipelines = number("STEGO_MAX_CONCURRENT", v)? as usize;
        }
        if let Some(v) = lookup("STEGO_MAX_PAYLOAD_BYTES") {
            self.pipeline.max_payload_bytes = number("STEGO_MAX_PAYLOAD_BYTES", v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        self.pipeline.validate().map_err(|e| ServiceError::Config(e.to_string()))?;
        if let CodecSelection::Raw(geometry) = &self.codec {
            geometry.validate().map_err(|e| ServiceError::Config(e.to_string()))?;
        }
        Ok(())
    }

    /// Key directory from `key_file`; empty when none is configured.
    pub fn load_keys(&self) -> Result<InMemoryKeyStore, ServiceError> {
        let store = InMemoryKeyStore::new();
        let Some(path) = &self.key_file else {
            return Ok(store);
        };
        let buf = fs::read(path)?;
        let entries: HashMap<ParticipantRef, KeyMaterial> = serde_json::from_slice(&buf)?;
        for (participant, key) in entries {
            store.register(participant, key.decode()?)?;
        }
        Ok(store)
    }
}
