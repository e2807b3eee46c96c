use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::error::CodecError;
use crate::constants::{BYTES_PER_PIXEL, MAX_FRAME_DIMENSION};

/// Exact rational frame rate as reported by the probe (`30000/1001`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Result<Self, CodecError> {
        if num == 0 || den == 0 {
            return Err(CodecError::InvalidGeometry(format!("frame rate {num}/{den}")));
        }
        Ok(Self { num, den })
    }

    pub fn per_second(fps: u32) -> Result<Self, CodecError> {
        Self::new(fps, 1)
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Accepts `num/den` or a bare integer.
impl FromStr for FrameRate {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || CodecError::InvalidGeometry(format!("unparseable frame rate `{s}`"));
        match s.trim().split_once('/') {
            Some((n, d)) => {
                let num = n.trim().parse().map_err(|_| bad())?;
                let den = d.trim().parse().map_err(|_| bad())?;
                Self::new(num, den)
            }
            None => Self::per_second(s.trim().parse().map_err(|_| bad())?),
        }
    }
}

impl Serialize for FrameRate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FrameRate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32, frame_rate: FrameRate) -> Result<Self, CodecError> {
        let g = Self { width, height, frame_rate };
        g.validate()?;
        Ok(g)
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        if self.width == 0 || self.height == 0 {
            return Err(CodecError::InvalidGeometry(format!("{}x{}", self.width, self.height)));
        }
        if self.width > MAX_FRAME_DIMENSION || self.height > MAX_FRAME_DIMENSION {
            return Err(CodecError::InvalidGeometry(format!(
                "{}x{} exceeds {MAX_FRAME_DIMENSION} per side",
                self.width, self.height
            )));
        }
        if self.frame_rate.num == 0 || self.frame_rate.den == 0 {
            return Err(CodecError::InvalidGeometry(format!("frame rate {}", self.frame_rate)));
        }
        Ok(())
    }

    /// `width * height * bytes_per_pixel`.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// `-s` argument for the encoder.
    pub fn size_arg(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Result of a full pass over a carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProbe {
    pub geometry: FrameGeometry,
    pub frame_count: u64,
    pub total_raw_bytes: u64,
}

impl VideoProbe {
    pub fn from_frames(geometry: FrameGeometry, frame_count: u64) -> Self {
        Self {
            geometry,
            frame_count,
            total_raw_bytes: frame_count.saturating_mul(geometry.frame_bytes() as u64),
        }
    }
}
