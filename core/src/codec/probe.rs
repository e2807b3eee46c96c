//! Probe output parsing.
//!
//! Only the handful of stream fields we need are modelled; anything else
//! ffprobe prints is ignored. Numbers that ffprobe emits as strings
//! (`nb_read_frames`, `duration`) stay strings here and are parsed explicitly.

use serde::Deserialize;

use crate::codec::error::CodecError;
use crate::codec::geometry::{FrameGeometry, FrameRate, VideoProbe};

#[derive(Debug, Deserialize)]
struct ProbeDocument {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    /// Present with `-count_frames`.
    nb_read_frames: Option<String>,
    /// Container-declared count, often missing on pipes.
    nb_frames: Option<String>,
    duration: Option<String>,
}

impl ProbeStream {
    fn is_video(&self) -> bool {
        match self.codec_type.as_deref() {
            Some(kind) => kind == "video",
            None => self.width.is_some() && self.height.is_some(),
        }
    }

    fn frame_rate(&self) -> Result<FrameRate, CodecError> {
        [self.avg_frame_rate.as_deref(), self.r_frame_rate.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|raw| raw.parse::<FrameRate>().ok())
            .ok_or_else(|| CodecError::Probe("no usable frame rate".into()))
    }

    fn frame_count(&self, rate: FrameRate) -> Result<u64, CodecError> {
        let counted = [self.nb_read_frames.as_deref(), self.nb_frames.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|raw| raw.trim().parse::<u64>().ok())
            .filter(|n| *n > 0);
        if let Some(n) = counted {
            return Ok(n);
        }

        // Last resort: duration * rate.
        let secs = self
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .ok_or_else(|| CodecError::Probe("frame count unavailable".into()))?;
        Ok((secs * rate.as_f64()).round() as u64)
    }
}

/// Parse `ffprobe -print_format json -show_streams` output into a probe.
/// The first video stream wins.
pub fn parse_probe_output(json: &[u8]) -> Result<VideoProbe, CodecError> {
    let doc: ProbeDocument =
        serde_json::from_slice(json).map_err(|e| CodecError::Probe(format!("invalid JSON: {e}")))?;

    let stream = doc
        .streams
        .iter()
        .find(|s| s.is_video())
        .ok_or_else(|| CodecError::Probe("no video stream".into()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) => (w, h),
        _ => return Err(CodecError::Probe("video stream without dimensions".into())),
    };
    let rate = stream.frame_rate()?;
    let geometry = FrameGeometry::new(width, height, rate)?;
    let frames = stream.frame_count(rate)?;

    Ok(VideoProbe::from_frames(geometry, frames))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_video_stream_and_counted_frames() {
        let json = br#"{"streams":[
            {"codec_type":"audio","sample_rate":"48000"},
            {"codec_type":"video","width":640,"height":480,
             "avg_frame_rate":"30000/1001","r_frame_rate":"30000/1001",
             "nb_read_frames":"300","nb_frames":"299"}]}"#;
        let probe = parse_probe_output(json).unwrap();
        assert_eq!(probe.geometry.width, 640);
        assert_eq!(probe.geometry.frame_rate, FrameRate { num: 30000, den: 1001 });
        assert_eq!(probe.frame_count, 300);
        assert_eq!(probe.total_raw_bytes, 300 * 640 * 480 * 4);
    }

    #[test]
    fn falls_back_to_r_frame_rate_and_duration() {
        let json = br#"{"streams":[{"codec_type":"video","width":2,"height":2,
            "avg_frame_rate":"0/0","r_frame_rate":"25/1","duration":"2.000000"}]}"#;
        let probe = parse_probe_output(json).unwrap();
        assert_eq!(probe.geometry.frame_rate, FrameRate { num: 25, den: 1 });
        assert_eq!(probe.frame_count, 50);
    }

    #[test]
    fn rejects_missing_video() {
        assert!(matches!(parse_probe_output(br#"{"streams":[]}"#), Err(CodecError::Probe(_))));
        assert!(matches!(parse_probe_output(b"not json"), Err(CodecError::Probe(_))));
    }
}
