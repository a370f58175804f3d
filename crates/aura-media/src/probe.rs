//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Container and stream facts needed to drive a transformation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Frame count promised by the container
    pub frame_count: u64,
    /// Duration in seconds
    pub duration: f64,
    /// Whether the container carries at least one audio stream
    pub has_audio: bool,
    /// Video codec
    pub codec: String,
}

impl VideoInfo {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Reject containers the pipeline cannot produce a full output for.
    pub fn validate(&self) -> MediaResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MediaError::InvalidVideo(format!(
                "invalid dimensions {}x{}",
                self.width, self.height
            )));
        }
        if self.frame_count == 0 {
            return Err(MediaError::InvalidVideo("video has no frames".to_string()));
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(MediaError::InvalidVideo(format!("invalid frame rate {}", self.fps)));
        }
        Ok(())
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

impl FfprobeStream {
    /// Display rotation in degrees, normalized to `0..360`.
    fn rotation(&self) -> i64 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| self.tags.get("rotate").and_then(|r| r.parse::<f64>().ok()))
            .unwrap_or(0.0);
        (degrees.round() as i64).rem_euclid(360)
    }
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(json: &[u8]) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let duration = video_stream
        .duration
        .as_ref()
        .or(probe.format.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .and_then(|r| parse_frame_rate(r))
        .or_else(|| video_stream.r_frame_rate.as_ref().and_then(|r| parse_frame_rate(r)))
        .unwrap_or(30.0);

    // Some containers (e.g. MKV, WebM) leave nb_frames out; estimate from duration.
    let frame_count = video_stream
        .nb_frames
        .as_ref()
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or_else(|| (duration * fps).round().max(0.0) as u64);

    // ffmpeg autorotates on decode, so frames arrive in display orientation.
    let (coded_w, coded_h) = (video_stream.width.unwrap_or(0), video_stream.height.unwrap_or(0));
    let (width, height) = match video_stream.rotation() {
        90 | 270 => (coded_h, coded_w),
        _ => (coded_w, coded_h),
    };

    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count,
        duration,
        has_audio,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok().filter(|v: &f64| *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_probe_with_audio() {
        let json = br#"{
            "format": {"duration": "4.000000"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "r_frame_rate": "25/1", "avg_frame_rate": "25/1", "nb_frames": "100"},
                {"codec_type": "audio", "codec_name": "aac"}
            ]
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.dimensions(), (1920, 1080));
        assert_eq!(info.frame_count, 100);
        assert!(info.has_audio);
        assert!((info.fps - 25.0).abs() < 0.01);
        assert!(info.validate().is_ok());
    }

    #[test]
    fn test_frame_count_estimated_without_nb_frames() {
        let json = br#"{
            "format": {"duration": "2.0"},
            "streams": [
                {"codec_type": "video", "width": 640, "height": 360, "avg_frame_rate": "30/1"}
            ]
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.frame_count, 60);
        assert!(!info.has_audio);
    }

    #[test]
    fn test_rotated_stream_reports_display_dimensions() {
        let side_data = br#"{
            "format": {"duration": "1.0"},
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "30/1",
                 "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]}
            ]
        }"#;
        assert_eq!(parse_probe_output(side_data).unwrap().dimensions(), (1080, 1920));

        let tagged = br#"{
            "format": {"duration": "1.0"},
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "30/1",
                 "tags": {"rotate": "90"}}
            ]
        }"#;
        assert_eq!(parse_probe_output(tagged).unwrap().dimensions(), (1080, 1920));

        let upside_down = br#"{
            "format": {"duration": "1.0"},
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "30/1",
                 "tags": {"rotate": "180"}}
            ]
        }"#;
        assert_eq!(parse_probe_output(upside_down).unwrap().dimensions(), (1920, 1080));
    }

    #[test]
    fn test_audio_only_file_rejected() {
        let json = br#"{"format": {}, "streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(MediaError::InvalidVideo(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_video() {
        let info = VideoInfo {
            width: 640,
            height: 360,
            fps: 30.0,
            frame_count: 0,
            duration: 0.0,
            has_audio: false,
            codec: String::new(),
        };
        assert!(info.validate().is_err());
    }
}
