use std::path::{Path, PathBuf};

use crate::error::{StillcastError, StillcastResult};

/// All audio is mixed at this rate, stereo interleaved f32.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

#[derive(Clone, Debug)]
pub struct MediaInfo {
    pub source_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub duration_sec: f64,
    pub has_video: bool,
    pub has_audio: bool,
}

impl MediaInfo {
    pub fn source_fps(&self) -> f64 {
        if self.fps_den == 0 {
            0.0
        } else {
            f64::from(self.fps_num) / f64::from(self.fps_den)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AudioPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    /// Frame count per channel.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.interleaved_f32.len() / usize::from(self.channels)
        }
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn probe_media(source_path: &Path) -> StillcastResult<MediaInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| StillcastError::media(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(StillcastError::media(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| StillcastError::media(format!("ffprobe json parse failed: {e}")))?;

    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let (width, height, fps_num, fps_den) = match video_stream {
        Some(s) => {
            let width = s
                .width
                .ok_or_else(|| StillcastError::media("missing video width from ffprobe"))?;
            let height = s
                .height
                .ok_or_else(|| StillcastError::media("missing video height from ffprobe"))?;
            let (num, den) = parse_ff_ratio(s.r_frame_rate.as_deref().unwrap_or("0/1"))
                .ok_or_else(|| StillcastError::media("invalid video r_frame_rate"))?;
            (width, height, num, den)
        }
        None => (0, 0, 0, 1),
    };

    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(MediaInfo {
        source_path: source_path.to_path_buf(),
        width,
        height,
        fps_num,
        fps_den,
        duration_sec,
        has_video: video_stream.is_some(),
        has_audio,
    })
}

/// Probe an audio track and return its duration. Tracks with no audio stream
/// or a non-positive container duration are rejected.
pub fn probe_audio_duration(path: &Path) -> StillcastResult<f64> {
    let info = probe_media(path)?;
    if !info.has_audio {
        return Err(StillcastError::media(format!(
            "'{}' contains no audio stream",
            path.display()
        )));
    }
    if !(info.duration_sec.is_finite() && info.duration_sec > 0.0) {
        return Err(StillcastError::media(format!(
            "'{}' has no usable duration (got {})",
            path.display(),
            info.duration_sec
        )));
    }
    Ok(info.duration_sec)
}

/// Decode a batch of frames starting at `start_time_sec`, optionally scaled by
/// ffmpeg to `scale_to` (width, height). Fewer frames than requested may come
/// back near the end of the source.
pub fn decode_video_frames_rgba8(
    source: &MediaInfo,
    start_time_sec: f64,
    frame_count: u32,
    scale_to: Option<(u32, u32)>,
) -> StillcastResult<Vec<Vec<u8>>> {
    if frame_count == 0 {
        return Ok(Vec::new());
    }

    let (out_w, out_h) = scale_to.unwrap_or((source.width, source.height));
    if out_w == 0 || out_h == 0 {
        return Err(StillcastError::media(
            "decoded video frame size is zero (invalid dimensions)",
        ));
    }

    let mut cmd = std::process::Command::new("ffmpeg");
    cmd.args(["-v", "error", "-ss", &format!("{start_time_sec:.9}")])
        .arg("-i")
        .arg(&source.source_path)
        .args(["-frames:v", &frame_count.to_string()]);
    if scale_to.is_some() {
        cmd.args(["-vf", &format!("scale={out_w}:{out_h}")]);
    }
    cmd.args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"]);

    let out = cmd
        .output()
        .map_err(|e| StillcastError::media(format!("failed to run ffmpeg for video decode: {e}")))?;
    if !out.status.success() {
        return Err(StillcastError::media(format!(
            "ffmpeg video decode failed for '{}': {}",
            source.source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let frame_len = out_w as usize * out_h as usize * 4;
    if out.stdout.len() < frame_len || !out.stdout.len().is_multiple_of(frame_len) {
        return Err(StillcastError::media(format!(
            "decoded video batch has invalid size: got {} bytes, expected multiples of {frame_len}",
            out.stdout.len()
        )));
    }

    let available = (out.stdout.len() / frame_len).min(frame_count as usize);
    let mut frames = Vec::with_capacity(available);
    for idx in 0..available {
        let off = idx * frame_len;
        frames.push(out.stdout[off..off + frame_len].to_vec());
    }
    Ok(frames)
}

/// Decode a whole audio file to interleaved stereo f32 at `sample_rate`.
pub fn decode_audio_f32_stereo(path: &Path, sample_rate: u32) -> StillcastResult<AudioPcm> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| StillcastError::media(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        return Err(StillcastError::media(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(StillcastError::media(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let mut pcm = Vec::<f32>::with_capacity(out.stdout.len() / 4);
    for chunk in out.stdout.chunks_exact(4) {
        pcm.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: pcm,
    })
}

fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.parse::<u32>().ok()?;
    let b = parts.next()?.parse::<u32>().ok()?;
    if b == 0 {
        return None;
    }
    Some((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ff_ratio_parses_and_rejects_zero_den() {
        assert_eq!(parse_ff_ratio("30000/1001"), Some((30000, 1001)));
        assert_eq!(parse_ff_ratio("25/1"), Some((25, 1)));
        assert_eq!(parse_ff_ratio("25/0"), None);
        assert_eq!(parse_ff_ratio("nonsense"), None);
    }

    #[test]
    fn audio_pcm_frames_counts_per_channel() {
        let pcm = AudioPcm {
            sample_rate: 48_000,
            channels: 2,
            interleaved_f32: vec![0.0; 10],
        };
        assert_eq!(pcm.frames(), 5);
    }

    #[test]
    fn source_fps_handles_zero_den() {
        let info = MediaInfo {
            source_path: PathBuf::from("x.mp4"),
            width: 16,
            height: 16,
            fps_num: 30,
            fps_den: 0,
            duration_sec: 1.0,
            has_video: true,
            has_audio: false,
        };
        assert_eq!(info.source_fps(), 0.0);
    }

    #[test]
    fn zero_frame_request_decodes_nothing() {
        let info = MediaInfo {
            source_path: PathBuf::from("missing.mp4"),
            width: 16,
            height: 16,
            fps_num: 25,
            fps_den: 1,
            duration_sec: 1.0,
            has_video: true,
            has_audio: false,
        };
        assert!(
            decode_video_frames_rgba8(&info, 0.0, 0, None)
                .unwrap()
                .is_empty()
        );
    }
}
