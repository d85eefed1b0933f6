use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::{
    error::{StillcastError, StillcastResult},
    frame::FrameRgba,
    media,
};

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub out_path: PathBuf,
    /// Existing destinations are an error unless this is set.
    pub overwrite: bool,
    /// Pass-through codec worker thread count (`-threads N`).
    pub threads: Option<u32>,
}

impl EncodeConfig {
    pub fn validate(&self) -> StillcastResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(StillcastError::validation(
                "encode width/height must be non-zero",
            ));
        }
        if self.fps == 0 {
            return Err(StillcastError::validation("encode fps must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // Default settings target yuv420p output for player compatibility.
            return Err(StillcastError::validation(
                "encode width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        Ok(())
    }
}

/// Audio source muxed alongside the piped video frames.
#[derive(Clone, Debug)]
pub enum AudioTrack {
    /// Silent output.
    None,
    /// A source audio file, looped by the muxer and trimmed to the video.
    LoopedFile { path: PathBuf },
    /// A raw interleaved f32le PCM file (playlist mixdown).
    RawPcm {
        path: PathBuf,
        sample_rate: u32,
        channels: u16,
    },
}

pub fn ensure_parent_dir(path: &Path) -> StillcastResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

pub(crate) fn build_ffmpeg_args(cfg: &EncodeConfig, audio: &AudioTrack) -> Vec<OsString> {
    fn strs(args: &mut Vec<OsString>, items: &[&str]) {
        args.extend(items.iter().map(|s| OsString::from(*s)));
    }

    let mut args: Vec<OsString> = Vec::new();
    strs(&mut args, &[
        if cfg.overwrite { "-y" } else { "-n" },
        "-loglevel",
        "error",
        // Input 0: raw video on stdin.
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
        &format!("{}x{}", cfg.width, cfg.height),
        "-r",
        &cfg.fps.to_string(),
        "-i",
        "pipe:0",
    ]);

    // Input 1: audio, if any.
    match audio {
        AudioTrack::None => {}
        AudioTrack::LoopedFile { path } => {
            strs(&mut args, &["-stream_loop", "-1", "-i"]);
            args.push(path.clone().into_os_string());
        }
        AudioTrack::RawPcm {
            path,
            sample_rate,
            channels,
        } => {
            strs(&mut args, &[
                "-f",
                "f32le",
                "-ar",
                &sample_rate.to_string(),
                "-ac",
                &channels.to_string(),
                "-i",
            ]);
            args.push(path.clone().into_os_string());
        }
    }

    strs(&mut args, &["-map", "0:v"]);
    if matches!(audio, AudioTrack::None) {
        strs(&mut args, &["-an"]);
    } else {
        strs(&mut args, &[
            "-map", "1:a", "-c:a", "aac", "-b:a", "192k", "-shortest",
        ]);
    }

    strs(&mut args, &[
        "-c:v",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        "-movflags",
        "+faststart",
    ]);

    if let Some(threads) = cfg.threads {
        strs(&mut args, &["-threads", &threads.to_string()]);
    }

    args.push(cfg.out_path.clone().into_os_string());
    args
}

/// Streams RGBA frames into a long-lived ffmpeg process and muxes the audio
/// track in the same invocation.
pub struct FfmpegEncoder {
    cfg: EncodeConfig,
    child: Child,
    stdin: Option<ChildStdin>,
    scratch: Vec<u8>,
}

impl FfmpegEncoder {
    pub fn new(cfg: EncodeConfig, audio: AudioTrack) -> StillcastResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;

        if !cfg.overwrite && cfg.out_path.exists() {
            return Err(StillcastError::encode(format!(
                "output file '{}' already exists (pass --overwrite to replace it)",
                cfg.out_path.display()
            )));
        }

        if !media::is_ffmpeg_on_path() {
            return Err(StillcastError::encode(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let args = build_ffmpeg_args(&cfg, &audio);
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                StillcastError::encode(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| StillcastError::encode("failed to open ffmpeg stdin (unexpected)"))?;

        Ok(Self {
            scratch: vec![0u8; (cfg.width * cfg.height * 4) as usize],
            cfg,
            child,
            stdin: Some(stdin),
        })
    }

    pub fn encode_frame(&mut self, frame: &FrameRgba) -> StillcastResult<()> {
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(StillcastError::encode(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.cfg.width, self.cfg.height
            )));
        }
        if frame.data.len() != self.scratch.len() {
            return Err(StillcastError::encode(
                "frame.data size mismatch with width*height*4",
            ));
        }

        // The render pipeline composites onto opaque bases, so the stream is
        // opaque by construction; force alpha anyway so x264 input is stable.
        self.scratch.copy_from_slice(&frame.data);
        for px in self.scratch.chunks_exact_mut(4) {
            px[3] = 255;
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(StillcastError::encode("ffmpeg encoder is already finalized"));
        };

        use std::io::Write as _;
        stdin.write_all(&self.scratch).map_err(|e| {
            StillcastError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;

        Ok(())
    }

    pub fn finish(mut self) -> StillcastResult<()> {
        drop(self.stdin.take());

        let output = self.child.wait_with_output().map_err(|e| {
            StillcastError::encode(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StillcastError::encode(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(overwrite: bool) -> EncodeConfig {
        EncodeConfig {
            width: 1920,
            height: 1080,
            fps: 25,
            out_path: PathBuf::from("renders/out.mp4"),
            overwrite,
            threads: Some(8),
        }
    }

    #[test]
    fn config_validation_catches_bad_values() {
        let mut c = cfg(true);
        c.width = 0;
        assert!(c.validate().is_err());

        let mut c = cfg(true);
        c.height = 11;
        assert!(c.validate().is_err());

        let mut c = cfg(true);
        c.fps = 0;
        assert!(c.validate().is_err());

        assert!(cfg(true).validate().is_ok());
    }

    fn args_as_strings(cfg: &EncodeConfig, audio: &AudioTrack) -> Vec<String> {
        build_ffmpeg_args(cfg, audio)
            .into_iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn no_overwrite_maps_to_ffmpeg_n_flag() {
        let args = args_as_strings(&cfg(false), &AudioTrack::None);
        assert_eq!(args[0], "-n");
        let args = args_as_strings(&cfg(true), &AudioTrack::None);
        assert_eq!(args[0], "-y");
    }

    #[test]
    fn silent_output_disables_audio() {
        let args = args_as_strings(&cfg(true), &AudioTrack::None);
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"aac".to_string()));
    }

    #[test]
    fn looped_file_audio_uses_stream_loop_and_shortest() {
        let audio = AudioTrack::LoopedFile {
            path: PathBuf::from("music/track.mp3"),
        };
        let args = args_as_strings(&cfg(true), &audio);
        let loop_pos = args.iter().position(|a| a == "-stream_loop").unwrap();
        assert_eq!(args[loop_pos + 1], "-1");
        assert!(args.contains(&"-shortest".to_string()));
        assert!(args.contains(&"music/track.mp3".to_string()));
    }

    #[test]
    fn raw_pcm_audio_declares_format_and_rate() {
        let audio = AudioTrack::RawPcm {
            path: PathBuf::from("mix.f32le"),
            sample_rate: 48_000,
            channels: 2,
        };
        let args = args_as_strings(&cfg(true), &audio);
        let f32le = args.iter().position(|a| a == "f32le").unwrap();
        assert_eq!(args[f32le - 1], "-f");
        assert!(args.contains(&"48000".to_string()));
        assert!(args.contains(&"aac".to_string()));
    }

    #[test]
    fn threads_are_passed_through_when_set() {
        let args = args_as_strings(&cfg(true), &AudioTrack::None);
        let pos = args.iter().position(|a| a == "-threads").unwrap();
        assert_eq!(args[pos + 1], "8");

        let mut c = cfg(true);
        c.threads = None;
        let args = args_as_strings(&c, &AudioTrack::None);
        assert!(!args.contains(&"-threads".to_string()));
    }

    #[test]
    fn existing_destination_is_refused_without_overwrite() {
        let dir = PathBuf::from("target").join("encode_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let out = dir.join("existing.mp4");
        std::fs::write(&out, b"already rendered").unwrap();

        let mut c = cfg(false);
        c.out_path = out.clone();
        let err = FfmpegEncoder::new(c, AudioTrack::None)
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("already exists"), "{err}");
        assert_eq!(std::fs::read(&out).unwrap(), b"already rendered");
    }

    #[test]
    fn output_path_is_the_final_argument() {
        let args = args_as_strings(&cfg(true), &AudioTrack::None);
        assert_eq!(args.last().unwrap(), "renders/out.mp4");
    }
}
