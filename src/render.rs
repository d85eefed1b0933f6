use std::path::{Path, PathBuf};

use crate::{
    audio, effect,
    encode::{AudioTrack, EncodeConfig, FfmpegEncoder},
    error::{StillcastError, StillcastResult},
    frame::{self, FrameRgba},
    manifest::{self, ManifestRow},
    media,
    resolution::Resolution,
    timeline::{FramePlan, PlaylistLayout},
};

#[derive(Clone, Debug)]
pub struct TrackJob {
    pub image: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    pub resolution: Resolution,
    pub fps: u32,
    /// Target length in seconds; the track loops to fill it. Defaults to the
    /// track's natural duration.
    pub duration_sec: Option<f64>,
    pub effect: Option<effect::EffectConfig>,
    pub overwrite: bool,
    pub threads: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct PlaylistJob {
    pub image_dir: PathBuf,
    pub music_dir: PathBuf,
    pub image_ext: String,
    pub music_ext: String,
    pub output: PathBuf,
    pub resolution: Resolution,
    pub fps: u32,
    pub fade_sec: f64,
    pub effect: Option<effect::EffectConfig>,
    pub overwrite: bool,
    pub threads: Option<u32>,
}

/// Render one still image with a looped music track under it.
#[tracing::instrument(skip_all, fields(out = %job.output.display()))]
pub fn render_track(job: &TrackJob) -> StillcastResult<()> {
    require_file(&job.image)?;
    require_file(&job.audio)?;

    let (width, height) = job.resolution.dimensions();
    let base = frame::load_cover_image(&job.image, width, height)?;

    let track_sec = media::probe_audio_duration(&job.audio)?;
    let target_sec = match job.duration_sec {
        Some(d) if d.is_finite() && d > 0.0 => d,
        Some(d) => {
            return Err(StillcastError::validation(format!(
                "target duration must be finite and > 0, got {d}"
            )));
        }
        None => track_sec,
    };
    let loops = audio::loops_to_cover(track_sec, target_sec)?;
    tracing::info!(
        resolution = %job.resolution,
        track_sec,
        target_sec,
        loops,
        "rendering track video"
    );

    let cfg = EncodeConfig {
        width,
        height,
        fps: job.fps,
        out_path: job.output.clone(),
        overwrite: job.overwrite,
        threads: job.threads,
    };
    let audio_track = AudioTrack::LoopedFile {
        path: job.audio.clone(),
    };
    let mut encoder = FfmpegEncoder::new(cfg, audio_track)?;

    let total_frames = (target_sec * f64::from(job.fps)).ceil().max(1.0) as u64;
    let mut fx = match &job.effect {
        Some(cfg) => Some(effect::EffectSource::open(cfg.clone(), width, height)?),
        None => None,
    };

    let mut scratch = base.clone();
    for idx in 0..total_frames {
        match fx.as_mut() {
            Some(fx) => {
                let t_sec = idx as f64 / f64::from(job.fps);
                scratch.data.copy_from_slice(&base.data);
                frame::alpha_over(&mut scratch, fx.frame_at(t_sec)?)?;
                encoder.encode_frame(&scratch)?;
            }
            None => encoder.encode_frame(&base)?,
        }
    }

    encoder.finish()?;
    tracing::info!(frames = total_frames, "track video written");
    Ok(())
}

/// Render every manifest row in order, aborting on the first failure.
#[tracing::instrument(skip_all, fields(manifest = %manifest_path.display()))]
pub fn render_batch(manifest_path: &Path, template: &TrackJob) -> StillcastResult<()> {
    let rows = manifest::read_manifest(manifest_path)?;
    manifest::verify_inputs(&rows)?;
    tracing::info!(jobs = rows.len(), "starting batch render");

    for (idx, row) in rows.iter().enumerate() {
        let job = job_from_row(row, template);
        tracing::info!(row = idx + 1, out = %job.output.display(), "rendering batch row");
        render_track(&job).map_err(|e| {
            StillcastError::manifest(format!(
                "row {} ('{}') failed: {e}",
                idx + 1,
                row.output.display()
            ))
        })?;
    }
    Ok(())
}

fn job_from_row(row: &ManifestRow, template: &TrackJob) -> TrackJob {
    TrackJob {
        image: row.image.clone(),
        audio: row.audio.clone(),
        output: row.output.clone(),
        ..template.clone()
    }
}

/// Render a playlist video: sorted image/track pairs concatenated with
/// crossfades, one continuous audio mix underneath.
#[tracing::instrument(skip_all, fields(out = %job.output.display()))]
pub fn render_playlist(job: &PlaylistJob) -> StillcastResult<()> {
    let images = manifest::files_from_directory(&job.image_dir, &job.image_ext)?;
    let tracks = manifest::files_from_directory(&job.music_dir, &job.music_ext)?;
    if images.is_empty() {
        return Err(StillcastError::validation(format!(
            "no '{}' images found in '{}'",
            job.image_ext,
            job.image_dir.display()
        )));
    }
    if images.len() != tracks.len() {
        return Err(StillcastError::validation(format!(
            "image count ({}) does not match track count ({})",
            images.len(),
            tracks.len()
        )));
    }

    let mut durations = Vec::with_capacity(tracks.len());
    for track in &tracks {
        durations.push(media::probe_audio_duration(track)?);
    }
    let layout = PlaylistLayout::plan(&durations, job.fade_sec)?;
    tracing::info!(
        clips = layout.clip_count(),
        total_sec = layout.total_sec(),
        fade_sec = layout.fade_sec(),
        "planned playlist"
    );

    let (width, height) = job.resolution.dimensions();
    let mix = TempFile::new(mix_path_for(&job.output));
    let mix_frames = audio::mix_playlist_to_f32le(&tracks, &layout, mix.path())?;
    tracing::debug!(frames = mix_frames, path = %mix.path().display(), "audio mix written");

    let cfg = EncodeConfig {
        width,
        height,
        fps: job.fps,
        out_path: job.output.clone(),
        overwrite: job.overwrite,
        threads: job.threads,
    };
    let audio_track = AudioTrack::RawPcm {
        path: mix.path().to_path_buf(),
        sample_rate: media::MIX_SAMPLE_RATE,
        channels: 2,
    };
    let mut encoder = FfmpegEncoder::new(cfg, audio_track)?;

    let mut fx = match &job.effect {
        Some(cfg) => Some(effect::EffectSource::open(cfg.clone(), width, height)?),
        None => None,
    };

    // Base frames are loaded on demand and released once a clip has fully
    // faded out, so at most two decoded images are resident.
    let mut bases: Vec<Option<FrameRgba>> = vec![None; images.len()];
    let mut scratch = FrameRgba::opaque_black(width, height);

    let total_frames = layout.total_frames(job.fps);
    for idx in 0..total_frames {
        let t_sec = idx as f64 / f64::from(job.fps);
        let plan = layout.at(t_sec);

        let lowest_active = match plan {
            FramePlan::Hold(i) => i,
            FramePlan::Blend { from, .. } => from,
        };
        for slot in bases.iter_mut().take(lowest_active) {
            *slot = None;
        }

        match plan {
            FramePlan::Hold(i) => {
                let base = load_base(&mut bases, &images, i, width, height)?;
                scratch.data.copy_from_slice(&base.data);
            }
            FramePlan::Blend { from, to, t } => {
                load_base(&mut bases, &images, from, width, height)?;
                load_base(&mut bases, &images, to, width, height)?;
                let (Some(a), Some(b)) = (bases[from].as_ref(), bases[to].as_ref()) else {
                    return Err(StillcastError::validation(
                        "blend clips missing decoded base frames",
                    ));
                };
                frame::blend_into(&mut scratch, a, b, t)?;
            }
        }

        if let Some(fx) = fx.as_mut() {
            frame::alpha_over(&mut scratch, fx.frame_at(t_sec)?)?;
        }
        encoder.encode_frame(&scratch)?;
    }

    encoder.finish()?;
    tracing::info!(frames = total_frames, "playlist video written");
    Ok(())
}

fn load_base<'a>(
    bases: &'a mut [Option<FrameRgba>],
    images: &[PathBuf],
    idx: usize,
    width: u32,
    height: u32,
) -> StillcastResult<&'a FrameRgba> {
    if bases[idx].is_none() {
        bases[idx] = Some(frame::load_cover_image(&images[idx], width, height)?);
    }
    bases[idx]
        .as_ref()
        .ok_or_else(|| StillcastError::validation("base frame slot unexpectedly empty"))
}

fn require_file(path: &Path) -> StillcastResult<()> {
    if !path.is_file() {
        return Err(StillcastError::validation(format!(
            "input file '{}' does not exist",
            path.display()
        )));
    }
    Ok(())
}

fn mix_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "playlist".to_string());
    std::env::temp_dir().join(format!("stillcast-{stem}-{}.f32le", std::process::id()))
}

/// Deletes the wrapped path on drop, including on the error paths out of
/// `render_playlist`.
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.path.exists()
            && let Err(e) = std::fs::remove_file(&self.path)
        {
            tracing::warn!(path = %self.path.display(), "failed to remove temp mix file: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> TrackJob {
        TrackJob {
            image: PathBuf::new(),
            audio: PathBuf::new(),
            output: PathBuf::new(),
            resolution: Resolution::FullHd,
            fps: 1,
            duration_sec: None,
            effect: None,
            overwrite: false,
            threads: None,
        }
    }

    #[test]
    fn batch_jobs_inherit_template_settings() {
        let row = ManifestRow {
            image: PathBuf::from("a.png"),
            audio: PathBuf::from("a.mp3"),
            output: PathBuf::from("a.mp4"),
        };
        let mut tpl = template();
        tpl.fps = 25;
        tpl.duration_sec = Some(60.0);

        let job = job_from_row(&row, &tpl);
        assert_eq!(job.image, PathBuf::from("a.png"));
        assert_eq!(job.output, PathBuf::from("a.mp4"));
        assert_eq!(job.fps, 25);
        assert_eq!(job.duration_sec, Some(60.0));
    }

    #[test]
    fn missing_input_is_a_validation_error() {
        let mut job = template();
        job.image = PathBuf::from("definitely/not/here.png");
        job.audio = PathBuf::from("also/not/here.mp3");
        job.output = PathBuf::from("target/never.mp4");
        let err = render_track(&job).unwrap_err().to_string();
        assert!(err.contains("does not exist"), "{err}");
    }

    #[test]
    fn mix_path_lands_in_temp_dir() {
        let p = mix_path_for(Path::new("renders/mix_test.mp4"));
        assert!(p.starts_with(std::env::temp_dir()));
        assert!(p.to_string_lossy().contains("mix_test"));
        assert!(p.to_string_lossy().ends_with(".f32le"));
    }

    #[test]
    fn temp_file_removes_itself_on_drop() {
        let path = std::env::temp_dir().join(format!(
            "stillcast-droptest-{}.f32le",
            std::process::id()
        ));
        std::fs::write(&path, b"x").unwrap();
        {
            let _guard = TempFile::new(path.clone());
        }
        assert!(!path.exists());
    }
}
