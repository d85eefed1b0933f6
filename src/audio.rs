use std::{
    io::Write as _,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::{
    error::{StillcastError, StillcastResult},
    media::{self, AudioPcm, MIX_SAMPLE_RATE},
    timeline::PlaylistLayout,
};

/// Full passes of a `track_sec` source needed to cover `target_sec`.
pub fn loops_to_cover(track_sec: f64, target_sec: f64) -> StillcastResult<u32> {
    if !(track_sec.is_finite() && track_sec > 0.0) {
        return Err(StillcastError::validation(
            "track duration must be finite and > 0",
        ));
    }
    if !(target_sec.is_finite() && target_sec > 0.0) {
        return Err(StillcastError::validation(
            "target duration must be finite and > 0",
        ));
    }
    let loops = (target_sec / track_sec).ceil();
    if loops > f64::from(u32::MAX) {
        return Err(StillcastError::validation(
            "target duration requires an absurd loop count",
        ));
    }
    Ok(loops as u32)
}

/// Linear fade gain at `rel_sec` into a segment of `len_sec`.
pub fn fade_gain(rel_sec: f64, len_sec: f64, fade_in_sec: f64, fade_out_sec: f64) -> f32 {
    let mut gain = 1.0f32;
    if fade_in_sec > 0.0 {
        gain *= (rel_sec / fade_in_sec).clamp(0.0, 1.0) as f32;
    }
    if fade_out_sec > 0.0 {
        let rem = (len_sec - rel_sec).max(0.0);
        gain *= (rem / fade_out_sec).clamp(0.0, 1.0) as f32;
    }
    gain
}

/// Decode every playlist track in turn and write the crossfaded stereo mix as
/// raw interleaved f32le to `out_path`. Only the outgoing and incoming tracks
/// are resident at any time. Returns the number of stereo frames written.
pub fn mix_playlist_to_f32le(
    tracks: &[PathBuf],
    layout: &PlaylistLayout,
    out_path: &Path,
) -> StillcastResult<u64> {
    if tracks.len() != layout.clip_count() {
        return Err(StillcastError::validation(format!(
            "track count ({}) does not match layout clip count ({})",
            tracks.len(),
            layout.clip_count()
        )));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create mix directory '{}'", parent.display()))?;
    }
    let file = std::fs::File::create(out_path)
        .with_context(|| format!("failed to create mix file '{}'", out_path.display()))?;
    let mut writer = std::io::BufWriter::new(file);

    let rate = MIX_SAMPLE_RATE;
    let fade_frames = (layout.fade_sec() * f64::from(rate)).round() as usize;
    let mut written = 0u64;

    let mut current = decode_track_frames(&tracks[0], layout.duration_sec(0), rate)?;
    for idx in 0..tracks.len() {
        let last = idx + 1 == tracks.len();
        let body_start = if idx == 0 { 0 } else { fade_frames };
        let body_end = if last {
            current.frames()
        } else {
            current.frames().saturating_sub(fade_frames)
        };

        written += write_frames(&mut writer, &current, body_start, body_end)?;

        if !last {
            let next = decode_track_frames(&tracks[idx + 1], layout.duration_sec(idx + 1), rate)?;
            written += write_crossfade(&mut writer, &current, body_end, &next, fade_frames)?;
            current = next;
        }
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush mix file '{}'", out_path.display()))?;
    Ok(written)
}

/// Decode one track and snap it to the planned clip duration: extra samples
/// are dropped, shortfalls are padded with silence.
fn decode_track_frames(path: &Path, planned_sec: f64, rate: u32) -> StillcastResult<AudioPcm> {
    let mut pcm = media::decode_audio_f32_stereo(path, rate)?;
    if pcm.interleaved_f32.is_empty() {
        return Err(StillcastError::media(format!(
            "'{}' decoded to zero audio samples",
            path.display()
        )));
    }
    let planned_frames = (planned_sec * f64::from(rate)).round() as usize;
    let planned_len = planned_frames * usize::from(pcm.channels);
    pcm.interleaved_f32.resize(planned_len, 0.0);
    Ok(pcm)
}

fn write_frames(
    writer: &mut impl std::io::Write,
    pcm: &AudioPcm,
    start_frame: usize,
    end_frame: usize,
) -> StillcastResult<u64> {
    if start_frame >= end_frame {
        return Ok(0);
    }
    let ch = usize::from(pcm.channels);
    for &sample in &pcm.interleaved_f32[start_frame * ch..end_frame * ch] {
        writer
            .write_all(&sample.clamp(-1.0, 1.0).to_le_bytes())
            .map_err(|e| StillcastError::media(format!("failed to write audio mix: {e}")))?;
    }
    Ok((end_frame - start_frame) as u64)
}

fn write_crossfade(
    writer: &mut impl std::io::Write,
    outgoing: &AudioPcm,
    outgoing_tail_start: usize,
    incoming: &AudioPcm,
    fade_frames: usize,
) -> StillcastResult<u64> {
    let ch = usize::from(outgoing.channels);
    for k in 0..fade_frames {
        let g_in = (k as f32) / (fade_frames as f32);
        let g_out = 1.0 - g_in;
        for c in 0..ch {
            let out_idx = (outgoing_tail_start + k) * ch + c;
            let in_idx = k * ch + c;
            let tail = outgoing.interleaved_f32.get(out_idx).copied().unwrap_or(0.0);
            let head = incoming.interleaved_f32.get(in_idx).copied().unwrap_or(0.0);
            let mixed = (tail * g_out + head * g_in).clamp(-1.0, 1.0);
            writer
                .write_all(&mixed.to_le_bytes())
                .map_err(|e| StillcastError::media(format!("failed to write audio mix: {e}")))?;
        }
    }
    Ok(fade_frames as u64)
}
