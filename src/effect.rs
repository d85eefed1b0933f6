use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    error::{StillcastError, StillcastResult},
    frame::{FrameRgba, mul_div255},
    media::{self, MediaInfo},
};

const DECODE_BATCH_FRAMES: u32 = 32;

fn default_threshold() -> f64 {
    0.10
}

fn default_softness() -> f64 {
    0.12
}

/// Chroma-keyed overlay parameters. Colors are normalized RGB triples in
/// [0, 1]: `background_color` is keyed out of the effect video and the
/// surviving pixels are multiplied channel-wise by `effect_color`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EffectConfig {
    pub effect_path: PathBuf,
    pub background_color: [f64; 3],
    pub effect_color: [f64; 3],
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_softness")]
    pub softness: f64,
}

impl EffectConfig {
    pub fn from_path(path: &Path) -> StillcastResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read effect config '{}'", path.display()))?;
        let cfg: EffectConfig = serde_json::from_slice(&bytes).map_err(|e| {
            StillcastError::validation(format!(
                "invalid effect config '{}': {e}",
                path.display()
            ))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> StillcastResult<()> {
        for (name, color) in [
            ("background_color", &self.background_color),
            ("effect_color", &self.effect_color),
        ] {
            for &c in color {
                if !(c.is_finite() && (0.0..=1.0).contains(&c)) {
                    return Err(StillcastError::validation(format!(
                        "effect {name} components must be normalized to [0, 1], got {c}"
                    )));
                }
            }
        }
        if !(self.threshold.is_finite() && (0.0..=1.0).contains(&self.threshold)) {
            return Err(StillcastError::validation(
                "effect threshold must be within [0, 1]",
            ));
        }
        if !(self.softness.is_finite() && self.softness > 0.0 && self.softness <= 1.0) {
            return Err(StillcastError::validation(
                "effect softness must be within (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Key out the background color and tint what remains, in place. The buffer
/// ends up premultiplied so it can be composited with source-over.
pub fn key_and_tint(rgba: &mut [u8], cfg: &EffectConfig) {
    let bg = cfg.background_color;
    let tint = cfg.effect_color;

    for px in rgba.chunks_exact_mut(4) {
        let r = f64::from(px[0]) / 255.0;
        let g = f64::from(px[1]) / 255.0;
        let b = f64::from(px[2]) / 255.0;

        // Normalized Euclidean distance to the key color (max distance 1.0).
        let dist = (((r - bg[0]).powi(2) + (g - bg[1]).powi(2) + (b - bg[2]).powi(2)) / 3.0).sqrt();
        let alpha = ((dist - cfg.threshold) / cfg.softness).clamp(0.0, 1.0);

        let a8 = (alpha * 255.0).round() as u16;
        px[0] = mul_div255(((r * tint[0]) * 255.0).round() as u16, a8) as u8;
        px[1] = mul_div255(((g * tint[1]) * 255.0).round() as u16, a8) as u8;
        px[2] = mul_div255(((b * tint[2]) * 255.0).round() as u16, a8) as u8;
        px[3] = a8 as u8;
    }
}

/// Looped access to chroma-keyed, tinted effect frames at arbitrary timeline
/// times. Frames are decoded in sequential batches and processed once per
/// batch; the effect video wraps around its own duration.
pub struct EffectSource {
    cfg: EffectConfig,
    info: MediaInfo,
    width: u32,
    height: u32,
    batch_start: u64,
    batch: Vec<FrameRgba>,
}

impl EffectSource {
    pub fn open(cfg: EffectConfig, width: u32, height: u32) -> StillcastResult<Self> {
        cfg.validate()?;
        let info = media::probe_media(&cfg.effect_path)?;
        if !info.has_video {
            return Err(StillcastError::media(format!(
                "effect '{}' contains no video stream",
                cfg.effect_path.display()
            )));
        }
        if info.source_fps() <= 0.0 {
            return Err(StillcastError::media(format!(
                "effect '{}' reports no frame rate",
                cfg.effect_path.display()
            )));
        }
        if !(info.duration_sec.is_finite() && info.duration_sec > 0.0) {
            return Err(StillcastError::media(format!(
                "effect '{}' has no usable duration",
                cfg.effect_path.display()
            )));
        }
        Ok(Self {
            cfg,
            info,
            width,
            height,
            batch_start: 0,
            batch: Vec::new(),
        })
    }

    pub fn source_duration_sec(&self) -> f64 {
        self.info.duration_sec
    }

    /// Total frames in one pass of the effect video.
    fn source_frames(&self) -> u64 {
        ((self.info.duration_sec * self.info.source_fps()).floor() as u64).max(1)
    }

    /// The processed effect frame covering timeline time `t_sec`, looping the
    /// source as needed.
    pub fn frame_at(&mut self, t_sec: f64) -> StillcastResult<&FrameRgba> {
        if !(t_sec.is_finite() && t_sec >= 0.0) {
            return Err(StillcastError::validation(
                "effect frame time must be finite and >= 0",
            ));
        }

        let fps = self.info.source_fps();
        let total = self.source_frames();
        let frame_idx = ((t_sec * fps).floor() as u64) % total;

        let in_batch = frame_idx >= self.batch_start
            && frame_idx < self.batch_start + self.batch.len() as u64;
        if !in_batch {
            self.load_batch(frame_idx)?;
        }

        let offset = (frame_idx - self.batch_start) as usize;
        Ok(&self.batch[offset])
    }

    fn load_batch(&mut self, start_frame: u64) -> StillcastResult<()> {
        let fps = self.info.source_fps();
        let total = self.source_frames();
        let want = DECODE_BATCH_FRAMES.min((total - start_frame) as u32).max(1);

        let start_sec = start_frame as f64 / fps;
        let raw = media::decode_video_frames_rgba8(
            &self.info,
            start_sec,
            want,
            Some((self.width, self.height)),
        )?;
        if raw.is_empty() {
            return Err(StillcastError::media(format!(
                "effect '{}' returned no frames at {start_sec:.3}s",
                self.cfg.effect_path.display()
            )));
        }

        let mut batch = Vec::with_capacity(raw.len());
        for mut data in raw {
            key_and_tint(&mut data, &self.cfg);
            batch.push(FrameRgba::new(self.width, self.height, true, data)?);
        }
        self.batch_start = start_frame;
        self.batch = batch;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EffectConfig {
        EffectConfig {
            effect_path: PathBuf::from("effects/particles.mp4"),
            background_color: [0.0, 0.0, 0.0],
            effect_color: [1.0, 0.0, 0.0],
            threshold: 0.1,
            softness: 0.2,
        }
    }

    #[test]
    fn validate_rejects_out_of_range_colors() {
        let mut bad = cfg();
        bad.effect_color = [1.5, 0.0, 0.0];
        assert!(bad.validate().is_err());

        let mut bad = cfg();
        bad.background_color = [0.0, -0.1, 0.0];
        assert!(bad.validate().is_err());

        assert!(cfg().validate().is_ok());
    }

    #[test]
    fn key_removes_background_pixels() {
        let c = cfg();
        // One pixel exactly at the key color, one far from it.
        let mut buf = vec![0u8, 0, 0, 255, 255, 255, 255, 255];
        key_and_tint(&mut buf, &c);
        assert_eq!(buf[3], 0, "key-color pixel must become transparent");
        assert_eq!(buf[7], 255, "distant pixel must stay opaque");
    }

    #[test]
    fn tint_multiplies_surviving_channels() {
        let c = cfg();
        // White pixel tinted pure red: green/blue are zeroed.
        let mut buf = vec![255u8, 255, 255, 255];
        key_and_tint(&mut buf, &c);
        assert_eq!(buf[0], 255);
        assert_eq!(buf[1], 0);
        assert_eq!(buf[2], 0);
        assert_eq!(buf[3], 255);
    }

    #[test]
    fn keyed_output_is_premultiplied() {
        let c = EffectConfig {
            threshold: 0.0,
            softness: 1.0,
            ..cfg()
        };
        // A dim gray sits partway up the alpha ramp; premultiplied channels
        // can never exceed alpha for a tint of 1.0.
        let mut buf = vec![80u8, 80, 80, 255];
        key_and_tint(&mut buf, &c);
        assert!(buf[3] > 0 && buf[3] < 255);
        assert!(buf[0] <= buf[3]);
    }

    #[test]
    fn config_parses_json_with_defaults() {
        let json = r#"{
            "effect_path": "effects/particles.mp4",
            "background_color": [0, 0, 0],
            "effect_color": [1, 0, 0]
        }"#;
        let cfg: EffectConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.threshold, default_threshold());
        assert_eq!(cfg.softness, default_softness());
        cfg.validate().unwrap();
    }
}
