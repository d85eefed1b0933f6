use std::path::Path;

use anyhow::Context as _;

use crate::error::{StillcastError, StillcastResult};

/// An owned RGBA8 frame buffer. When `premultiplied` is set the color
/// channels are already multiplied by alpha.
#[derive(Clone, Debug)]
pub struct FrameRgba {
    pub width: u32,
    pub height: u32,
    pub premultiplied: bool,
    pub data: Vec<u8>,
}

impl FrameRgba {
    pub fn new(width: u32, height: u32, premultiplied: bool, data: Vec<u8>) -> StillcastResult<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(StillcastError::validation(format!(
                "frame buffer size mismatch: got {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            premultiplied,
            data,
        })
    }

    pub fn opaque_black(width: u32, height: u32) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * 4];
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self {
            width,
            height,
            premultiplied: false,
            data,
        }
    }

    fn dims_match(&self, other: &FrameRgba) -> StillcastResult<()> {
        if self.width != other.width || self.height != other.height {
            return Err(StillcastError::validation(format!(
                "frame size mismatch: {}x{} vs {}x{}",
                self.width, self.height, other.width, other.height
            )));
        }
        Ok(())
    }
}

/// Decode an image file and scale it to cover the target resolution,
/// center-cropping the overflow. The result is opaque.
pub fn load_cover_image(path: &Path, width: u32, height: u32) -> StillcastResult<FrameRgba> {
    if width == 0 || height == 0 {
        return Err(StillcastError::validation(
            "cover target dimensions must be non-zero",
        ));
    }
    let img = image::open(path)
        .with_context(|| format!("failed to decode image '{}'", path.display()))?;
    Ok(fit_cover(&img, width, height))
}

pub fn fit_cover(img: &image::DynamicImage, width: u32, height: u32) -> FrameRgba {
    let fitted = img.resize_to_fill(width, height, image::imageops::FilterType::Lanczos3);
    let mut rgba = fitted.to_rgba8().into_raw();
    for px in rgba.chunks_exact_mut(4) {
        px[3] = 255;
    }
    FrameRgba {
        width,
        height,
        premultiplied: false,
        data: rgba,
    }
}

/// Source-over composite of a premultiplied overlay onto `dst`.
pub fn alpha_over(dst: &mut FrameRgba, overlay: &FrameRgba) -> StillcastResult<()> {
    dst.dims_match(overlay)?;
    if !overlay.premultiplied {
        return Err(StillcastError::validation(
            "alpha_over expects a premultiplied overlay",
        ));
    }

    for (d, s) in dst
        .data
        .chunks_exact_mut(4)
        .zip(overlay.data.chunks_exact(4))
    {
        let a = u16::from(s[3]);
        if a == 0 {
            continue;
        }
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255 - a;
        d[0] = (u16::from(s[0]) + mul_div255(u16::from(d[0]), inv)).min(255) as u8;
        d[1] = (u16::from(s[1]) + mul_div255(u16::from(d[1]), inv)).min(255) as u8;
        d[2] = (u16::from(s[2]) + mul_div255(u16::from(d[2]), inv)).min(255) as u8;
        d[3] = (a + mul_div255(u16::from(d[3]), inv)).min(255) as u8;
    }
    Ok(())
}

/// Linear crossfade between two frames: `t = 0` yields `a`, `t = 1` yields `b`.
/// The mix is written into `out`, which must match the frame dimensions.
pub fn blend_into(out: &mut FrameRgba, a: &FrameRgba, b: &FrameRgba, t: f64) -> StillcastResult<()> {
    a.dims_match(b)?;
    a.dims_match(out)?;
    if !t.is_finite() {
        return Err(StillcastError::validation("blend factor must be finite"));
    }
    let t = t.clamp(0.0, 1.0);
    let w = (t * 256.0).round() as u32;
    let inv = 256 - w;

    for ((o, pa), pb) in out
        .data
        .chunks_exact_mut(4)
        .zip(a.data.chunks_exact(4))
        .zip(b.data.chunks_exact(4))
    {
        for c in 0..4 {
            o[c] = ((u32::from(pa[c]) * inv + u32::from(pb[c]) * w + 128) >> 8).min(255) as u8;
        }
    }
    out.premultiplied = a.premultiplied;
    Ok(())
}

pub(crate) fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> FrameRgba {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width * height) {
            data.extend_from_slice(&rgba);
        }
        FrameRgba::new(width, height, false, data).unwrap()
    }

    #[test]
    fn new_rejects_bad_buffer_size() {
        assert!(FrameRgba::new(2, 2, false, vec![0u8; 15]).is_err());
        assert!(FrameRgba::new(2, 2, false, vec![0u8; 16]).is_ok());
    }

    #[test]
    fn fit_cover_crops_to_exact_target() {
        let src = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            8,
            4,
            image::Rgba([10, 20, 30, 255]),
        ));
        let frame = fit_cover(&src, 4, 4);
        assert_eq!((frame.width, frame.height), (4, 4));
        assert_eq!(frame.data.len(), 4 * 4 * 4);
        assert!(frame.data.chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn blend_endpoints_select_inputs() {
        let a = solid(2, 2, [255, 0, 0, 255]);
        let b = solid(2, 2, [0, 0, 255, 255]);
        let mut out = solid(2, 2, [0, 0, 0, 255]);

        blend_into(&mut out, &a, &b, 0.0).unwrap();
        assert_eq!(&out.data[..4], &[255, 0, 0, 255]);

        blend_into(&mut out, &a, &b, 1.0).unwrap();
        assert_eq!(&out.data[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn blend_midpoint_mixes_channels() {
        let a = solid(1, 1, [200, 0, 0, 255]);
        let b = solid(1, 1, [0, 0, 100, 255]);
        let mut out = solid(1, 1, [0, 0, 0, 255]);
        blend_into(&mut out, &a, &b, 0.5).unwrap();
        assert_eq!(out.data[0], 100);
        assert_eq!(out.data[2], 50);
        assert_eq!(out.data[3], 255);
    }

    #[test]
    fn blend_rejects_size_mismatch() {
        let a = solid(1, 1, [0, 0, 0, 255]);
        let b = solid(2, 1, [0, 0, 0, 255]);
        let mut out = solid(1, 1, [0, 0, 0, 255]);
        assert!(blend_into(&mut out, &a, &b, 0.5).is_err());
    }

    #[test]
    fn alpha_over_full_coverage_replaces_pixel() {
        let mut dst = solid(1, 1, [10, 10, 10, 255]);
        let src = FrameRgba::new(1, 1, true, vec![0, 200, 0, 255]).unwrap();
        alpha_over(&mut dst, &src).unwrap();
        assert_eq!(dst.data, vec![0, 200, 0, 255]);
    }

    #[test]
    fn alpha_over_half_coverage_mixes_with_background() {
        let mut dst = solid(1, 1, [0, 0, 0, 255]);
        // Premultiplied red at 50% alpha.
        let src = FrameRgba::new(1, 1, true, vec![128, 0, 0, 128]).unwrap();
        alpha_over(&mut dst, &src).unwrap();
        assert_eq!(dst.data[0], 128);
        assert_eq!(dst.data[3], 255);
    }

    #[test]
    fn alpha_over_requires_premultiplied_overlay() {
        let mut dst = solid(1, 1, [0, 0, 0, 255]);
        let src = solid(1, 1, [255, 0, 0, 128]);
        assert!(alpha_over(&mut dst, &src).is_err());
    }
}
