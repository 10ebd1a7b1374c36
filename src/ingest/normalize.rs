use anyhow::{anyhow, Result};

/// Pixel layouts a capture device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
    Nv12,
}

pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let plane = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    match format {
        PixelFormat::Rgb24 => {
            expect_len("RGB", pixels, plane * 3)?;
            Ok(pixels.to_vec())
        }
        PixelFormat::Yuyv => {
            expect_len("YUYV", pixels, plane * 2)?;
            Ok(yuyv_to_rgb(pixels, plane))
        }
        PixelFormat::Nv12 => {
            expect_len("NV12", pixels, plane + plane / 2)?;
            Ok(nv12_to_rgb(pixels, width as usize, height as usize))
        }
    }
}

fn expect_len(name: &str, pixels: &[u8], expected: usize) -> Result<()> {
    if pixels.len() != expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            name,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

fn yuyv_to_rgb(pixels: &[u8], plane: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(plane * 3);
    for quad in pixels.chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        push_rgb(&mut rgb, quad[0] as f32, u, v);
        push_rgb(&mut rgb, quad[2] as f32, u, v);
    }
    rgb
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let mut rgb = Vec::with_capacity(y_plane * 3);
    for j in 0..h {
        for i in 0..w {
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;
            push_rgb(&mut rgb, pixels[j * w + i] as f32, u, v);
        }
    }
    rgb
}

fn push_rgb(rgb: &mut Vec<u8>, y: f32, u: f32, v: f32) {
    rgb.push(clamp_to_u8(y + 1.402_f32 * v));
    rgb.push(clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v));
    rgb.push(clamp_to_u8(y + 1.772_f32 * u));
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
