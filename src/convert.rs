// Pixel format helpers for frame producers
// NV21 camera frames to I420 with optional rotation, BT.601 reference, test pattern

use crate::renderer::{i420_frame_len, RendererError};

/// Direction of a quarter turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
}

/// Limited-range BT.601 colors of the eight bars, left to right
const COLOR_BARS: [[u8; 3]; 8] = [
    [235, 128, 128], // white
    [210, 16, 146],  // yellow
    [170, 166, 16],  // cyan
    [145, 54, 34],   // green
    [106, 202, 222], // magenta
    [81, 90, 240],   // red
    [41, 240, 110],  // blue
    [16, 128, 128],  // black
];

/// Pixels the bars move per frame
const BAR_SCROLL_STEP: u64 = 4;

fn check_len(len: usize, width: u32, height: u32) -> Result<usize, RendererError> {
    match i420_frame_len(width, height) {
        Some(expected) if expected == len => Ok(expected),
        _ => Err(RendererError::InvalidFrameSize { width, height, len }),
    }
}

/// Convert NV21 (Y plane, then interleaved V/U) to I420
pub fn nv21_to_i420(
    src: &[u8],
    width: u32,
    height: u32,
    dst: &mut [u8],
) -> Result<(), RendererError> {
    check_len(src.len(), width, height)?;
    check_len(dst.len(), width, height)?;

    let luma = width as usize * height as usize;
    let chroma = luma / 4;
    dst[..luma].copy_from_slice(&src[..luma]);

    let (u_plane, v_plane) = dst[luma..].split_at_mut(chroma);
    for (k, vu) in src[luma..].chunks_exact(2).enumerate() {
        v_plane[k] = vu[0];
        u_plane[k] = vu[1];
    }
    Ok(())
}

/// Convert NV21 to I420 while rotating a quarter turn.
///
/// A `width x height` source becomes a `height x width` frame.
pub fn nv21_to_i420_rotate90(
    src: &[u8],
    width: u32,
    height: u32,
    dst: &mut [u8],
    rotation: Rotation,
) -> Result<(), RendererError> {
    check_len(src.len(), width, height)?;
    check_len(dst.len(), height, width)?;

    let w = width as usize;
    let h = height as usize;
    let luma = w * h;
    let (y_dst, chroma_dst) = dst.split_at_mut(luma);
    let (u_dst, v_dst) = chroma_dst.split_at_mut(luma / 4);
    let (y_src, vu_src) = src.split_at(luma);

    // Destination is h wide and w tall
    let mut k = 0;
    for row in 0..w {
        for col in 0..h {
            let (sx, sy) = match rotation {
                Rotation::Clockwise => (row, h - 1 - col),
                Rotation::CounterClockwise => (w - 1 - row, col),
            };
            y_dst[k] = y_src[sy * w + sx];
            k += 1;
        }
    }

    let (cw, ch) = (w / 2, h / 2);
    let mut k = 0;
    for row in 0..cw {
        for col in 0..ch {
            let (sx, sy) = match rotation {
                Rotation::Clockwise => (row, ch - 1 - col),
                Rotation::CounterClockwise => (cw - 1 - row, col),
            };
            let pair = sy * w + sx * 2;
            v_dst[k] = vu_src[pair];
            u_dst[k] = vu_src[pair + 1];
            k += 1;
        }
    }
    Ok(())
}

/// Convert NV21 to I420 while turning the frame upside down
pub fn nv21_to_i420_rotate180(
    src: &[u8],
    width: u32,
    height: u32,
    dst: &mut [u8],
) -> Result<(), RendererError> {
    check_len(src.len(), width, height)?;
    check_len(dst.len(), width, height)?;

    let luma = width as usize * height as usize;
    let (y_dst, chroma_dst) = dst.split_at_mut(luma);
    let (u_dst, v_dst) = chroma_dst.split_at_mut(luma / 4);
    let (y_src, vu_src) = src.split_at(luma);

    for (d, s) in y_dst.iter_mut().zip(y_src.iter().rev()) {
        *d = *s;
    }
    // Chroma pairs in reverse order, each still V then U
    for (k, vu) in vu_src.chunks_exact(2).rev().enumerate() {
        v_dst[k] = vu[0];
        u_dst[k] = vu[1];
    }
    Ok(())
}

/// CPU reference of the fragment shader's limited-range BT.601 conversion
pub fn bt601_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32 / 255.0;
    let u = u as f32 / 255.0 - 0.5;
    let v = v as f32 / 255.0 - 0.5;

    let luma = 1.164383 * (y - 16.0 / 255.0);
    let r = luma + 1.596027 * v;
    let g = luma - 0.391762 * u - 0.812968 * v;
    let b = luma + 2.017232 * u;

    [r, g, b].map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Fill `dst` with eight vertical color bars scrolled by `frame_index`
pub fn fill_color_bars(
    dst: &mut [u8],
    width: u32,
    height: u32,
    frame_index: u64,
) -> Result<(), RendererError> {
    check_len(dst.len(), width, height)?;

    let w = width as usize;
    let h = height as usize;
    let offset = (frame_index.wrapping_mul(BAR_SCROLL_STEP) % width as u64) as usize;
    let bar_at = |x: usize| COLOR_BARS[((x + offset) % w) * COLOR_BARS.len() / w];

    let (y_plane, chroma) = dst.split_at_mut(w * h);
    let (u_plane, v_plane) = chroma.split_at_mut(w * h / 4);

    for row in y_plane.chunks_exact_mut(w) {
        for (x, px) in row.iter_mut().enumerate() {
            *px = bar_at(x)[0];
        }
    }

    let cw = w / 2;
    for (u_row, v_row) in u_plane.chunks_exact_mut(cw).zip(v_plane.chunks_exact_mut(cw)) {
        for x in 0..cw {
            let [_, u, v] = bar_at(x * 2);
            u_row[x] = u;
            v_row[x] = v;
        }
    }
    Ok(())
}
