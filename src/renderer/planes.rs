//! Plane splitting for packed I420 buffers.
//!
//! An I420 frame of `W x H` pixels is one buffer holding the full-resolution
//! Y plane followed by the U and V planes at `W/2 x H/2`. Splitting only
//! computes views; no bytes are copied.

use super::RendererError;

/// Plane index inside an I420 frame. Also the texture unit the plane is sampled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    Y = 0,
    U = 1,
    V = 2,
}

impl Plane {
    pub const ALL: [Plane; 3] = [Plane::Y, Plane::U, Plane::V];

    pub fn unit(self) -> u32 {
        self as u32
    }

    pub fn label(self) -> &'static str {
        match self {
            Plane::Y => "Y Texture",
            Plane::U => "U Texture",
            Plane::V => "V Texture",
        }
    }
}

/// Borrowed view of one plane with its size in samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneView<'a> {
    pub plane: Plane,
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

/// The three planes of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I420Planes<'a> {
    pub y: PlaneView<'a>,
    pub u: PlaneView<'a>,
    pub v: PlaneView<'a>,
}

impl<'a> I420Planes<'a> {
    /// Luma dimensions, i.e. the frame size
    pub fn dimensions(&self) -> (u32, u32) {
        (self.y.width, self.y.height)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaneView<'a>> {
        [&self.y, &self.u, &self.v].into_iter()
    }
}

/// Expected byte length of a `width x height` I420 frame.
///
/// Returns `None` for odd or zero dimensions and on overflow.
pub fn i420_frame_len(width: u32, height: u32) -> Option<usize> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return None;
    }
    let luma = (width as usize).checked_mul(height as usize)?;
    luma.checked_add(luma / 2)
}

/// Split a packed I420 buffer into its Y, U and V planes
pub fn split_i420(data: &[u8], width: u32, height: u32) -> Result<I420Planes<'_>, RendererError> {
    let invalid = || RendererError::InvalidFrameSize {
        width,
        height,
        len: data.len(),
    };

    let expected = i420_frame_len(width, height).ok_or_else(invalid)?;
    if data.len() != expected {
        return Err(invalid());
    }

    let y_size = width as usize * height as usize;
    let uv_size = y_size / 4;
    let (y, chroma) = data.split_at(y_size);
    let (u, v) = chroma.split_at(uv_size);

    let uv_width = width / 2;
    let uv_height = height / 2;

    Ok(I420Planes {
        y: PlaneView {
            plane: Plane::Y,
            width,
            height,
            data: y,
        },
        u: PlaneView {
            plane: Plane::U,
            width: uv_width,
            height: uv_height,
            data: u,
        },
        v: PlaneView {
            plane: Plane::V,
            width: uv_width,
            height: uv_height,
            data: v,
        },
    })
}
