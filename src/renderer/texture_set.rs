// Plane textures
// One single-channel texture per I420 plane, bound to texture units 0/1/2

use super::RendererError;
use super::context::{GraphicsContext, TextureHandle, TextureParams};
use super::planes::{I420Planes, Plane};

pub fn plane_texture_params(plane: Plane) -> TextureParams {
    TextureParams {
        label: plane.label(),
    }
}

/// The Y, U and V textures of one graphics context
#[derive(Debug)]
pub struct TextureSet {
    textures: [TextureHandle; 3],
    /// Luma size of the last upload
    dimensions: Option<(u32, u32)>,
}

impl TextureSet {
    pub fn initialize<C: GraphicsContext>(ctx: &mut C) -> Result<Self, RendererError> {
        let y = ctx.create_texture(&plane_texture_params(Plane::Y))?;
        let u = match ctx.create_texture(&plane_texture_params(Plane::U)) {
            Ok(u) => u,
            Err(e) => {
                ctx.delete_texture(y);
                return Err(e);
            }
        };
        let v = match ctx.create_texture(&plane_texture_params(Plane::V)) {
            Ok(v) => v,
            Err(e) => {
                ctx.delete_texture(y);
                ctx.delete_texture(u);
                return Err(e);
            }
        };

        Ok(Self {
            textures: [y, u, v],
            dimensions: None,
        })
    }

    /// Replace the contents of all three textures, re-dimensioning them when
    /// the frame size changed
    pub fn upload<C: GraphicsContext>(
        &mut self,
        ctx: &mut C,
        planes: &I420Planes<'_>,
    ) -> Result<(), RendererError> {
        let dimensions = planes.dimensions();
        if self.dimensions != Some(dimensions) {
            log::debug!(
                "Plane textures resized: {:?} -> {}x{}",
                self.dimensions,
                dimensions.0,
                dimensions.1
            );
            self.dimensions = Some(dimensions);
        }

        for view in planes.iter() {
            let unit = view.plane.unit();
            ctx.upload_texture(
                &self.textures[unit as usize],
                unit,
                view.width,
                view.height,
                view.data,
            )?;
        }
        Ok(())
    }

    /// Textures in texture unit order
    pub fn units(&self) -> [&TextureHandle; 3] {
        [&self.textures[0], &self.textures[1], &self.textures[2]]
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    pub fn release<C: GraphicsContext>(self, ctx: &mut C) {
        for texture in self.textures {
            ctx.delete_texture(texture);
        }
    }
}
