use crate::error::GfxResult;
use crate::gfx::device::{BufferUsage, SharedDevice};
use crate::gfx::geometry::{make_fullscreen_quad_ndc, make_mesh_from_geometry};
use crate::gfx::mesh::Mesh;
use crate::gfx::shader::ShaderProgram;
use crate::gfx::texture::Texture2D;

use super::shaders::{BLIT_FRAGMENT, BLIT_VERTEX};

/// Copies a texture over the whole bound framebuffer
pub struct Blit {
    program: ShaderProgram,
    quad: Mesh,
}

impl Blit {
    pub fn new(device: &SharedDevice) -> GfxResult<Self> {
        Ok(Self {
            program: ShaderProgram::new(device, BLIT_VERTEX, BLIT_FRAGMENT)?,
            quad: make_mesh_from_geometry(device, &make_fullscreen_quad_ndc(), BufferUsage::Static)?,
        })
    }

    pub fn draw(&self, texture: &Texture2D) -> GfxResult<()> {
        self.program.bind();
        self.program.texture("u_texture", texture)?;
        let result = self.quad.draw_elements(0);
        self.program.unbind();
        result
    }
}
