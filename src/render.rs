use glam::{Vec2, Vec4};

use crate::config::SimulationConfig;
use crate::context::{GpuContext, RenderTarget, ShaderId};
use crate::framebuffer::Field;
use crate::program::{Keywords, Material, ShaderKind, Uniforms};

/// Composites the dye field onto the surface or an offscreen field.
#[derive(Debug)]
pub struct Renderer {
    display: Material,
}

impl Renderer {
    pub fn new(vertex: Option<ShaderId>) -> Self {
        Self {
            display: Material::new(ShaderKind::Display, vertex),
        }
    }

    pub fn keywords(config: &SimulationConfig) -> Keywords {
        if config.shading {
            Keywords::SHADING
        } else {
            Keywords::NONE
        }
    }

    /// Select the display variant matching `config`; returns whether it changed.
    pub fn update_keywords<C: GpuContext>(&mut self, ctx: &mut C, config: &SimulationConfig) -> bool {
        self.display.set_keywords(ctx, Self::keywords(config))
    }

    pub fn display(&self) -> &Material {
        &self.display
    }

    /// Draw `dye` into `target`, or into the drawing buffer when `target` is `None`.
    pub fn render<C: GpuContext>(&mut self, ctx: &mut C, config: &SimulationConfig, dye: &Field, target: Option<&Field>) {
        let (render_target, (width, height)) = match target {
            Some(field) => (field.target(), field.size()),
            None => (RenderTarget::Surface, ctx.drawing_buffer_size()),
        };

        let background = if config.transparent {
            Vec4::ZERO
        } else {
            config.back_color.to_vec3().extend(1.0)
        };
        ctx.clear(render_target, background);

        self.update_keywords(ctx, config);
        ctx.set_blending(true);

        let texel_size = Vec2::new(1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32);
        let uniforms = Uniforms::default().texel_size(texel_size);
        match self.display.active() {
            Some(program) => program.blit(ctx, &uniforms, &[dye.texture()], render_target),
            None => log::warn!("no display program selected"),
        }
    }

    pub fn release<C: GpuContext>(&mut self, ctx: &mut C) {
        self.display.release(ctx);
    }
}
