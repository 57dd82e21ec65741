//! Software rendering context: every kernel runs on the CPU, one fragment
//! per texel, rows split across the rayon pool.

mod kernels;
mod surface;
mod texture;

use std::collections::HashMap;

use glam::{Vec2, Vec4};
#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

use crate::context::{
    Channels, ContextTier, FilterMode, GpuContext, ProgramId, RenderTarget, ShaderId, TexelType, TextureFormat,
    TextureId,
};
use crate::error::{Error, Result};
use crate::program::{Keywords, ShaderKind, ShaderStage, Uniforms};

pub use kernels::{Fragment, shade};
pub use surface::{SoftwareProfile, SoftwareSurface};
pub use texture::{Bindings, Storage, TexelBuffer};

const DRAWING_BUFFER_FORMAT: TextureFormat = TextureFormat::new(Channels::Rgba, TexelType::HalfFloat);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Compiled {
    kind: ShaderKind,
    keywords: Keywords,
}

#[derive(Debug)]
pub struct SoftwareContext {
    tier: ContextTier,
    profile: SoftwareProfile,
    textures: HashMap<TextureId, TexelBuffer>,
    shaders: HashMap<ShaderId, Compiled>,
    programs: HashMap<ProgramId, Compiled>,
    drawing_buffer: TexelBuffer,
    blending: bool,
    next_id: u32,
}

impl SoftwareContext {
    pub fn new(tier: ContextTier, profile: SoftwareProfile) -> Self {
        Self {
            tier,
            profile,
            textures: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            drawing_buffer: TexelBuffer::drawing_buffer(1, 1, DRAWING_BUFFER_FORMAT),
            blending: false,
            next_id: 0,
        }
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn texture(&self, texture: TextureId) -> Option<&TexelBuffer> {
        self.textures.get(&texture)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn blending(&self) -> bool {
        self.blending
    }

    fn target_mut(&mut self, target: RenderTarget) -> Option<&mut TexelBuffer> {
        match target {
            RenderTarget::Surface => Some(&mut self.drawing_buffer),
            RenderTarget::Texture(id) => self.textures.get_mut(&id),
        }
    }
}

/// Run `shader` for every texel of `target`, optionally blending
/// premultiplied output over the previous contents.
fn rasterize<S>(target: &mut TexelBuffer, blending: bool, shader: S)
where
    S: Fn(Vec2) -> Vec4 + Sync + Send,
{
    let width = target.width() as usize;
    let size = Vec2::new(target.width() as f32, target.height() as f32);
    let storage = target.storage();

    let shade_row = |(y, row): (usize, &mut [Vec4])| {
        for (x, texel) in row.iter_mut().enumerate() {
            let uv = Vec2::new(x as f32 + 0.5, y as f32 + 0.5) / size;
            let src = shader(uv);
            let out = if blending { src + *texel * (1.0 - src.w) } else { src };
            *texel = storage.store(out);
        }
    };

    #[cfg(not(target_arch = "wasm32"))]
    target.texels_mut().par_chunks_mut(width).enumerate().for_each(shade_row);

    #[cfg(target_arch = "wasm32")]
    target.texels_mut().chunks_mut(width).enumerate().for_each(shade_row);
}

impl GpuContext for SoftwareContext {
    fn tier(&self) -> ContextTier {
        self.tier
    }

    fn texel_type(&self) -> TexelType {
        TexelType::HalfFloat
    }

    fn supports_linear_filtering(&self) -> bool {
        self.profile.linear_filtering
    }

    fn supports_render_target(&mut self, format: TextureFormat) -> bool {
        self.profile.renderable.contains(&format.channels)
    }

    fn create_texture(&mut self, width: u32, height: u32, format: TextureFormat, filter: FilterMode) -> TextureId {
        let id = TextureId(self.next_id());
        self.textures.insert(id, TexelBuffer::new(width, height, format, filter));
        id
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn upload(&mut self, texture: TextureId, texels: &[Vec4]) {
        match self.textures.get_mut(&texture) {
            Some(buffer) => buffer.upload(texels),
            None => log::warn!("upload to unknown texture {:?}", texture),
        }
    }

    fn read_texels(&mut self, target: RenderTarget) -> Vec<Vec4> {
        self.target_mut(target)
            .map(|buffer| buffer.texels().to_vec())
            .unwrap_or_default()
    }

    fn compile_shader(&mut self, kind: ShaderKind, keywords: Keywords) -> Result<ShaderId> {
        if self.profile.broken_kernels.contains(&kind) {
            return Err(Error::ShaderCompile {
                kind,
                log: String::from("ERROR: 0:1: kernel rejected by driver"),
            });
        }
        let unknown = keywords.difference(kind.accepted_keywords());
        if !unknown.is_empty() {
            let names: Vec<&str> = unknown.names().collect();
            return Err(Error::ShaderCompile {
                kind,
                log: format!("ERROR: unused keywords {}", names.join(", ")),
            });
        }
        let id = ShaderId(self.next_id());
        self.shaders.insert(id, Compiled { kind, keywords });
        Ok(id)
    }

    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId> {
        let stages = (
            self.shaders.get(&vertex).map(|s| s.kind.stage()),
            self.shaders.get(&fragment).copied(),
        );
        match stages {
            (Some(ShaderStage::Vertex), Some(compiled)) if compiled.kind.stage() == ShaderStage::Fragment => {
                let id = ProgramId(self.next_id());
                self.programs.insert(id, compiled);
                Ok(id)
            }
            _ => Err(Error::ProgramLink {
                log: format!("cannot link {:?} with {:?}", vertex, fragment),
            }),
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn set_blending(&mut self, enabled: bool) {
        self.blending = enabled;
    }

    fn draw(&mut self, program: ProgramId, uniforms: &Uniforms, inputs: &[TextureId], target: RenderTarget) {
        let Some(compiled) = self.programs.get(&program).copied() else {
            log::warn!("draw with unknown program {:?}", program);
            return;
        };

        // Detach the target so the inputs can be borrowed alongside it.
        let mut output = match target {
            RenderTarget::Surface => std::mem::replace(
                &mut self.drawing_buffer,
                TexelBuffer::drawing_buffer(1, 1, DRAWING_BUFFER_FORMAT),
            ),
            RenderTarget::Texture(id) => match self.textures.remove(&id) {
                Some(buffer) => buffer,
                None => {
                    log::warn!("draw into unknown texture {:?}", id);
                    return;
                }
            },
        };

        let unit = |index: usize| inputs.get(index).and_then(|id| self.textures.get(id));
        let bindings = Bindings::new([unit(0), unit(1)]);
        let texel_size = uniforms.texel_size_vec();
        rasterize(&mut output, self.blending, |uv| {
            let frag = Fragment::new(uv, texel_size);
            shade(compiled.kind, compiled.keywords, &frag, uniforms, &bindings)
        });

        match target {
            RenderTarget::Surface => self.drawing_buffer = output,
            RenderTarget::Texture(id) => {
                self.textures.insert(id, output);
            }
        }
    }

    fn clear(&mut self, target: RenderTarget, color: Vec4) {
        if let Some(buffer) = self.target_mut(target) {
            buffer.fill(color);
        }
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        (self.drawing_buffer.width(), self.drawing_buffer.height())
    }

    fn resize_drawing_buffer(&mut self, width: u32, height: u32) {
        self.drawing_buffer = TexelBuffer::drawing_buffer(width, height, DRAWING_BUFFER_FORMAT);
    }
}
