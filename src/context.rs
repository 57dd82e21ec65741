//! Rendering-context abstraction and capability detection.
//!
//! A [`DrawingSurface`] hands out a [`GpuContext`]; everything above this
//! module talks to the context only through texture/program handles, so the
//! same pipeline runs on the software rasteriser and on wgpu.

use glam::Vec4;

use crate::error::{Error, Result};
use crate::program::{Keywords, ShaderKind, Uniforms};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextTier {
    /// Float render targets with one/two/four channel formats.
    Extended,
    /// Four-channel half-float targets only.
    Baseline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelType {
    HalfFloat,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    R,
    Rg,
    Rgba,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Channels::R => 1,
            Channels::Rg => 2,
            Channels::Rgba => 4,
        }
    }

    /// Next format to try when this one is not renderable.
    pub fn wider(self) -> Option<Channels> {
        match self {
            Channels::R => Some(Channels::Rg),
            Channels::Rg => Some(Channels::Rgba),
            Channels::Rgba => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureFormat {
    pub channels: Channels,
    pub texel: TexelType,
}

impl TextureFormat {
    pub const fn new(channels: Channels, texel: TexelType) -> Self {
        Self { channels, texel }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Where a draw lands: the visible drawing buffer or an offscreen texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    Surface,
    Texture(TextureId),
}

pub trait GpuContext {
    fn tier(&self) -> ContextTier;
    fn texel_type(&self) -> TexelType;
    fn supports_linear_filtering(&self) -> bool;

    /// Trial-allocate a small texture + framebuffer and report completeness.
    fn supports_render_target(&mut self, format: TextureFormat) -> bool;

    /// Allocate a zero-cleared texture with clamp-to-edge addressing.
    fn create_texture(&mut self, width: u32, height: u32, format: TextureFormat, filter: FilterMode) -> TextureId;
    fn delete_texture(&mut self, texture: TextureId);
    /// Replace a texture's contents; rows run bottom to top.
    fn upload(&mut self, texture: TextureId, texels: &[Vec4]);
    /// Read back a target; rows run bottom to top.
    fn read_texels(&mut self, target: RenderTarget) -> Vec<Vec4>;

    fn compile_shader(&mut self, kind: ShaderKind, keywords: Keywords) -> Result<ShaderId>;
    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId>;
    fn delete_program(&mut self, program: ProgramId);

    /// Premultiplied "one, one-minus-source-alpha" blending for later draws.
    fn set_blending(&mut self, enabled: bool);
    /// Run `program` over every texel of `target`, sampling `inputs` in binding order.
    fn draw(&mut self, program: ProgramId, uniforms: &Uniforms, inputs: &[TextureId], target: RenderTarget);
    fn clear(&mut self, target: RenderTarget, color: Vec4);

    fn drawing_buffer_size(&self) -> (u32, u32);
    fn resize_drawing_buffer(&mut self, width: u32, height: u32);
}

/// Host-side drawing surface (a canvas, a window region, an offscreen target).
pub trait DrawingSurface {
    type Context: GpuContext;

    /// Size in layout units, before device pixel ratio scaling.
    fn client_size(&self) -> (f32, f32);

    fn device_pixel_ratio(&self) -> f32 {
        1.0
    }

    fn acquire_context(&mut self, tier: ContextTier) -> Option<Self::Context>;

    /// Drawing-buffer size the surface should currently have.
    fn pixel_size(&self) -> (u32, u32) {
        let (width, height) = self.client_size();
        let ratio = self.device_pixel_ratio();
        (
            scale_by_pixel_ratio(width, ratio).max(1),
            scale_by_pixel_ratio(height, ratio).max(1),
        )
    }
}

pub fn scale_by_pixel_ratio(value: f32, ratio: f32) -> u32 {
    (value * ratio).floor().max(0.0) as u32
}

/// Formats and features chosen for one context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capabilities {
    pub tier: ContextTier,
    pub texel_type: TexelType,
    pub linear_filtering: bool,
    pub rgba: TextureFormat,
    pub rg: TextureFormat,
    pub r: TextureFormat,
}

impl Capabilities {
    pub fn detect<C: GpuContext>(ctx: &mut C) -> Result<Self> {
        let tier = ctx.tier();
        let texel = ctx.texel_type();

        let (rgba, rg, r) = match tier {
            ContextTier::Extended => (
                supported_format(ctx, Channels::Rgba, texel),
                supported_format(ctx, Channels::Rg, texel),
                supported_format(ctx, Channels::R, texel),
            ),
            ContextTier::Baseline => {
                let rgba = supported_format(ctx, Channels::Rgba, texel);
                (rgba, rgba, rgba)
            }
        };

        let caps = Self {
            tier,
            texel_type: texel,
            linear_filtering: ctx.supports_linear_filtering(),
            rgba: rgba.ok_or(Error::NoRenderableFormat(Channels::Rgba))?,
            rg: rg.ok_or(Error::NoRenderableFormat(Channels::Rg))?,
            r: r.ok_or(Error::NoRenderableFormat(Channels::R))?,
        };
        log::info!(
            "{:?} context: {:?} texels, linear filtering {}, formats r={:?} rg={:?} rgba={:?}",
            caps.tier,
            caps.texel_type,
            caps.linear_filtering,
            caps.r.channels,
            caps.rg.channels,
            caps.rgba.channels
        );
        Ok(caps)
    }

    pub fn advected_filter(&self) -> FilterMode {
        if self.linear_filtering {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        }
    }
}

/// First renderable format starting at `channels`, widening R -> RG -> RGBA.
pub fn supported_format<C: GpuContext>(ctx: &mut C, channels: Channels, texel: TexelType) -> Option<TextureFormat> {
    let format = TextureFormat::new(channels, texel);
    if ctx.supports_render_target(format) {
        return Some(format);
    }
    channels.wider().and_then(|wider| supported_format(ctx, wider, texel))
}

/// Obtain the best context the surface offers and probe its formats.
pub fn acquire<S: DrawingSurface>(surface: &mut S) -> Result<(S::Context, Capabilities)> {
    let mut ctx = [ContextTier::Extended, ContextTier::Baseline]
        .into_iter()
        .find_map(|tier| surface.acquire_context(tier))
        .ok_or(Error::NoContext)?;
    let caps = Capabilities::detect(&mut ctx)?;
    Ok((ctx, caps))
}
