//! Offscreen render targets: single fields, ping-pong pairs and the full
//! set of simulation fields.

use glam::{Vec2, Vec4};

use crate::config::SimulationConfig;
use crate::context::{Capabilities, FilterMode, GpuContext, RenderTarget, TextureFormat, TextureId};
use crate::program::{Program, Uniforms};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub format: TextureFormat,
    pub filter: FilterMode,
}

/// One texture + framebuffer pair.
#[derive(Debug, PartialEq)]
pub struct Field {
    texture: TextureId,
    width: u32,
    height: u32,
    texel_size: Vec2,
    spec: FieldSpec,
}

impl Field {
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn target(&self) -> RenderTarget {
        RenderTarget::Texture(self.texture)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn texel_size(&self) -> Vec2 {
        self.texel_size
    }

    pub fn spec(&self) -> FieldSpec {
        self.spec
    }
}

/// Two same-shaped fields whose read/write roles swap after every pass.
#[derive(Debug, PartialEq)]
pub struct DoubleField {
    read: Field,
    write: Field,
}

impl DoubleField {
    pub fn read(&self) -> &Field {
        &self.read
    }

    pub fn write(&self) -> &Field {
        &self.write
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }

    pub fn width(&self) -> u32 {
        self.read.width
    }

    pub fn height(&self) -> u32 {
        self.read.height
    }

    pub fn size(&self) -> (u32, u32) {
        self.read.size()
    }

    pub fn texel_size(&self) -> Vec2 {
        self.read.texel_size
    }

    pub fn spec(&self) -> FieldSpec {
        self.read.spec
    }
}

pub fn create_field<C: GpuContext>(ctx: &mut C, width: u32, height: u32, spec: FieldSpec) -> Field {
    let (width, height) = (width.max(1), height.max(1));
    let texture = ctx.create_texture(width, height, spec.format, spec.filter);
    ctx.clear(RenderTarget::Texture(texture), Vec4::ZERO);
    Field {
        texture,
        width,
        height,
        texel_size: Vec2::new(1.0 / width as f32, 1.0 / height as f32),
        spec,
    }
}

pub fn create_double<C: GpuContext>(ctx: &mut C, width: u32, height: u32, spec: FieldSpec) -> DoubleField {
    DoubleField {
        read: create_field(ctx, width, height, spec),
        write: create_field(ctx, width, height, spec),
    }
}

pub fn release_field<C: GpuContext>(ctx: &mut C, field: Field) {
    ctx.delete_texture(field.texture);
}

pub fn release_double<C: GpuContext>(ctx: &mut C, field: DoubleField) {
    release_field(ctx, field.read);
    release_field(ctx, field.write);
}

/// New field of the given size holding a resampled copy of `source`.
pub fn resize_field<C: GpuContext>(ctx: &mut C, copy: &Program, source: &Field, width: u32, height: u32) -> Field {
    let resized = create_field(ctx, width, height, source.spec);
    let uniforms = Uniforms::default().texel_size(resized.texel_size);
    copy.blit(ctx, &uniforms, &[source.texture], resized.target());
    resized
}

/// Resize both buffers, carrying the read contents over. Returns `false`
/// (and touches nothing) when the size is unchanged.
pub fn resize_double<C: GpuContext>(ctx: &mut C, copy: &Program, target: &mut DoubleField, width: u32, height: u32) -> bool {
    let (width, height) = (width.max(1), height.max(1));
    if target.size() == (width, height) {
        return false;
    }
    let read = resize_field(ctx, copy, &target.read, width, height);
    let write = create_field(ctx, width, height, target.spec());
    release_field(ctx, std::mem::replace(&mut target.read, read));
    release_field(ctx, std::mem::replace(&mut target.write, write));
    true
}

/// Field size for `resolution` texels along the short axis of a surface.
pub fn resolution(resolution: u32, surface_width: u32, surface_height: u32) -> (u32, u32) {
    let (surface_width, surface_height) = (surface_width.max(1), surface_height.max(1));
    let mut aspect_ratio = surface_width as f32 / surface_height as f32;
    if aspect_ratio < 1.0 {
        aspect_ratio = 1.0 / aspect_ratio;
    }
    let min = (resolution as f32).round() as u32;
    let max = (resolution as f32 * aspect_ratio).round() as u32;
    if surface_width > surface_height {
        (max, min)
    } else {
        (min, max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Dye,
    Velocity,
    Pressure,
    Divergence,
    Curl,
}

#[derive(Debug)]
pub struct SimulationFields {
    pub dye: DoubleField,
    pub velocity: DoubleField,
    pub pressure: DoubleField,
    pub divergence: Field,
    pub curl: Field,
}

impl SimulationFields {
    pub fn allocate<C: GpuContext>(ctx: &mut C, caps: &Capabilities, config: &SimulationConfig, surface: (u32, u32)) -> Self {
        let (sim_w, sim_h) = resolution(config.sim_resolution, surface.0, surface.1);
        let (dye_w, dye_h) = resolution(config.dye_resolution, surface.0, surface.1);
        let specs = FieldSpecs::new(caps);
        log::debug!("allocating fields: sim {}x{}, dye {}x{}", sim_w, sim_h, dye_w, dye_h);

        Self {
            dye: create_double(ctx, dye_w, dye_h, specs.dye),
            velocity: create_double(ctx, sim_w, sim_h, specs.velocity),
            pressure: create_double(ctx, sim_w, sim_h, specs.scalar),
            divergence: create_field(ctx, sim_w, sim_h, specs.scalar),
            curl: create_field(ctx, sim_w, sim_h, specs.scalar),
        }
    }

    /// Fit every field to the surface again. Dye and velocity keep their
    /// contents; the derived fields start from zero.
    pub fn reallocate<C: GpuContext>(
        &mut self,
        ctx: &mut C,
        copy: &Program,
        caps: &Capabilities,
        config: &SimulationConfig,
        surface: (u32, u32),
    ) {
        let (sim_w, sim_h) = resolution(config.sim_resolution, surface.0, surface.1);
        let (dye_w, dye_h) = resolution(config.dye_resolution, surface.0, surface.1);
        let specs = FieldSpecs::new(caps);
        log::debug!("reallocating fields: sim {}x{}, dye {}x{}", sim_w, sim_h, dye_w, dye_h);

        resize_double(ctx, copy, &mut self.dye, dye_w, dye_h);
        resize_double(ctx, copy, &mut self.velocity, sim_w, sim_h);

        let pressure = create_double(ctx, sim_w, sim_h, specs.scalar);
        let divergence = create_field(ctx, sim_w, sim_h, specs.scalar);
        let curl = create_field(ctx, sim_w, sim_h, specs.scalar);
        release_double(ctx, std::mem::replace(&mut self.pressure, pressure));
        release_field(ctx, std::mem::replace(&mut self.divergence, divergence));
        release_field(ctx, std::mem::replace(&mut self.curl, curl));
    }

    /// Current contents of a field (the read side of a pair).
    pub fn field(&self, kind: FieldKind) -> &Field {
        match kind {
            FieldKind::Dye => self.dye.read(),
            FieldKind::Velocity => self.velocity.read(),
            FieldKind::Pressure => self.pressure.read(),
            FieldKind::Divergence => &self.divergence,
            FieldKind::Curl => &self.curl,
        }
    }

    pub fn release<C: GpuContext>(self, ctx: &mut C) {
        release_double(ctx, self.dye);
        release_double(ctx, self.velocity);
        release_double(ctx, self.pressure);
        release_field(ctx, self.divergence);
        release_field(ctx, self.curl);
    }
}

struct FieldSpecs {
    dye: FieldSpec,
    velocity: FieldSpec,
    scalar: FieldSpec,
}

impl FieldSpecs {
    fn new(caps: &Capabilities) -> Self {
        let filter = caps.advected_filter();
        Self {
            dye: FieldSpec { format: caps.rgba, filter },
            velocity: FieldSpec { format: caps.rg, filter },
            scalar: FieldSpec {
                format: caps.r,
                filter: FilterMode::Nearest,
            },
        }
    }
}
