//! Kernel catalogue, keyword variants and the program cache.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::ops::BitOr;

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::context::{GpuContext, ProgramId, RenderTarget, ShaderId, TextureId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    BaseVertex,
    Copy,
    Clear,
    Splat,
    Advection,
    Divergence,
    Curl,
    Vorticity,
    Pressure,
    GradientSubtract,
    Display,
}

impl ShaderKind {
    pub fn stage(self) -> ShaderStage {
        match self {
            ShaderKind::BaseVertex => ShaderStage::Vertex,
            _ => ShaderStage::Fragment,
        }
    }

    /// Keywords this kernel branches on; anything else fails compilation.
    pub fn accepted_keywords(self) -> Keywords {
        match self {
            ShaderKind::Advection => Keywords::MANUAL_FILTERING,
            ShaderKind::Display => Keywords::SHADING,
            _ => Keywords::NONE,
        }
    }

    /// WGSL body, without the keyword prelude.
    pub fn source(self) -> &'static str {
        macro_rules! kernel_source {
            ($file:literal) => {
                concat!(include_str!("shaders/common.wgsl"), include_str!(concat!("shaders/", $file)))
            };
        }

        match self {
            ShaderKind::BaseVertex => kernel_source!("base.vert.wgsl"),
            ShaderKind::Copy => kernel_source!("copy.wgsl"),
            ShaderKind::Clear => kernel_source!("clear.wgsl"),
            ShaderKind::Splat => kernel_source!("splat.wgsl"),
            ShaderKind::Advection => kernel_source!("advection.wgsl"),
            ShaderKind::Divergence => kernel_source!("divergence.wgsl"),
            ShaderKind::Curl => kernel_source!("curl.wgsl"),
            ShaderKind::Vorticity => kernel_source!("vorticity.wgsl"),
            ShaderKind::Pressure => kernel_source!("pressure.wgsl"),
            ShaderKind::GradientSubtract => kernel_source!("gradient_subtract.wgsl"),
            ShaderKind::Display => kernel_source!("display.wgsl"),
        }
    }
}

/// Feature flags a kernel can be compiled with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Keywords(u8);

impl Keywords {
    pub const NONE: Keywords = Keywords(0);
    pub const SHADING: Keywords = Keywords(1);
    pub const MANUAL_FILTERING: Keywords = Keywords(1 << 1);

    const NAMED: [(Keywords, &'static str); 2] = [
        (Keywords::SHADING, "SHADING"),
        (Keywords::MANUAL_FILTERING, "MANUAL_FILTERING"),
    ];

    pub fn contains(self, other: Keywords) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Flags set in `self` but not in `other`.
    pub fn difference(self, other: Keywords) -> Keywords {
        Keywords(self.0 & !other.0)
    }

    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMED
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
    }
}

impl BitOr for Keywords {
    type Output = Keywords;

    fn bitor(self, rhs: Keywords) -> Keywords {
        Keywords(self.0 | rhs.0)
    }
}

/// Prepend one boolean constant per known keyword to a WGSL body.
pub fn with_keywords(source: &str, keywords: Keywords) -> String {
    let mut prelude = String::new();
    for (flag, name) in Keywords::NAMED {
        let _ = writeln!(prelude, "const {}: bool = {};", name, keywords.contains(flag));
    }
    prelude.push_str(source);
    prelude
}

/// Uniform block shared by every kernel; matches `Params` in the WGSL sources.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Uniforms {
    pub texel_size: [f32; 2],
    pub dye_texel_size: [f32; 2],
    pub point: [f32; 2],
    pub dt: f32,
    pub dissipation: f32,
    pub color: [f32; 4],
    pub curl: f32,
    pub value: f32,
    pub aspect_ratio: f32,
    pub radius: f32,
}

impl Uniforms {
    pub fn texel_size(mut self, texel_size: Vec2) -> Self {
        self.texel_size = texel_size.to_array();
        self
    }

    pub fn dye_texel_size(mut self, texel_size: Vec2) -> Self {
        self.dye_texel_size = texel_size.to_array();
        self
    }

    pub fn point(mut self, point: Vec2) -> Self {
        self.point = point.to_array();
        self
    }

    pub fn dt(mut self, dt: f32) -> Self {
        self.dt = dt;
        self
    }

    pub fn dissipation(mut self, dissipation: f32) -> Self {
        self.dissipation = dissipation;
        self
    }

    pub fn color(mut self, color: Vec3) -> Self {
        self.color = color.extend(0.0).to_array();
        self
    }

    pub fn curl(mut self, curl: f32) -> Self {
        self.curl = curl;
        self
    }

    pub fn value(mut self, value: f32) -> Self {
        self.value = value;
        self
    }

    pub fn aspect_ratio(mut self, aspect_ratio: f32) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn texel_size_vec(&self) -> Vec2 {
        Vec2::from_array(self.texel_size)
    }

    pub fn dye_texel_size_vec(&self) -> Vec2 {
        Vec2::from_array(self.dye_texel_size)
    }

    pub fn point_vec(&self) -> Vec2 {
        Vec2::from_array(self.point)
    }

    pub fn color_vec(&self) -> Vec3 {
        Vec3::new(self.color[0], self.color[1], self.color[2])
    }
}

/// A linked vertex + fragment pair. Failed builds stay around but unusable.
#[derive(Debug, Clone)]
pub struct Program {
    kind: ShaderKind,
    keywords: Keywords,
    handle: Option<ProgramId>,
}

impl Program {
    pub fn build<C: GpuContext>(ctx: &mut C, vertex: Option<ShaderId>, kind: ShaderKind, keywords: Keywords) -> Self {
        let handle = vertex.and_then(|vertex| {
            let linked = ctx
                .compile_shader(kind, keywords)
                .and_then(|fragment| ctx.link_program(vertex, fragment));
            match linked {
                Ok(handle) => Some(handle),
                Err(err) => {
                    log::error!("{}", err);
                    None
                }
            }
        });
        Self { kind, keywords, handle }
    }

    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    pub fn keywords(&self) -> Keywords {
        self.keywords
    }

    pub fn handle(&self) -> Option<ProgramId> {
        self.handle
    }

    pub fn is_usable(&self) -> bool {
        self.handle.is_some()
    }

    /// Draw over the whole target. Unusable programs are skipped.
    pub fn blit<C: GpuContext>(&self, ctx: &mut C, uniforms: &Uniforms, inputs: &[TextureId], target: RenderTarget) {
        match self.handle {
            Some(handle) => ctx.draw(handle, uniforms, inputs, target),
            None => log::warn!("skipping draw with unusable {:?} program", self.kind),
        }
    }

    pub fn release<C: GpuContext>(&mut self, ctx: &mut C) {
        if let Some(handle) = self.handle.take() {
            ctx.delete_program(handle);
        }
    }
}

pub fn compile_vertex<C: GpuContext>(ctx: &mut C) -> Option<ShaderId> {
    match ctx.compile_shader(ShaderKind::BaseVertex, Keywords::NONE) {
        Ok(shader) => Some(shader),
        Err(err) => {
            log::error!("{}", err);
            None
        }
    }
}

/// A kernel whose keyword variants are compiled lazily and cached.
#[derive(Debug)]
pub struct Material {
    kind: ShaderKind,
    vertex: Option<ShaderId>,
    variants: HashMap<Keywords, Program>,
    active: Option<Keywords>,
}

impl Material {
    pub fn new(kind: ShaderKind, vertex: Option<ShaderId>) -> Self {
        Self {
            kind,
            vertex,
            variants: HashMap::new(),
            active: None,
        }
    }

    /// Select the variant for `keywords`, compiling it on a cache miss.
    /// Returns whether the active variant changed.
    pub fn set_keywords<C: GpuContext>(&mut self, ctx: &mut C, keywords: Keywords) -> bool {
        if self.active == Some(keywords) {
            return false;
        }
        let (kind, vertex) = (self.kind, self.vertex);
        self.variants
            .entry(keywords)
            .or_insert_with(|| Program::build(ctx, vertex, kind, keywords));
        self.active = Some(keywords);
        true
    }

    pub fn active(&self) -> Option<&Program> {
        self.active.and_then(|keywords| self.variants.get(&keywords))
    }

    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    pub fn release<C: GpuContext>(&mut self, ctx: &mut C) {
        for program in self.variants.values_mut() {
            program.release(ctx);
        }
        self.variants.clear();
        self.active = None;
    }
}

/// Every fixed-variant kernel the stepper and splat passes use.
#[derive(Debug)]
pub struct Programs {
    pub copy: Program,
    pub clear: Program,
    pub splat: Program,
    pub advection: Program,
    pub divergence: Program,
    pub curl: Program,
    pub vorticity: Program,
    pub pressure: Program,
    pub gradient_subtract: Program,
}

impl Programs {
    pub fn compile<C: GpuContext>(ctx: &mut C, vertex: Option<ShaderId>, linear_filtering: bool) -> Self {
        let advection_keywords = if linear_filtering {
            Keywords::NONE
        } else {
            Keywords::MANUAL_FILTERING
        };
        let mut build = |kind, keywords| Program::build(ctx, vertex, kind, keywords);
        Self {
            copy: build(ShaderKind::Copy, Keywords::NONE),
            clear: build(ShaderKind::Clear, Keywords::NONE),
            splat: build(ShaderKind::Splat, Keywords::NONE),
            advection: build(ShaderKind::Advection, advection_keywords),
            divergence: build(ShaderKind::Divergence, Keywords::NONE),
            curl: build(ShaderKind::Curl, Keywords::NONE),
            vorticity: build(ShaderKind::Vorticity, Keywords::NONE),
            pressure: build(ShaderKind::Pressure, Keywords::NONE),
            gradient_subtract: build(ShaderKind::GradientSubtract, Keywords::NONE),
        }
    }

    pub fn release<C: GpuContext>(&mut self, ctx: &mut C) {
        for program in [
            &mut self.copy,
            &mut self.clear,
            &mut self.splat,
            &mut self.advection,
            &mut self.divergence,
            &mut self.curl,
            &mut self.vorticity,
            &mut self.pressure,
            &mut self.gradient_subtract,
        ] {
            program.release(ctx);
        }
    }
}
