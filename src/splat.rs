//! Gaussian impulses into the velocity and dye fields.

use glam::{Vec2, Vec3};
use rand::Rng;

use crate::context::GpuContext;
use crate::framebuffer::SimulationFields;
use crate::input::{Pointer, generate_color};
use crate::program::{Program, Uniforms};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    /// Center in texture coordinates.
    pub point: Vec2,
    /// Velocity added at the center.
    pub force: Vec2,
    /// Dye added at the center.
    pub color: Vec3,
}

/// Widen the splat on landscape surfaces so it stays round on screen.
pub fn correct_radius(radius: f32, aspect_ratio: f32) -> f32 {
    if aspect_ratio > 1.0 {
        radius * aspect_ratio
    } else {
        radius
    }
}

/// A bright burst with a small random push.
pub fn click_splat<R: Rng + ?Sized>(rng: &mut R, point: Vec2) -> Splat {
    let color = generate_color(rng) * 10.0;
    let force = Vec2::new(
        10.0 * (rng.gen_range(0.0..1.0) - 0.5),
        30.0 * (rng.gen_range(0.0..1.0) - 0.5),
    );
    Splat { point, force, color }
}

pub fn pointer_splat(pointer: &Pointer, splat_force: f32) -> Splat {
    Splat {
        point: pointer.texcoord,
        force: pointer.delta * splat_force,
        color: pointer.color,
    }
}

/// Add `splat` to velocity, then to dye. `splat_radius` is the configured
/// radius (percent of the short axis).
pub fn apply_splat<C: GpuContext>(
    ctx: &mut C,
    program: &Program,
    fields: &mut SimulationFields,
    splat: &Splat,
    aspect_ratio: f32,
    splat_radius: f32,
) {
    let uniforms = Uniforms::default()
        .texel_size(fields.velocity.texel_size())
        .aspect_ratio(aspect_ratio)
        .point(splat.point)
        .color(splat.force.extend(0.0))
        .radius(correct_radius(splat_radius / 100.0, aspect_ratio));
    program.blit(
        ctx,
        &uniforms,
        &[fields.velocity.read().texture()],
        fields.velocity.write().target(),
    );
    fields.velocity.swap();

    let uniforms = uniforms.texel_size(fields.dye.texel_size()).color(splat.color);
    program.blit(
        ctx,
        &uniforms,
        &[fields.dye.read().texture()],
        fields.dye.write().target(),
    );
    fields.dye.swap();
}
