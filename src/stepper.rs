//! One frame of the stable-fluids solver.
//!
//! Every stage reads the current `read` side of its inputs and writes into a
//! separate target; double-buffered outputs are swapped right after.

use crate::config::SimulationConfig;
use crate::context::GpuContext;
use crate::framebuffer::SimulationFields;
use crate::program::{Programs, Uniforms};

/// Longest time step the solver will take in one call.
pub const MAX_DT: f32 = 1.0 / 60.0;

/// Clamp a measured frame gap to the solver's step range.
pub fn clamp_dt(elapsed: f32) -> f32 {
    if elapsed.is_nan() || elapsed <= 0.0 {
        0.0
    } else {
        elapsed.min(MAX_DT)
    }
}

pub fn compute_curl<C: GpuContext>(ctx: &mut C, programs: &Programs, fields: &mut SimulationFields) {
    let uniforms = Uniforms::default().texel_size(fields.velocity.texel_size());
    programs.curl.blit(
        ctx,
        &uniforms,
        &[fields.velocity.read().texture()],
        fields.curl.target(),
    );
}

pub fn apply_vorticity<C: GpuContext>(ctx: &mut C, programs: &Programs, fields: &mut SimulationFields, curl: f32, dt: f32) {
    let uniforms = Uniforms::default()
        .texel_size(fields.velocity.texel_size())
        .curl(curl)
        .dt(dt);
    programs.vorticity.blit(
        ctx,
        &uniforms,
        &[fields.velocity.read().texture(), fields.curl.texture()],
        fields.velocity.write().target(),
    );
    fields.velocity.swap();
}

pub fn compute_divergence<C: GpuContext>(ctx: &mut C, programs: &Programs, fields: &mut SimulationFields) {
    let uniforms = Uniforms::default().texel_size(fields.velocity.texel_size());
    programs.divergence.blit(
        ctx,
        &uniforms,
        &[fields.velocity.read().texture()],
        fields.divergence.target(),
    );
}

/// Scale the previous pressure by `factor` instead of zeroing it.
pub fn clear_pressure<C: GpuContext>(ctx: &mut C, programs: &Programs, fields: &mut SimulationFields, factor: f32) {
    let uniforms = Uniforms::default()
        .texel_size(fields.pressure.texel_size())
        .value(factor);
    programs.clear.blit(
        ctx,
        &uniforms,
        &[fields.pressure.read().texture()],
        fields.pressure.write().target(),
    );
    fields.pressure.swap();
}

/// Jacobi relaxation of the pressure Poisson equation.
pub fn solve_pressure<C: GpuContext>(ctx: &mut C, programs: &Programs, fields: &mut SimulationFields, iterations: u32) {
    let uniforms = Uniforms::default().texel_size(fields.velocity.texel_size());
    for _ in 0..iterations {
        programs.pressure.blit(
            ctx,
            &uniforms,
            &[fields.pressure.read().texture(), fields.divergence.texture()],
            fields.pressure.write().target(),
        );
        fields.pressure.swap();
    }
}

pub fn subtract_gradient<C: GpuContext>(ctx: &mut C, programs: &Programs, fields: &mut SimulationFields) {
    let uniforms = Uniforms::default().texel_size(fields.velocity.texel_size());
    programs.gradient_subtract.blit(
        ctx,
        &uniforms,
        &[fields.pressure.read().texture(), fields.velocity.read().texture()],
        fields.velocity.write().target(),
    );
    fields.velocity.swap();
}

/// Semi-Lagrangian self-advection of the velocity field.
pub fn advect_velocity<C: GpuContext>(ctx: &mut C, programs: &Programs, fields: &mut SimulationFields, dt: f32, dissipation: f32) {
    let texel_size = fields.velocity.texel_size();
    let uniforms = Uniforms::default()
        .texel_size(texel_size)
        .dye_texel_size(texel_size)
        .dt(dt)
        .dissipation(dissipation);
    let velocity = fields.velocity.read().texture();
    programs.advection.blit(
        ctx,
        &uniforms,
        &[velocity, velocity],
        fields.velocity.write().target(),
    );
    fields.velocity.swap();
}

/// Carry dye along the (already advected) velocity field.
pub fn advect_dye<C: GpuContext>(ctx: &mut C, programs: &Programs, fields: &mut SimulationFields, dt: f32, dissipation: f32) {
    let uniforms = Uniforms::default()
        .texel_size(fields.velocity.texel_size())
        .dye_texel_size(fields.dye.texel_size())
        .dt(dt)
        .dissipation(dissipation);
    programs.advection.blit(
        ctx,
        &uniforms,
        &[fields.velocity.read().texture(), fields.dye.read().texture()],
        fields.dye.write().target(),
    );
    fields.dye.swap();
}

pub fn step<C: GpuContext>(ctx: &mut C, programs: &Programs, fields: &mut SimulationFields, config: &SimulationConfig, dt: f32) {
    ctx.set_blending(false);

    compute_curl(ctx, programs, fields);
    apply_vorticity(ctx, programs, fields, config.curl, dt);
    compute_divergence(ctx, programs, fields);
    clear_pressure(ctx, programs, fields, config.pressure);
    solve_pressure(ctx, programs, fields, config.pressure_iterations);
    subtract_gradient(ctx, programs, fields);
    advect_velocity(ctx, programs, fields, dt, config.velocity_dissipation);
    advect_dye(ctx, programs, fields, dt, config.density_dissipation);
}
