use std::time::Duration;

use glam::{Vec2, Vec3, Vec4};
use splash_fluid::analysis::pressure_residual;
use splash_fluid::context::{Capabilities, GpuContext, acquire};
use splash_fluid::driver::{FrameDriver, QueuedScheduler, wrap};
use splash_fluid::framebuffer::{Field, SimulationFields};
use splash_fluid::program::{Programs, compile_vertex};
use splash_fluid::splat::{Splat, apply_splat, correct_radius};
use splash_fluid::stepper::{self, MAX_DT, clamp_dt};
use splash_fluid::{FieldSnapshot, SimulationConfig, SoftwareContext, SoftwareSurface};

struct Sim {
    ctx: SoftwareContext,
    programs: Programs,
    fields: SimulationFields,
}

fn sim(size: u32, config: &SimulationConfig) -> Sim {
    let mut surface = SoftwareSurface::new(size as f32, size as f32);
    let (mut ctx, caps): (SoftwareContext, Capabilities) = acquire(&mut surface).expect("software context");
    let vertex = compile_vertex(&mut ctx);
    let programs = Programs::compile(&mut ctx, vertex, caps.linear_filtering);
    let fields = SimulationFields::allocate(&mut ctx, &caps, config, (size, size));
    Sim { ctx, programs, fields }
}

fn snapshot(ctx: &mut SoftwareContext, field: &Field) -> FieldSnapshot {
    FieldSnapshot {
        width: field.width(),
        height: field.height(),
        texels: ctx.read_texels(field.target()),
    }
}

fn small_config() -> SimulationConfig {
    SimulationConfig {
        sim_resolution: 16,
        dye_resolution: 32,
        ..SimulationConfig::default()
    }
}

#[test]
fn test_dt_clamp() {
    assert_eq!(clamp_dt(1.0), MAX_DT);
    assert_eq!(clamp_dt(MAX_DT), MAX_DT);
    assert_eq!(clamp_dt(0.01), 0.01);
    assert_eq!(clamp_dt(0.0), 0.0);
    assert_eq!(clamp_dt(-0.5), 0.0);
    assert_eq!(clamp_dt(f32::NAN), 0.0);
}

#[test]
fn test_frame_driver_measures_elapsed_time() {
    let mut driver = FrameDriver::new();
    let mut scheduler = QueuedScheduler::new();
    assert_eq!(driver.begin_frame(&mut scheduler, Duration::from_millis(100)), MAX_DT, "First frame uses the full step");

    let dt = driver.begin_frame(&mut scheduler, Duration::from_millis(105));
    assert!((dt - 0.005).abs() < 1e-6, "Short gaps are used unchanged, got {}", dt);

    assert_eq!(driver.begin_frame(&mut scheduler, Duration::from_millis(500)), MAX_DT);
    // A clock that runs backwards yields a zero step
    assert_eq!(driver.begin_frame(&mut scheduler, Duration::from_millis(400)), 0.0);
}

#[test]
fn test_frame_driver_replaces_undispatched_request() {
    let mut driver = FrameDriver::new();
    let mut scheduler = QueuedScheduler::new();
    assert!(driver.start(&mut scheduler));

    for ms in [0, 16, 32] {
        driver.begin_frame(&mut scheduler, Duration::from_millis(ms));
        driver.end_frame(&mut scheduler);
        assert_eq!(scheduler.pending_count(), 1, "Only the next frame should be queued");
    }

    assert!(driver.stop(&mut scheduler));
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn test_color_timer_wraps() {
    let mut driver = FrameDriver::new();
    assert!(!driver.advance_color_timer(0.05, 10.0));
    assert!((driver.color_timer() - 0.5).abs() < 1e-6);
    assert!(driver.advance_color_timer(0.07, 10.0));
    assert!((driver.color_timer() - 0.2).abs() < 1e-5);

    assert!((wrap(2.5, 0.0, 1.0) - 0.5).abs() < 1e-6);
    assert_eq!(wrap(3.0, 1.0, 1.0), 1.0);
}

#[test]
fn test_jacobi_iterations_never_increase_residual() {
    let mut sim = sim(16, &small_config());
    let (width, height) = sim.fields.divergence.size();
    let mut divergence = vec![Vec4::ZERO; (width * height) as usize];
    divergence[(5 * width + 5) as usize] = Vec4::new(1.0, 0.0, 0.0, 1.0);
    divergence[(10 * width + 11) as usize] = Vec4::new(-1.0, 0.0, 0.0, 1.0);
    divergence[(15 * width) as usize] = Vec4::new(0.5, 0.0, 0.0, 1.0);
    sim.ctx.upload(sim.fields.divergence.texture(), &divergence);
    let divergence = snapshot(&mut sim.ctx, &sim.fields.divergence);

    let mut residuals = Vec::new();
    for _ in 0..30 {
        let pressure = snapshot(&mut sim.ctx, sim.fields.pressure.read());
        residuals.push(pressure_residual(&pressure, &divergence));
        stepper::solve_pressure(&mut sim.ctx, &sim.programs, &mut sim.fields, 1);
    }

    for pair in residuals.windows(2) {
        assert!(
            pair[1] <= pair[0] * (1.0 + 1e-4) + 1e-6,
            "Residual increased from {} to {}",
            pair[0],
            pair[1]
        );
    }
    assert!(residuals[29] < residuals[0], "Relaxation should make progress");
}

#[test]
fn test_splat_decays_with_distance() {
    let config = SimulationConfig {
        sim_resolution: 16,
        dye_resolution: 64,
        ..SimulationConfig::default()
    };
    let mut sim = sim(64, &config);
    let splat = Splat {
        point: Vec2::new(0.5, 0.5),
        force: Vec2::ZERO,
        color: Vec3::ONE,
    };
    apply_splat(&mut sim.ctx, &sim.programs.splat, &mut sim.fields, &splat, 1.0, 0.2);

    let dye = snapshot(&mut sim.ctx, sim.fields.dye.read());
    let radius = correct_radius(0.2 / 100.0, 1.0);
    let row = 32;
    let mut previous = f32::INFINITY;
    for x in 32..48 {
        let uv = Vec2::new((x as f32 + 0.5) / 64.0, (row as f32 + 0.5) / 64.0);
        let d = uv - splat.point;
        let expected = (-d.dot(d) / radius).exp();
        let actual = dye.texel(x, row).x;
        assert!((actual - expected).abs() < 1e-4, "texel {}: {} vs {}", x, actual, expected);
        assert!(actual < previous, "Splat should fall off away from its center");
        previous = actual;
    }

    let center = dye.texel(32, 32).x;
    assert!(center > dye.texel(40, 32).x);
    assert!(dye.texel(0, 0).x < 1e-6, "Splat should stay local");
}

#[test]
fn test_wide_surface_splat_radius_is_corrected() {
    assert_eq!(correct_radius(0.002, 0.5), 0.002);
    assert!((correct_radius(0.002, 2.0) - 0.004).abs() < 1e-9);
}

#[test]
fn test_vorticity_clamps_velocity() {
    let mut sim = sim(16, &small_config());
    let (width, height) = sim.fields.velocity.size();
    let texels = vec![Vec4::new(5000.0, -5000.0, 0.0, 1.0); (width * height) as usize];
    sim.ctx.upload(sim.fields.velocity.read().texture(), &texels);

    stepper::compute_curl(&mut sim.ctx, &sim.programs, &mut sim.fields);
    stepper::apply_vorticity(&mut sim.ctx, &sim.programs, &mut sim.fields, 30.0, MAX_DT);

    let velocity = snapshot(&mut sim.ctx, sim.fields.velocity.read());
    for texel in &velocity.texels {
        assert_eq!(texel.x, 1000.0);
        assert_eq!(texel.y, -1000.0);
    }
}

#[test]
fn test_step_keeps_fields_finite() {
    let config = small_config();
    let mut sim = sim(32, &config);
    for i in 0..4 {
        let splat = Splat {
            point: Vec2::new(0.2 + 0.2 * i as f32, 0.5),
            force: Vec2::new(3000.0, -1500.0),
            color: Vec3::new(1.5, 0.3, 0.0),
        };
        apply_splat(&mut sim.ctx, &sim.programs.splat, &mut sim.fields, &splat, 1.0, config.splat_radius);
    }

    for _ in 0..10 {
        stepper::step(&mut sim.ctx, &sim.programs, &mut sim.fields, &config, MAX_DT);
    }

    let velocity = snapshot(&mut sim.ctx, sim.fields.velocity.read());
    let dye = snapshot(&mut sim.ctx, sim.fields.dye.read());
    assert!(velocity.texels.iter().all(|t| t.is_finite()));
    assert!(dye.texels.iter().all(|t| t.is_finite()));
    assert!(dye.texels.iter().any(|t| t.x > 0.01), "Dye should survive ten steps");
}

#[test]
fn test_advection_dissipates_still_dye() {
    let config = small_config();
    let mut sim = sim(16, &config);
    let (width, height) = sim.fields.dye.size();
    sim.ctx.upload(
        sim.fields.dye.read().texture(),
        &vec![Vec4::new(1.0, 1.0, 1.0, 1.0); (width * height) as usize],
    );

    stepper::advect_dye(&mut sim.ctx, &sim.programs, &mut sim.fields, MAX_DT, 3.5);

    let dye = snapshot(&mut sim.ctx, sim.fields.dye.read());
    let expected = 1.0 / (1.0 + 3.5 * MAX_DT);
    for texel in &dye.texels {
        assert!((texel.x - expected).abs() < 1e-5);
    }
}
