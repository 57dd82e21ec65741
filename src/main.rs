use std::path::{Path, PathBuf};
use std::time::Duration;

use splash_fluid::stepper::MAX_DT;
use splash_fluid::{
    AnalysisRecorder, FieldKind, FieldMetrics, ImageExporter, PointerEvent, QueuedScheduler, SimulationConfig,
    SoftwareSurface, SplashCursor,
};

const OUTPUT_DIR: &str = "splash_output";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let config = match args.iter().position(|arg| arg == "--config") {
        Some(i) => {
            let path = args.get(i + 1).ok_or("--config needs a path")?;
            SimulationConfig::load(Path::new(path))?
        }
        None => SimulationConfig::default(),
    };

    if args.get(1).map(String::as_str) == Some("test") {
        // Run a scripted drag headless and export PNGs
        run_headless_test(config)?;
    } else {
        run_gui_app(config)?;
    }

    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn run_gui_app(config: SimulationConfig) -> Result<(), Box<dyn std::error::Error>> {
    splash_fluid::desktop::run(config)?;
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn run_gui_app(_config: SimulationConfig) -> Result<(), Box<dyn std::error::Error>> {
    Err("the browser build is driven from JavaScript".into())
}

fn run_headless_test(mut config: SimulationConfig) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("running headless splash test");
    config.restrict_to_software();

    let output = PathBuf::from(OUTPUT_DIR);
    std::fs::create_dir_all(&output)?;

    let surface = SoftwareSurface::new(200.0, 200.0);
    let mut cursor = SplashCursor::new(surface, QueuedScheduler::new(), config)?.with_seed(7);
    let exporter = ImageExporter::new();
    let mut recorder = AnalysisRecorder::new();

    // The first move starts the loop
    cursor.handle_event(&PointerEvent::MouseMove { x: 40.0, y: 100.0 });

    for frame in 0..40usize {
        if frame < 20 {
            let x = 40.0 + 6.0 * (frame + 1) as f32;
            let y = 100.0 + 20.0 * (frame as f32 * 0.4).sin();
            cursor.handle_event(&PointerEvent::MouseMove { x, y });
        }
        if frame == 25 {
            cursor.handle_event(&PointerEvent::MouseDown { x: 100.0, y: 60.0 });
            cursor.handle_event(&PointerEvent::MouseUp);
        }

        cursor.scheduler_mut().fire();
        cursor.tick(Duration::from_secs_f32(MAX_DT * (frame + 1) as f32));

        let (Some(dye), Some(velocity)) = (cursor.snapshot(FieldKind::Dye), cursor.snapshot(FieldKind::Velocity))
        else {
            break;
        };
        let metrics = FieldMetrics::analyze(&dye, &velocity, frame);
        if frame % 5 == 0 {
            metrics.log_summary();
            if let Some(surface) = cursor.read_surface() {
                exporter.export_png(&surface, &output.join(format!("test_frame_{:04}.png", frame)))?;
            }
            exporter.export_velocity_png(
                &velocity,
                0.01,
                &output.join(format!("test_velocity_{:04}.png", frame)),
            )?;
        }
        recorder.record(metrics);
    }

    recorder.log_trends();
    cursor.destroy();
    log::info!("headless test finished, frames written to {}", output.display());
    Ok(())
}
