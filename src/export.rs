use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, Rgba, RgbaImage};

use crate::context::DrawingSurface;
use crate::cursor::{FieldSnapshot, SplashCursor};
use crate::driver::FrameScheduler;
use crate::error::Result;
use crate::stepper::MAX_DT;

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Color snapshot to an image; snapshot row 0 is the bottom, image row 0 the top.
pub fn to_rgba8(snapshot: &FieldSnapshot) -> RgbaImage {
    RgbaImage::from_fn(snapshot.width, snapshot.height, |x, y| {
        let texel = snapshot.texel(x, snapshot.height - 1 - y);
        Rgba([to_byte(texel.x), to_byte(texel.y), to_byte(texel.z), to_byte(texel.w)])
    })
}

/// Velocity snapshot to an image: red for |x|, green for |y|.
pub fn velocity_to_rgba8(snapshot: &FieldSnapshot, scale: f32) -> RgbaImage {
    RgbaImage::from_fn(snapshot.width, snapshot.height, |x, y| {
        let texel = snapshot.texel(x, snapshot.height - 1 - y);
        Rgba([to_byte(texel.x.abs() * scale), to_byte(texel.y.abs() * scale), 128, 255])
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageExporter;

impl ImageExporter {
    pub fn new() -> Self {
        Self
    }

    pub fn export_png(&self, snapshot: &FieldSnapshot, path: &Path) -> Result<()> {
        to_rgba8(snapshot).save(path)?;
        Ok(())
    }

    pub fn export_velocity_png(&self, snapshot: &FieldSnapshot, scale: f32, path: &Path) -> Result<()> {
        velocity_to_rgba8(snapshot, scale).save(path)?;
        Ok(())
    }

    pub fn png_bytes(&self, snapshot: &FieldSnapshot) -> Result<Vec<u8>> {
        let mut bytes = Cursor::new(Vec::new());
        to_rgba8(snapshot).write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }

    /// `data:image/png;base64,...` URL of the snapshot.
    pub fn data_url(&self, snapshot: &FieldSnapshot) -> Result<String> {
        let bytes = self.png_bytes(snapshot)?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
    }

    /// Tick `cursor` `frames` times at 60 Hz, writing the surface after each frame.
    pub fn export_frame_sequence<S: DrawingSurface, F: FrameScheduler>(
        &self,
        cursor: &mut SplashCursor<S, F>,
        start: Duration,
        frames: usize,
        output_dir: &Path,
        prefix: &str,
    ) -> Result<()> {
        for i in 0..frames {
            cursor.tick(start + Duration::from_secs_f32(MAX_DT * (i + 1) as f32));
            let Some(surface) = cursor.read_surface() else {
                break;
            };
            let path = output_dir.join(format!("{}_frame_{:04}.png", prefix, i));
            self.export_png(&surface, &path)?;
        }
        Ok(())
    }
}
