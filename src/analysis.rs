use std::collections::HashMap;

use crate::cursor::FieldSnapshot;

#[derive(Debug, Clone)]
pub struct FieldMetrics {
    pub total_dye: f32,
    pub max_dye: f32,
    pub avg_dye: f32,
    pub total_kinetic_energy: f32,
    pub max_velocity: f32,
    pub avg_velocity: f32,
    pub dye_entropy: f32,
    pub velocity_divergence: f32,
    pub vorticity: f32,
    pub frame: usize,
}

impl FieldMetrics {
    /// Summarise a dye snapshot and a velocity snapshot (they may differ in size).
    pub fn analyze(dye: &FieldSnapshot, velocity: &FieldSnapshot, frame: usize) -> Self {
        let mut total_dye: f32 = 0.0;
        let mut max_dye: f32 = 0.0;
        let mut histogram = HashMap::new();
        for texel in &dye.texels {
            let amount = texel.x + texel.y + texel.z;
            total_dye += amount;
            max_dye = max_dye.max(amount);
            // Quantize for the entropy estimate
            *histogram.entry((amount * 10.0).floor() as i64).or_insert(0usize) += 1;
        }
        let dye_cells = dye.texels.len().max(1) as f32;

        let mut entropy = 0.0;
        for &count in histogram.values() {
            let probability = count as f32 / dye_cells;
            if probability > 0.0 {
                entropy -= probability * probability.log2();
            }
        }

        let mut total_kinetic_energy: f32 = 0.0;
        let mut max_velocity: f32 = 0.0;
        let mut velocity_sum: f32 = 0.0;
        for texel in &velocity.texels {
            let speed = texel.truncate().truncate().length();
            total_kinetic_energy += 0.5 * speed * speed;
            max_velocity = max_velocity.max(speed);
            velocity_sum += speed;
        }

        let (width, height) = (velocity.width as usize, velocity.height as usize);
        let at = |x: usize, y: usize| velocity.texels[y * width + x];
        let mut total_divergence = 0.0;
        let mut total_vorticity = 0.0;
        for y in 1..height.saturating_sub(1) {
            for x in 1..width.saturating_sub(1) {
                let divergence = (at(x + 1, y).x - at(x - 1, y).x + at(x, y + 1).y - at(x, y - 1).y) / 2.0;
                total_divergence += divergence.abs();

                let vorticity = (at(x + 1, y).y - at(x - 1, y).y - at(x, y + 1).x + at(x, y - 1).x) / 2.0;
                total_vorticity += vorticity.abs();
            }
        }
        let velocity_cells = velocity.texels.len().max(1) as f32;

        Self {
            total_dye,
            max_dye,
            avg_dye: total_dye / dye_cells,
            total_kinetic_energy,
            max_velocity,
            avg_velocity: velocity_sum / velocity_cells,
            dye_entropy: entropy,
            velocity_divergence: total_divergence / velocity_cells,
            vorticity: total_vorticity / velocity_cells,
            frame,
        }
    }

    pub fn log_summary(&self) {
        log::info!(
            "frame {}: dye total {:.6} max {:.6} avg {:.6}, kinetic {:.6}, speed max {:.6} avg {:.6}, entropy {:.6}, divergence {:.6}, vorticity {:.6}",
            self.frame,
            self.total_dye,
            self.max_dye,
            self.avg_dye,
            self.total_kinetic_energy,
            self.max_velocity,
            self.avg_velocity,
            self.dye_entropy,
            self.velocity_divergence,
            self.vorticity
        );
    }
}

/// Sum of squared residuals of the discrete pressure equation
/// `l + r + t + b - 4p = div`, with out-of-range neighbors mirrored as `-p`.
///
/// Returns `NaN` unless both snapshots share one size and hold every texel.
pub fn pressure_residual(pressure: &FieldSnapshot, divergence: &FieldSnapshot) -> f32 {
    let texels = pressure.width as usize * pressure.height as usize;
    if (pressure.width, pressure.height) != (divergence.width, divergence.height)
        || pressure.texels.len() < texels
        || divergence.texels.len() < texels
    {
        log::warn!(
            "pressure residual needs matching snapshots, got {}x{} and {}x{}",
            pressure.width,
            pressure.height,
            divergence.width,
            divergence.height
        );
        return f32::NAN;
    }
    let (width, height) = (pressure.width as i64, pressure.height as i64);
    let p = |x: i64, y: i64| pressure.texels[(y * width + x) as usize].x;

    let mut residual = 0.0;
    for y in 0..height {
        for x in 0..width {
            let c = p(x, y);
            let neighbor = |nx: i64, ny: i64| {
                if nx < 0 || ny < 0 || nx >= width || ny >= height {
                    -c
                } else {
                    p(nx, ny)
                }
            };
            let sum = neighbor(x - 1, y) + neighbor(x + 1, y) + neighbor(x, y + 1) + neighbor(x, y - 1);
            let div = divergence.texels[(y * width + x) as usize].x;
            let r = sum - 4.0 * c - div;
            residual += r * r;
        }
    }
    residual
}

/// Whether every channel of every texel is within `epsilon` of zero.
pub fn is_blank(snapshot: &FieldSnapshot, epsilon: f32) -> bool {
    snapshot
        .texels
        .iter()
        .all(|texel| texel.abs().max_element() <= epsilon)
}

#[derive(Debug, Default)]
pub struct AnalysisRecorder {
    pub metrics_history: Vec<FieldMetrics>,
}

impl AnalysisRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, metrics: FieldMetrics) {
        self.metrics_history.push(metrics);
    }

    pub fn log_trends(&self) {
        let (Some(first), Some(last)) = (self.metrics_history.first(), self.metrics_history.last()) else {
            return;
        };
        if self.metrics_history.len() < 2 {
            return;
        }

        log::info!(
            "dye change: {:.6} -> {:.6} ({:+.3}%)",
            first.total_dye,
            last.total_dye,
            (last.total_dye - first.total_dye) / first.total_dye.max(0.001) * 100.0
        );
        log::info!(
            "kinetic energy change: {:.6} -> {:.6} ({:+.3}%)",
            first.total_kinetic_energy,
            last.total_kinetic_energy,
            (last.total_kinetic_energy - first.total_kinetic_energy) / first.total_kinetic_energy.max(0.001) * 100.0
        );
        log::info!(
            "entropy change: {:.6} -> {:.6} ({:+.3}%)",
            first.dye_entropy,
            last.dye_entropy,
            (last.dye_entropy - first.dye_entropy) / first.dye_entropy.max(0.001) * 100.0
        );
    }
}
