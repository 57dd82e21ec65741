//! Simulation parameters and the partial-update form accepted at runtime.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::context::Capabilities;
use crate::error::Result;

/// Dye resolution used when the context cannot filter float textures.
pub const UNFILTERED_DYE_RESOLUTION: u32 = 256;

/// Dye resolution the CPU rasteriser keeps interactive at.
pub const SOFTWARE_DYE_RESOLUTION: u32 = 256;

/// Upper bound on either resolution; framebuffer texel counts must fit in memory.
pub const MAX_RESOLUTION: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub sim_resolution: u32,
    pub dye_resolution: u32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    /// Factor the previous pressure field is scaled by before each solve.
    pub pressure: f32,
    pub pressure_iterations: u32,
    pub curl: f32,
    pub splat_radius: f32,
    pub splat_force: f32,
    pub shading: bool,
    pub color_update_speed: f32,
    pub back_color: Color,
    pub transparent: bool,
    pub paused: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sim_resolution: 128,
            dye_resolution: 1440,
            density_dissipation: 3.5,
            velocity_dissipation: 2.0,
            pressure: 0.1,
            pressure_iterations: 20,
            curl: 3.0,
            splat_radius: 0.2,
            splat_force: 6000.0,
            shading: true,
            color_update_speed: 10.0,
            back_color: Color::new(0.5, 0.0, 0.0),
            transparent: true,
            paused: false,
        }
    }
}

/// What an applied [`ConfigUpdate`] invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChange {
    pub resolution: bool,
    pub keywords: bool,
}

impl SimulationConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        config.clamp_resolutions();
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Overwrite only the options present in `update`.
    pub fn apply(&mut self, update: &ConfigUpdate) -> ConfigChange {
        let before = (self.sim_resolution, self.dye_resolution, self.shading);

        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = update.$field {
                    self.$field = value;
                })*
            };
        }
        merge!(
            sim_resolution,
            dye_resolution,
            density_dissipation,
            velocity_dissipation,
            pressure,
            pressure_iterations,
            curl,
            splat_radius,
            splat_force,
            shading,
            color_update_speed,
            back_color,
            transparent,
            paused,
        );
        self.clamp_resolutions();

        ConfigChange {
            resolution: (self.sim_resolution, self.dye_resolution) != (before.0, before.1),
            keywords: self.shading != before.2,
        }
    }

    /// Drop the options the context cannot honour.
    pub fn restrict_to(&mut self, caps: &Capabilities) {
        if !caps.linear_filtering {
            if self.dye_resolution > UNFILTERED_DYE_RESOLUTION || self.shading {
                log::info!(
                    "linear filtering unsupported: dye resolution capped at {}, shading disabled",
                    UNFILTERED_DYE_RESOLUTION
                );
            }
            self.dye_resolution = self.dye_resolution.min(UNFILTERED_DYE_RESOLUTION);
            self.shading = false;
        }
    }

    /// Cap the dye resolution for hosts that rasterise on the CPU.
    pub fn restrict_to_software(&mut self) {
        if self.dye_resolution > SOFTWARE_DYE_RESOLUTION {
            log::info!("software rasteriser: dye resolution capped at {}", SOFTWARE_DYE_RESOLUTION);
            self.dye_resolution = SOFTWARE_DYE_RESOLUTION;
        }
    }

    fn clamp_resolutions(&mut self) {
        if self.sim_resolution > MAX_RESOLUTION || self.dye_resolution > MAX_RESOLUTION {
            log::warn!("resolution clamped to {}", MAX_RESOLUTION);
        }
        self.sim_resolution = self.sim_resolution.min(MAX_RESOLUTION);
        self.dye_resolution = self.dye_resolution.min(MAX_RESOLUTION);
    }
}

/// Partial configuration; unspecified options keep their current values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigUpdate {
    pub sim_resolution: Option<u32>,
    pub dye_resolution: Option<u32>,
    pub density_dissipation: Option<f32>,
    pub velocity_dissipation: Option<f32>,
    pub pressure: Option<f32>,
    pub pressure_iterations: Option<u32>,
    pub curl: Option<f32>,
    pub splat_radius: Option<f32>,
    pub splat_force: Option<f32>,
    pub shading: Option<bool>,
    pub color_update_speed: Option<f32>,
    pub back_color: Option<Color>,
    pub transparent: Option<bool>,
    pub paused: Option<bool>,
}

impl ConfigUpdate {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<&SimulationConfig> for ConfigUpdate {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            sim_resolution: Some(config.sim_resolution),
            dye_resolution: Some(config.dye_resolution),
            density_dissipation: Some(config.density_dissipation),
            velocity_dissipation: Some(config.velocity_dissipation),
            pressure: Some(config.pressure),
            pressure_iterations: Some(config.pressure_iterations),
            curl: Some(config.curl),
            splat_radius: Some(config.splat_radius),
            splat_force: Some(config.splat_force),
            shading: Some(config.shading),
            color_update_speed: Some(config.color_update_speed),
            back_color: Some(config.back_color),
            transparent: Some(config.transparent),
            paused: Some(config.paused),
        }
    }
}
