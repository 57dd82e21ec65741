use crate::context::{Channels, ContextTier, DrawingSurface};
use crate::program::ShaderKind;

use super::SoftwareContext;

/// What a software context claims to support. The defaults describe a
/// fully capable device; tests narrow them to exercise fallbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareProfile {
    pub tiers: Vec<ContextTier>,
    pub linear_filtering: bool,
    pub renderable: Vec<Channels>,
    /// Kernels whose compilation fails.
    pub broken_kernels: Vec<ShaderKind>,
}

impl Default for SoftwareProfile {
    fn default() -> Self {
        Self {
            tiers: vec![ContextTier::Extended, ContextTier::Baseline],
            linear_filtering: true,
            renderable: vec![Channels::R, Channels::Rg, Channels::Rgba],
            broken_kernels: Vec::new(),
        }
    }
}

impl SoftwareProfile {
    pub fn baseline() -> Self {
        Self {
            tiers: vec![ContextTier::Baseline],
            ..Self::default()
        }
    }

    pub fn without_linear_filtering(mut self) -> Self {
        self.linear_filtering = false;
        self
    }

    pub fn with_renderable(mut self, renderable: &[Channels]) -> Self {
        self.renderable = renderable.to_vec();
        self
    }

    pub fn with_broken_kernel(mut self, kind: ShaderKind) -> Self {
        self.broken_kernels.push(kind);
        self
    }

    /// No context tier at all.
    pub fn unavailable() -> Self {
        Self {
            tiers: Vec::new(),
            ..Self::default()
        }
    }
}

/// An offscreen surface backed by [`SoftwareContext`].
#[derive(Debug, Clone)]
pub struct SoftwareSurface {
    client_size: (f32, f32),
    pixel_ratio: f32,
    profile: SoftwareProfile,
}

impl SoftwareSurface {
    pub fn new(width: f32, height: f32) -> Self {
        Self::with_profile(width, height, SoftwareProfile::default())
    }

    pub fn with_profile(width: f32, height: f32, profile: SoftwareProfile) -> Self {
        Self {
            client_size: (width, height),
            pixel_ratio: 1.0,
            profile,
        }
    }

    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        self.pixel_ratio = ratio;
        self
    }

    /// Layout change; picked up on the next frame.
    pub fn set_client_size(&mut self, width: f32, height: f32) {
        self.client_size = (width, height);
    }

    pub fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = ratio;
    }
}

impl DrawingSurface for SoftwareSurface {
    type Context = SoftwareContext;

    fn client_size(&self) -> (f32, f32) {
        self.client_size
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn acquire_context(&mut self, tier: ContextTier) -> Option<SoftwareContext> {
        self.profile
            .tiers
            .contains(&tier)
            .then(|| SoftwareContext::new(tier, self.profile.clone()))
    }
}
