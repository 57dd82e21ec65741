use crate::context::{ContextTier, DrawingSurface};

use super::WgpuContext;

/// A window-less drawing surface rendered through wgpu.
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    client_size: (f32, f32),
    pixel_ratio: f32,
}

impl HeadlessSurface {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            client_size: (width, height),
            pixel_ratio: 1.0,
        }
    }

    pub fn set_client_size(&mut self, width: f32, height: f32) {
        self.client_size = (width, height);
    }
}

impl DrawingSurface for HeadlessSurface {
    type Context = WgpuContext;

    fn client_size(&self) -> (f32, f32) {
        self.client_size
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn acquire_context(&mut self, tier: ContextTier) -> Option<WgpuContext> {
        match WgpuContext::new(tier) {
            Ok(ctx) => Some(ctx),
            Err(err) => {
                log::warn!("{:?} wgpu context unavailable: {}", tier, err);
                None
            }
        }
    }
}
