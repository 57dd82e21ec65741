//! Fluid splash cursor: a stable-fluids solver on ping-pong render targets,
//! driven by pointer splats and composited onto a drawing surface.

pub mod analysis;
pub mod config;
pub mod context;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod events;
pub mod export;
pub mod framebuffer;
pub mod input;
pub mod program;
pub mod render;
pub mod software;
pub mod splat;
pub mod stepper;

#[cfg(feature = "gpu")]
pub mod gpu;

#[cfg(not(target_arch = "wasm32"))]
pub mod desktop;

#[cfg(target_arch = "wasm32")]
pub mod web;

// Feature-based backend selection
#[cfg(feature = "cpu")]
pub type DefaultSurface = software::SoftwareSurface;

#[cfg(all(feature = "gpu", not(feature = "cpu")))]
pub type DefaultSurface = gpu::HeadlessSurface;

#[cfg(any(feature = "cpu", feature = "gpu"))]
pub type DefaultContext = <DefaultSurface as context::DrawingSurface>::Context;

pub use analysis::{AnalysisRecorder, FieldMetrics};
pub use config::{Color, ConfigChange, ConfigUpdate, SimulationConfig};
pub use context::{Capabilities, DrawingSurface, GpuContext};
pub use cursor::{FieldSnapshot, SplashCursor};
pub use driver::{FrameScheduler, QueuedScheduler};
pub use error::{Error, Result};
pub use events::{EventKind, EventSource, PointerEvent, Touch};
pub use export::ImageExporter;
pub use framebuffer::FieldKind;
pub use render::Renderer;
pub use software::{SoftwareContext, SoftwareProfile, SoftwareSurface};

#[cfg(not(target_arch = "wasm32"))]
pub use desktop::DesktopApp;

#[cfg(feature = "gpu")]
pub use gpu::{HeadlessSurface, WgpuContext};
