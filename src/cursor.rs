//! The splash cursor: one surface, one context, one frame loop.

use std::time::Duration;

use glam::Vec4;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::{ConfigChange, ConfigUpdate, SimulationConfig};
use crate::context::{Capabilities, DrawingSurface, GpuContext, RenderTarget, acquire};
use crate::driver::{FrameDriver, FrameScheduler};
use crate::error::Result;
use crate::events::{EventSource, Listeners, PointerEvent};
use crate::framebuffer::{FieldKind, FieldSpec, SimulationFields, create_field, release_field};
use crate::input::{PointerTracker, aspect_ratio};
use crate::program::{Programs, compile_vertex};
use crate::render::Renderer;
use crate::splat::{apply_splat, click_splat, pointer_splat};
use crate::stepper;

/// Texels read back from a field or the drawing buffer; rows run bottom to top.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSnapshot {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<Vec4>,
}

impl FieldSnapshot {
    /// Zero outside the snapshot.
    pub fn texel(&self, x: u32, y: u32) -> Vec4 {
        if x >= self.width || y >= self.height {
            return Vec4::ZERO;
        }
        self.texels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
            .unwrap_or(Vec4::ZERO)
    }
}

struct Resources<C> {
    ctx: C,
    caps: Capabilities,
    programs: Programs,
    renderer: Renderer,
    fields: SimulationFields,
}

pub struct SplashCursor<S: DrawingSurface, F: FrameScheduler> {
    surface: S,
    scheduler: F,
    config: SimulationConfig,
    resources: Option<Resources<S::Context>>,
    pointers: PointerTracker,
    driver: FrameDriver,
    listeners: Listeners,
    source: Option<Box<dyn EventSource>>,
    rng: StdRng,
}

impl<S: DrawingSurface, F: FrameScheduler> SplashCursor<S, F> {
    /// Acquire a context on `surface`, compile every kernel and allocate the
    /// fields. The loop is not started.
    pub fn new(mut surface: S, scheduler: F, config: SimulationConfig) -> Result<Self> {
        let (mut ctx, caps) = acquire(&mut surface)?;
        let mut config = config;
        config.restrict_to(&caps);

        let size = surface.pixel_size();
        ctx.resize_drawing_buffer(size.0, size.1);

        let vertex = compile_vertex(&mut ctx);
        let programs = Programs::compile(&mut ctx, vertex, caps.linear_filtering);
        let mut renderer = Renderer::new(vertex);
        renderer.update_keywords(&mut ctx, &config);
        let fields = SimulationFields::allocate(&mut ctx, &caps, &config, size);
        log::info!("splash cursor ready on a {}x{} surface", size.0, size.1);

        Ok(Self {
            surface,
            scheduler,
            config,
            resources: Some(Resources {
                ctx,
                caps,
                programs,
                renderer,
                fields,
            }),
            pointers: PointerTracker::new(),
            driver: FrameDriver::new(),
            listeners: Listeners::default(),
            source: None,
            rng: StdRng::from_entropy(),
        })
    }

    /// Reseed the color/impulse generator for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn scheduler(&self) -> &F {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut F {
        &mut self.scheduler
    }

    pub fn pointers(&self) -> &PointerTracker {
        &self.pointers
    }

    pub fn driver(&self) -> &FrameDriver {
        &self.driver
    }

    pub fn is_running(&self) -> bool {
        self.driver.is_running()
    }

    pub fn is_destroyed(&self) -> bool {
        self.resources.is_none()
    }

    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.resources.as_ref().map(|res| &res.caps)
    }

    pub fn context(&self) -> Option<&S::Context> {
        self.resources.as_ref().map(|res| &res.ctx)
    }

    pub fn context_mut(&mut self) -> Option<&mut S::Context> {
        self.resources.as_mut().map(|res| &mut res.ctx)
    }

    pub fn fields(&self) -> Option<&SimulationFields> {
        self.resources.as_ref().map(|res| &res.fields)
    }

    pub fn display_variants(&self) -> usize {
        self.resources
            .as_ref()
            .map_or(0, |res| res.renderer.display().variant_count())
    }

    /// Register for every pointer event kind on `source`. A previous source
    /// is detached first.
    pub fn attach<E: EventSource + 'static>(&mut self, source: E) {
        self.detach();
        let mut source: Box<dyn EventSource> = Box::new(source);
        self.listeners.register_all(source.as_mut());
        self.source = Some(source);
    }

    pub fn detach(&mut self) {
        if let Some(mut source) = self.source.take() {
            self.listeners.unregister_all(source.as_mut());
        }
    }

    /// Record pointer state; splats are applied on the next tick. The first
    /// interaction starts the loop.
    pub fn handle_event(&mut self, event: &PointerEvent) {
        let Some(res) = self.resources.as_ref() else {
            return;
        };
        let surface = res.ctx.drawing_buffer_size();
        let ratio = self.surface.device_pixel_ratio();
        if self.pointers.handle_event(event, ratio, surface, &mut self.rng) {
            log::debug!("first interaction ({:?}), starting", event.kind());
            self.start();
        }
    }

    /// Returns `false` if already running or destroyed.
    pub fn start(&mut self) -> bool {
        if self.resources.is_none() {
            return false;
        }
        self.driver.start(&mut self.scheduler)
    }

    /// Returns `false` if already stopped.
    pub fn stop(&mut self) -> bool {
        self.driver.stop(&mut self.scheduler)
    }

    /// Run one frame at host time `now`.
    pub fn tick(&mut self, now: Duration) {
        let Self {
            surface,
            scheduler,
            config,
            resources,
            pointers,
            driver,
            rng,
            ..
        } = self;
        let Some(res) = resources.as_mut() else {
            return;
        };

        let dt = driver.begin_frame(scheduler, now);

        let size = surface.pixel_size();
        if size != res.ctx.drawing_buffer_size() {
            res.ctx.resize_drawing_buffer(size.0, size.1);
            res.fields
                .reallocate(&mut res.ctx, &res.programs.copy, &res.caps, config, size);
        }

        if driver.advance_color_timer(dt, config.color_update_speed) {
            pointers.recolor(rng);
        }

        res.ctx.set_blending(false);
        let aspect = aspect_ratio(size);
        for point in pointers.take_clicks() {
            let splat = click_splat(rng, point);
            apply_splat(&mut res.ctx, &res.programs.splat, &mut res.fields, &splat, aspect, config.splat_radius);
        }
        for pointer in pointers.take_moved() {
            let splat = pointer_splat(&pointer, config.splat_force);
            apply_splat(&mut res.ctx, &res.programs.splat, &mut res.fields, &splat, aspect, config.splat_radius);
        }

        if !config.paused {
            stepper::step(&mut res.ctx, &res.programs, &mut res.fields, config, dt);
        }

        res.renderer
            .render(&mut res.ctx, config, res.fields.dye.read(), None);

        driver.end_frame(scheduler);
    }

    /// Merge `update` into the live configuration.
    pub fn update_config(&mut self, update: &ConfigUpdate) -> ConfigChange {
        let change = self.config.apply(update);
        let Some(res) = self.resources.as_mut() else {
            return change;
        };
        self.config.restrict_to(&res.caps);
        if change.keywords {
            res.renderer.update_keywords(&mut res.ctx, &self.config);
        }
        if change.resolution {
            let size = res.ctx.drawing_buffer_size();
            res.fields
                .reallocate(&mut res.ctx, &res.programs.copy, &res.caps, &self.config, size);
        }
        change
    }

    pub fn update_config_json(&mut self, json: &str) -> Result<ConfigChange> {
        let update = ConfigUpdate::from_json(json)?;
        Ok(self.update_config(&update))
    }

    /// Composite the dye into an offscreen target of the given size and read it back.
    pub fn render_to(&mut self, width: u32, height: u32) -> Option<FieldSnapshot> {
        let res = self.resources.as_mut()?;
        let spec = FieldSpec {
            format: res.caps.rgba,
            filter: res.caps.advected_filter(),
        };
        let target = create_field(&mut res.ctx, width, height, spec);
        res.renderer
            .render(&mut res.ctx, &self.config, res.fields.dye.read(), Some(&target));
        let snapshot = FieldSnapshot {
            width: target.width(),
            height: target.height(),
            texels: res.ctx.read_texels(target.target()),
        };
        release_field(&mut res.ctx, target);
        Some(snapshot)
    }

    pub fn snapshot(&mut self, kind: FieldKind) -> Option<FieldSnapshot> {
        let res = self.resources.as_mut()?;
        let field = res.fields.field(kind);
        let (width, height) = field.size();
        let target = field.target();
        Some(FieldSnapshot {
            width,
            height,
            texels: res.ctx.read_texels(target),
        })
    }

    /// The drawing buffer as last rendered.
    pub fn read_surface(&mut self) -> Option<FieldSnapshot> {
        let res = self.resources.as_mut()?;
        let (width, height) = res.ctx.drawing_buffer_size();
        Some(FieldSnapshot {
            width,
            height,
            texels: res.ctx.read_texels(RenderTarget::Surface),
        })
    }

    /// Stop the loop, drop listeners and free every GPU resource. Safe to call twice.
    pub fn destroy(&mut self) {
        self.stop();
        self.detach();
        if let Some(mut res) = self.resources.take() {
            res.programs.release(&mut res.ctx);
            res.renderer.release(&mut res.ctx);
            res.fields.release(&mut res.ctx);
            log::info!("splash cursor destroyed");
        }
    }
}

impl<S: DrawingSurface, F: FrameScheduler> Drop for SplashCursor<S, F> {
    fn drop(&mut self) {
        self.destroy();
    }
}
