//! Browser host: a canvas-backed surface, `requestAnimationFrame` scheduling
//! and window listeners, exported through wasm-bindgen.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use wasm_bindgen::prelude::*;
use wasm_bindgen::{Clamped, JsCast};
use web_sys::{CanvasRenderingContext2d, Event, HtmlCanvasElement, ImageData, MouseEvent, TouchEvent, TouchList, Window};

use crate::config::{ConfigUpdate, SOFTWARE_DYE_RESOLUTION, SimulationConfig};
use crate::context::{ContextTier, DrawingSurface};
use crate::cursor::SplashCursor;
use crate::driver::{FrameHandle, FrameScheduler};
use crate::events::{EventKind, EventSource, ListenerToken, PointerEvent, Touch};
use crate::export::{ImageExporter, to_rgba8};
use crate::software::{SoftwareContext, SoftwareProfile};

type WebCursor = SplashCursor<CanvasSurface, AnimationFrames>;

#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Info).is_err() {
        log::debug!("logger already installed");
    }
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

pub struct CanvasSurface {
    window: Window,
    canvas: HtmlCanvasElement,
}

impl CanvasSurface {
    pub fn new(window: Window, canvas: HtmlCanvasElement) -> Self {
        Self { window, canvas }
    }
}

/// Copy the drawing buffer onto the canvas, resizing its backing store first.
fn present(cursor: &mut WebCursor) -> Result<(), JsValue> {
    let canvas = cursor.surface().canvas.clone();
    let Some(snapshot) = cursor.read_surface() else {
        return Ok(());
    };
    if canvas.width() != snapshot.width || canvas.height() != snapshot.height {
        canvas.set_width(snapshot.width);
        canvas.set_height(snapshot.height);
    }
    let context = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("canvas has no 2d context"))?
        .dyn_into::<CanvasRenderingContext2d>()?;
    let pixels = to_rgba8(&snapshot);
    let image = ImageData::new_with_u8_clamped_array_and_sh(Clamped(pixels.as_raw().as_slice()), snapshot.width, snapshot.height)?;
    context.put_image_data(&image, 0.0, 0.0)
}

impl DrawingSurface for CanvasSurface {
    type Context = SoftwareContext;

    fn client_size(&self) -> (f32, f32) {
        (self.canvas.client_width() as f32, self.canvas.client_height() as f32)
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.window.device_pixel_ratio() as f32
    }

    fn acquire_context(&mut self, tier: ContextTier) -> Option<SoftwareContext> {
        Some(SoftwareContext::new(tier, SoftwareProfile::default()))
    }
}

/// Schedules frames with `window.requestAnimationFrame`.
pub struct AnimationFrames {
    window: Window,
    callback: Option<Closure<dyn FnMut(f64)>>,
}

impl AnimationFrames {
    fn new(window: Window) -> Self {
        Self { window, callback: None }
    }
}

impl FrameScheduler for AnimationFrames {
    fn request_frame(&mut self) -> FrameHandle {
        let Some(callback) = &self.callback else {
            log::warn!("frame requested before the callback was installed");
            return FrameHandle(0);
        };
        match self.window.request_animation_frame(callback.as_ref().unchecked_ref()) {
            Ok(id) => FrameHandle(id as u64),
            Err(err) => {
                log::error!("requestAnimationFrame failed: {:?}", err);
                FrameHandle(0)
            }
        }
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if let Err(err) = self.window.cancel_animation_frame(handle.0 as i32) {
            log::warn!("cancelAnimationFrame failed: {:?}", err);
        }
    }
}

fn touches(list: TouchList) -> Vec<Touch> {
    (0..list.length())
        .filter_map(|i| list.get(i))
        .map(|touch| Touch {
            id: touch.identifier() as i64,
            x: touch.client_x() as f32,
            y: touch.client_y() as f32,
        })
        .collect()
}

fn to_pointer_event(kind: EventKind, event: &Event) -> Option<PointerEvent> {
    match kind {
        EventKind::MouseDown | EventKind::MouseMove => {
            let mouse = event.dyn_ref::<MouseEvent>()?;
            let (x, y) = (mouse.client_x() as f32, mouse.client_y() as f32);
            Some(if kind == EventKind::MouseDown {
                PointerEvent::MouseDown { x, y }
            } else {
                PointerEvent::MouseMove { x, y }
            })
        }
        EventKind::MouseUp => Some(PointerEvent::MouseUp),
        EventKind::TouchStart => Some(PointerEvent::TouchStart(touches(event.dyn_ref::<TouchEvent>()?.target_touches()))),
        EventKind::TouchMove => Some(PointerEvent::TouchMove(touches(event.dyn_ref::<TouchEvent>()?.target_touches()))),
        EventKind::TouchEnd => Some(PointerEvent::TouchEnd(touches(event.dyn_ref::<TouchEvent>()?.changed_touches()))),
    }
}

/// Window listeners forwarding DOM events to a cursor.
struct WindowEvents {
    window: Window,
    target: Weak<RefCell<WebCursor>>,
    closures: HashMap<u64, (EventKind, Closure<dyn FnMut(Event)>)>,
    next: u64,
}

impl EventSource for WindowEvents {
    fn add_listener(&mut self, kind: EventKind) -> ListenerToken {
        let target = self.target.clone();
        let closure = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let (Some(shared), Some(pointer)) = (target.upgrade(), to_pointer_event(kind, &event)) else {
                return;
            };
            if let Ok(mut cursor) = shared.try_borrow_mut() {
                cursor.handle_event(&pointer);
            }
        });
        if let Err(err) = self
            .window
            .add_event_listener_with_callback(kind.name(), closure.as_ref().unchecked_ref())
        {
            log::error!("could not listen for {}: {:?}", kind.name(), err);
        }

        self.next += 1;
        self.closures.insert(self.next, (kind, closure));
        ListenerToken(self.next)
    }

    fn remove_listener(&mut self, token: ListenerToken) {
        let Some((kind, closure)) = self.closures.remove(&token.0) else {
            return;
        };
        if let Err(err) = self
            .window
            .remove_event_listener_with_callback(kind.name(), closure.as_ref().unchecked_ref())
        {
            log::warn!("could not remove {} listener: {:?}", kind.name(), err);
        }
    }
}

#[wasm_bindgen]
pub struct WebSplashCursor {
    inner: Rc<RefCell<WebCursor>>,
}

#[wasm_bindgen]
impl WebSplashCursor {
    /// Mount on `canvas`. `config` is an optional JSON object of options.
    #[wasm_bindgen(constructor)]
    pub fn new(canvas: HtmlCanvasElement, config: Option<String>) -> Result<WebSplashCursor, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let mut initial = SimulationConfig::default();
        if let Some(json) = config.as_deref() {
            initial.apply(&ConfigUpdate::from_json(json).map_err(js_error)?);
        }
        initial.restrict_to_software();

        let surface = CanvasSurface::new(window.clone(), canvas);
        let cursor = SplashCursor::new(surface, AnimationFrames::new(window.clone()), initial).map_err(js_error)?;
        let inner = Rc::new(RefCell::new(cursor));

        let weak = Rc::downgrade(&inner);
        let frame = Closure::<dyn FnMut(f64)>::new(move |timestamp: f64| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let Ok(mut cursor) = shared.try_borrow_mut() else {
                return;
            };
            cursor.tick(Duration::from_secs_f64(timestamp.max(0.0) / 1000.0));
            if let Err(err) = present(&mut cursor) {
                log::error!("present failed: {:?}", err);
            }
        });

        {
            let mut cursor = inner.borrow_mut();
            cursor.scheduler_mut().callback = Some(frame);
            cursor.attach(WindowEvents {
                window,
                target: Rc::downgrade(&inner),
                closures: HashMap::new(),
                next: 0,
            });
        }
        Ok(WebSplashCursor { inner })
    }

    /// Merge a JSON object of options into the live configuration.
    pub fn update_config(&self, json: &str) -> Result<(), JsValue> {
        let mut update = ConfigUpdate::from_json(json).map_err(js_error)?;
        update.dye_resolution = update.dye_resolution.map(|dye| dye.min(SOFTWARE_DYE_RESOLUTION));
        self.inner.borrow_mut().update_config(&update);
        Ok(())
    }

    pub fn start(&self) -> bool {
        self.inner.borrow_mut().start()
    }

    pub fn stop(&self) -> bool {
        self.inner.borrow_mut().stop()
    }

    pub fn is_running(&self) -> bool {
        self.inner.borrow().is_running()
    }

    pub fn snapshot_data_url(&self) -> Result<String, JsValue> {
        let snapshot = self
            .inner
            .borrow_mut()
            .read_surface()
            .ok_or_else(|| JsValue::from_str("cursor destroyed"))?;
        ImageExporter::new().data_url(&snapshot).map_err(js_error)
    }

    pub fn destroy(&self) {
        self.inner.borrow_mut().destroy();
    }
}
