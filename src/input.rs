//! Pointer state: host events in, normalized texture-space motion out.

use glam::{Vec2, Vec3};
use rand::Rng;

use crate::context::scale_by_pixel_ratio;
use crate::events::{PointerEvent, Touch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerId {
    Mouse,
    Touch(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pointer {
    pub id: PointerId,
    /// Position in `[0, 1]²`, y up.
    pub texcoord: Vec2,
    pub prev_texcoord: Vec2,
    /// Aspect-corrected motion since the previous event.
    pub delta: Vec2,
    pub down: bool,
    pub moved: bool,
    pub color: Vec3,
}

impl Pointer {
    pub fn new(id: PointerId) -> Self {
        Self {
            id,
            texcoord: Vec2::ZERO,
            prev_texcoord: Vec2::ZERO,
            delta: Vec2::ZERO,
            down: false,
            moved: false,
            color: Vec3::ZERO,
        }
    }
}

/// Device-pixel position to texture coordinates (origin bottom-left).
pub fn texcoord(position: Vec2, surface: (u32, u32)) -> Vec2 {
    let (width, height) = (surface.0.max(1) as f32, surface.1.max(1) as f32);
    Vec2::new(position.x / width, 1.0 - position.y / height)
}

pub fn aspect_ratio(surface: (u32, u32)) -> f32 {
    surface.0.max(1) as f32 / surface.1.max(1) as f32
}

/// Scale a texcoord delta so equal on-screen motion gives equal force on both axes.
pub fn correct_delta(delta: Vec2, aspect_ratio: f32) -> Vec2 {
    let mut delta = delta;
    if aspect_ratio < 1.0 {
        delta.x *= aspect_ratio;
    }
    if aspect_ratio > 1.0 {
        delta.y /= aspect_ratio;
    }
    delta
}

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Vec3 {
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    match (i as i32).rem_euclid(6) {
        0 => Vec3::new(v, t, p),
        1 => Vec3::new(q, v, p),
        2 => Vec3::new(p, v, t),
        3 => Vec3::new(p, q, v),
        4 => Vec3::new(t, p, v),
        _ => Vec3::new(v, p, q),
    }
}

/// A random fully saturated hue, dimmed to 15%.
pub fn generate_color<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    hsv_to_rgb(rng.gen_range(0.0..1.0), 1.0, 1.0) * 0.15
}

/// All pointers seen so far plus the click splats waiting for the next frame.
#[derive(Debug, Clone)]
pub struct PointerTracker {
    pointers: Vec<Pointer>,
    clicks: Vec<Vec2>,
    first_mouse_move: bool,
    first_touch_start: bool,
    started: bool,
}

impl Default for PointerTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerTracker {
    pub fn new() -> Self {
        Self {
            pointers: vec![Pointer::new(PointerId::Mouse)],
            clicks: Vec::new(),
            first_mouse_move: true,
            first_touch_start: true,
            started: false,
        }
    }

    pub fn pointers(&self) -> &[Pointer] {
        &self.pointers
    }

    pub fn pointer(&self, id: PointerId) -> Option<&Pointer> {
        self.pointers.iter().find(|p| p.id == id)
    }

    fn pointer_mut(&mut self, id: PointerId) -> Option<&mut Pointer> {
        self.pointers.iter_mut().find(|p| p.id == id)
    }

    fn pointer_entry(&mut self, id: PointerId) -> &mut Pointer {
        match self.pointers.iter().position(|p| p.id == id) {
            Some(index) => &mut self.pointers[index],
            None => {
                self.pointers.push(Pointer::new(id));
                let last = self.pointers.len() - 1;
                &mut self.pointers[last]
            }
        }
    }

    pub fn pointer_down(&mut self, id: PointerId, position: Vec2, surface: (u32, u32), color: Vec3) {
        let pointer = self.pointer_entry(id);
        pointer.down = true;
        pointer.moved = false;
        pointer.texcoord = texcoord(position, surface);
        pointer.prev_texcoord = pointer.texcoord;
        pointer.delta = Vec2::ZERO;
        pointer.color = color;
    }

    /// Returns `false` for a pointer that was never seen.
    pub fn pointer_move(&mut self, id: PointerId, position: Vec2, surface: (u32, u32), color: Option<Vec3>) -> bool {
        let Some(pointer) = self.pointer_mut(id) else {
            return false;
        };
        pointer.prev_texcoord = pointer.texcoord;
        pointer.texcoord = texcoord(position, surface);
        pointer.delta = correct_delta(pointer.texcoord - pointer.prev_texcoord, aspect_ratio(surface));
        pointer.moved = pointer.delta.x.abs() > 0.0 || pointer.delta.y.abs() > 0.0;
        if let Some(color) = color {
            pointer.color = color;
        }
        true
    }

    pub fn pointer_up(&mut self, id: PointerId) {
        if let Some(pointer) = self.pointer_mut(id) {
            pointer.down = false;
        }
    }

    pub fn queue_click(&mut self, point: Vec2) {
        self.clicks.push(point);
    }

    pub fn pending_clicks(&self) -> &[Vec2] {
        &self.clicks
    }

    pub fn take_clicks(&mut self) -> Vec<Vec2> {
        std::mem::take(&mut self.clicks)
    }

    /// Pointers that moved since the last call, with their `moved` flag reset.
    pub fn take_moved(&mut self) -> Vec<Pointer> {
        self.pointers
            .iter_mut()
            .filter(|p| p.moved)
            .map(|p| {
                p.moved = false;
                p.clone()
            })
            .collect()
    }

    pub fn recolor<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for pointer in &mut self.pointers {
            pointer.color = generate_color(rng);
        }
    }

    /// Apply one host event. `surface` is the drawing-buffer size in device
    /// pixels. Returns `true` when this is the first interaction that
    /// should start the frame loop.
    pub fn handle_event<R: Rng + ?Sized>(
        &mut self,
        event: &PointerEvent,
        pixel_ratio: f32,
        surface: (u32, u32),
        rng: &mut R,
    ) -> bool {
        let scale = |x: f32, y: f32| {
            Vec2::new(
                scale_by_pixel_ratio(x, pixel_ratio) as f32,
                scale_by_pixel_ratio(y, pixel_ratio) as f32,
            )
        };

        let starts = match event {
            PointerEvent::MouseDown { x, y } => {
                let position = scale(*x, *y);
                let color = generate_color(rng);
                self.pointer_down(PointerId::Mouse, position, surface, color);
                self.queue_click(texcoord(position, surface));
                true
            }
            PointerEvent::MouseMove { x, y } => {
                let first = std::mem::replace(&mut self.first_mouse_move, false);
                let color = first.then(|| generate_color(rng));
                self.pointer_move(PointerId::Mouse, scale(*x, *y), surface, color);
                first
            }
            PointerEvent::MouseUp => {
                self.pointer_up(PointerId::Mouse);
                false
            }
            PointerEvent::TouchStart(touches) => {
                for &Touch { id, x, y } in touches {
                    let color = generate_color(rng);
                    self.pointer_down(PointerId::Touch(id), scale(x, y), surface, color);
                    if std::mem::replace(&mut self.first_touch_start, false) {
                        let point = texcoord(scale(x, y), surface);
                        self.queue_click(point);
                    }
                }
                true
            }
            PointerEvent::TouchMove(touches) => {
                for &Touch { id, x, y } in touches {
                    self.pointer_move(PointerId::Touch(id), scale(x, y), surface, None);
                }
                false
            }
            PointerEvent::TouchEnd(touches) => {
                for touch in touches {
                    self.pointer_up(PointerId::Touch(touch.id));
                }
                false
            }
        };

        starts && !std::mem::replace(&mut self.started, true)
    }
}
