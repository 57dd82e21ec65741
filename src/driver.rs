//! Frame scheduling and the per-loop timing state.

use std::time::Duration;

use crate::stepper::{MAX_DT, clamp_dt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Host facility that calls back once per display refresh.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameHandle;
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// In-process scheduler: requests queue up until the host fires them.
#[derive(Debug, Default)]
pub struct QueuedScheduler {
    pending: Vec<FrameHandle>,
    next: u64,
}

impl QueuedScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Hand every outstanding request to the caller; the host ticks once
    /// per returned handle.
    pub fn fire(&mut self) -> Vec<FrameHandle> {
        std::mem::take(&mut self.pending)
    }
}

impl FrameScheduler for QueuedScheduler {
    fn request_frame(&mut self) -> FrameHandle {
        self.next += 1;
        let handle = FrameHandle(self.next);
        self.pending.push(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.pending.retain(|pending| *pending != handle);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Stopped,
    /// `pending` is `None` while the fired frame is being processed.
    Running { pending: Option<FrameHandle> },
}

/// `value` folded into `[min, max)`; a zero-width range yields `min`.
pub fn wrap(value: f32, min: f32, max: f32) -> f32 {
    let range = max - min;
    if range == 0.0 {
        return min;
    }
    (value - min) % range + min
}

#[derive(Debug, Clone)]
pub struct FrameDriver {
    state: DriverState,
    last_tick: Option<Duration>,
    color_timer: f32,
}

impl Default for FrameDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDriver {
    pub fn new() -> Self {
        Self {
            state: DriverState::Stopped,
            last_tick: None,
            color_timer: 0.0,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, DriverState::Running { .. })
    }

    /// Returns `false` if the loop was already running.
    pub fn start<F: FrameScheduler + ?Sized>(&mut self, scheduler: &mut F) -> bool {
        if self.is_running() {
            return false;
        }
        self.state = DriverState::Running {
            pending: Some(scheduler.request_frame()),
        };
        true
    }

    /// Returns `false` if the loop was already stopped.
    pub fn stop<F: FrameScheduler + ?Sized>(&mut self, scheduler: &mut F) -> bool {
        match std::mem::replace(&mut self.state, DriverState::Stopped) {
            DriverState::Stopped => false,
            DriverState::Running { pending } => {
                if let Some(handle) = pending {
                    scheduler.cancel_frame(handle);
                }
                true
            }
        }
    }

    /// Begin a frame at `now` and return its time step. A request the host
    /// has not dispatched yet is cancelled; this frame replaces it.
    pub fn begin_frame<F: FrameScheduler + ?Sized>(&mut self, scheduler: &mut F, now: Duration) -> f32 {
        if let DriverState::Running { pending } = &mut self.state {
            if let Some(handle) = pending.take() {
                scheduler.cancel_frame(handle);
            }
        }
        let dt = match self.last_tick {
            Some(last) => clamp_dt(now.saturating_sub(last).as_secs_f32()),
            None => MAX_DT,
        };
        self.last_tick = Some(now);
        dt
    }

    /// Schedule the next frame if the loop is still running.
    pub fn end_frame<F: FrameScheduler + ?Sized>(&mut self, scheduler: &mut F) {
        if let DriverState::Running { pending } = &mut self.state {
            if pending.is_none() {
                *pending = Some(scheduler.request_frame());
            }
        }
    }

    /// Advance the color timer; `true` when pointer colors should be regenerated.
    pub fn advance_color_timer(&mut self, dt: f32, speed: f32) -> bool {
        self.color_timer += dt * speed;
        if self.color_timer >= 1.0 {
            self.color_timer = wrap(self.color_timer, 0.0, 1.0);
            return true;
        }
        false
    }

    pub fn color_timer(&self) -> f32 {
        self.color_timer
    }
}
