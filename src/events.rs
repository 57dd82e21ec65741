//! Host input events and the listener registrations a cursor owns.

/// The host event kinds a cursor listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MouseDown,
    MouseMove,
    MouseUp,
    TouchStart,
    TouchMove,
    TouchEnd,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::MouseDown,
        EventKind::MouseMove,
        EventKind::MouseUp,
        EventKind::TouchStart,
        EventKind::TouchMove,
        EventKind::TouchEnd,
    ];

    /// DOM event name.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::MouseDown => "mousedown",
            EventKind::MouseMove => "mousemove",
            EventKind::MouseUp => "mouseup",
            EventKind::TouchStart => "touchstart",
            EventKind::TouchMove => "touchmove",
            EventKind::TouchEnd => "touchend",
        }
    }
}

/// One touch point in client (CSS) pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touch {
    pub id: i64,
    pub x: f32,
    pub y: f32,
}

/// Pointer input in client (CSS) pixels, before device pixel ratio scaling.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    MouseDown { x: f32, y: f32 },
    MouseMove { x: f32, y: f32 },
    MouseUp,
    /// Touches that are on the target.
    TouchStart(Vec<Touch>),
    TouchMove(Vec<Touch>),
    /// Touches that were lifted.
    TouchEnd(Vec<Touch>),
}

impl PointerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PointerEvent::MouseDown { .. } => EventKind::MouseDown,
            PointerEvent::MouseMove { .. } => EventKind::MouseMove,
            PointerEvent::MouseUp => EventKind::MouseUp,
            PointerEvent::TouchStart(_) => EventKind::TouchStart,
            PointerEvent::TouchMove(_) => EventKind::TouchMove,
            PointerEvent::TouchEnd(_) => EventKind::TouchEnd,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(pub u64);

/// Something listeners can be registered on (a window, a test harness).
pub trait EventSource {
    fn add_listener(&mut self, kind: EventKind) -> ListenerToken;
    fn remove_listener(&mut self, token: ListenerToken);
}

/// Every registration made on behalf of one cursor.
#[derive(Debug, Default)]
pub struct Listeners {
    tokens: Vec<(EventKind, ListenerToken)>,
}

impl Listeners {
    pub fn register_all<E: EventSource + ?Sized>(&mut self, source: &mut E) {
        for kind in EventKind::ALL {
            let token = source.add_listener(kind);
            self.tokens.push((kind, token));
        }
    }

    pub fn unregister_all<E: EventSource + ?Sized>(&mut self, source: &mut E) {
        for (_, token) in self.tokens.drain(..) {
            source.remove_listener(token);
        }
    }

    pub fn tokens(&self) -> impl Iterator<Item = (EventKind, ListenerToken)> + '_ {
        self.tokens.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
