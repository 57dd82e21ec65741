use glam::{Vec2, Vec3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use splash_fluid::events::{EventKind, Listeners};
use splash_fluid::input::{
    Pointer, PointerId, PointerTracker, aspect_ratio, correct_delta, generate_color, hsv_to_rgb, texcoord,
};
use splash_fluid::splat::{click_splat, pointer_splat};
use splash_fluid::{EventSource, PointerEvent};

#[test]
fn test_texcoord_origin_is_bottom_left() {
    assert_eq!(texcoord(Vec2::new(0.0, 100.0), (200, 100)), Vec2::new(0.0, 0.0));
    assert_eq!(texcoord(Vec2::new(100.0, 25.0), (200, 100)), Vec2::new(0.5, 0.75));
    assert_eq!(aspect_ratio((200, 100)), 2.0);
}

#[test]
fn test_delta_correction_by_orientation() {
    let delta = Vec2::new(0.2, 0.2);
    assert_eq!(correct_delta(delta, 1.0), delta);
    assert_eq!(correct_delta(delta, 2.0), Vec2::new(0.2, 0.1));
    assert_eq!(correct_delta(delta, 0.5), Vec2::new(0.1, 0.2));
}

#[test]
fn test_hsv_primaries() {
    assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Vec3::new(1.0, 0.0, 0.0));
    assert!((hsv_to_rgb(1.0 / 3.0, 1.0, 1.0) - Vec3::new(0.0, 1.0, 0.0)).abs().max_element() < 1e-5);
    assert!((hsv_to_rgb(2.0 / 3.0, 1.0, 1.0) - Vec3::new(0.0, 0.0, 1.0)).abs().max_element() < 1e-5);
    assert_eq!(hsv_to_rgb(0.3, 0.0, 0.5), Vec3::splat(0.5));
}

#[test]
fn test_generated_colors_are_dim_and_saturated() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..50 {
        let color = generate_color(&mut rng);
        assert!((color.max_element() - 0.15).abs() < 1e-5);
        assert!(color.min_element().abs() < 1e-5);
    }
}

#[test]
fn test_click_splat_is_bright_with_bounded_push() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..50 {
        let splat = click_splat(&mut rng, Vec2::new(0.3, 0.6));
        assert_eq!(splat.point, Vec2::new(0.3, 0.6));
        assert!((splat.color.max_element() - 1.5).abs() < 1e-4);
        assert!(splat.force.x.abs() <= 5.0);
        assert!(splat.force.y.abs() <= 15.0);
    }
}

#[test]
fn test_pointer_splat_scales_delta() {
    let mut pointer = Pointer::new(PointerId::Mouse);
    pointer.texcoord = Vec2::new(0.4, 0.4);
    pointer.delta = Vec2::new(0.01, -0.02);
    pointer.color = Vec3::new(0.15, 0.0, 0.0);
    let splat = pointer_splat(&pointer, 6000.0);
    assert_eq!(splat.point, pointer.texcoord);
    assert!((splat.force - Vec2::new(60.0, -120.0)).length() < 1e-3);
    assert_eq!(splat.color, pointer.color);
}

#[test]
fn test_tracker_reports_first_interaction_once() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut tracker = PointerTracker::new();
    let surface = (100, 100);

    assert!(tracker.handle_event(&PointerEvent::MouseMove { x: 10.0, y: 10.0 }, 1.0, surface, &mut rng));
    let color = tracker.pointer(PointerId::Mouse).expect("mouse").color;
    assert_ne!(color, Vec3::ZERO, "First move assigns a color");

    assert!(!tracker.handle_event(&PointerEvent::MouseMove { x: 20.0, y: 10.0 }, 1.0, surface, &mut rng));
    assert_eq!(tracker.pointer(PointerId::Mouse).expect("mouse").color, color, "Later moves keep it");
    assert!(!tracker.handle_event(&PointerEvent::MouseDown { x: 20.0, y: 10.0 }, 1.0, surface, &mut rng));
    let clicks = tracker.take_clicks();
    assert_eq!(clicks.len(), 1);
    assert!((clicks[0] - Vec2::new(0.2, 0.9)).length() < 1e-6);
    assert!(tracker.pending_clicks().is_empty());
}

#[test]
fn test_take_moved_resets_flags() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut tracker = PointerTracker::new();
    tracker.handle_event(&PointerEvent::MouseDown { x: 10.0, y: 10.0 }, 1.0, (100, 100), &mut rng);
    tracker.handle_event(&PointerEvent::MouseMove { x: 15.0, y: 10.0 }, 1.0, (100, 100), &mut rng);

    let moved = tracker.take_moved();
    assert_eq!(moved.len(), 1);
    assert!(moved[0].delta.x > 0.0);
    assert!(tracker.take_moved().is_empty());

    // Same position again: no motion, no splat
    tracker.handle_event(&PointerEvent::MouseMove { x: 15.0, y: 10.0 }, 1.0, (100, 100), &mut rng);
    assert!(tracker.take_moved().is_empty());
}

#[test]
fn test_moves_for_unknown_touches_are_ignored() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut tracker = PointerTracker::new();
    let event = PointerEvent::TouchMove(vec![splash_fluid::Touch { id: 4, x: 1.0, y: 1.0 }]);
    assert!(!tracker.handle_event(&event, 1.0, (10, 10), &mut rng));
    assert!(tracker.pointer(PointerId::Touch(4)).is_none());
    assert_eq!(tracker.pointers().len(), 1);
}

#[test]
fn test_recolor_changes_every_pointer() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut tracker = PointerTracker::new();
    let before = tracker.pointer(PointerId::Mouse).expect("mouse").color;
    tracker.recolor(&mut rng);
    assert_ne!(tracker.pointer(PointerId::Mouse).expect("mouse").color, before);
}

#[test]
fn test_event_names() {
    let names: Vec<&str> = EventKind::ALL.iter().map(|kind| kind.name()).collect();
    assert_eq!(names, ["mousedown", "mousemove", "mouseup", "touchstart", "touchmove", "touchend"]);
    assert_eq!(PointerEvent::MouseUp.kind(), EventKind::MouseUp);
    assert_eq!(PointerEvent::TouchEnd(Vec::new()).kind(), EventKind::TouchEnd);
}

struct Counter {
    live: usize,
}

impl EventSource for Counter {
    fn add_listener(&mut self, _kind: EventKind) -> splash_fluid::events::ListenerToken {
        self.live += 1;
        splash_fluid::events::ListenerToken(self.live as u64)
    }

    fn remove_listener(&mut self, _token: splash_fluid::events::ListenerToken) {
        self.live -= 1;
    }
}

#[test]
fn test_listeners_register_and_unregister_all_kinds() {
    let mut source = Counter { live: 0 };
    let mut listeners = Listeners::default();
    listeners.register_all(&mut source);
    assert_eq!(source.live, 6);
    assert_eq!(listeners.tokens().count(), 6);

    listeners.unregister_all(&mut source);
    assert_eq!(source.live, 0);
    assert!(listeners.is_empty());
}
