use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use glam::{Vec2, Vec4};
use splash_fluid::analysis::is_blank;
use splash_fluid::context::Channels;
use splash_fluid::events::ListenerToken;
use splash_fluid::input::PointerId;
use splash_fluid::program::ShaderKind;
use splash_fluid::stepper::MAX_DT;
use splash_fluid::{
    Error, EventKind, EventSource, FieldKind, PointerEvent, QueuedScheduler, SimulationConfig, SoftwareProfile,
    SoftwareSurface, SplashCursor, Touch,
};

type Cursor = SplashCursor<SoftwareSurface, QueuedScheduler>;

fn small_config() -> SimulationConfig {
    SimulationConfig {
        sim_resolution: 32,
        dye_resolution: 64,
        ..SimulationConfig::default()
    }
}

fn cursor(width: f32, height: f32, config: SimulationConfig) -> Cursor {
    match SplashCursor::new(SoftwareSurface::new(width, height), QueuedScheduler::new(), config) {
        Ok(cursor) => cursor.with_seed(42),
        Err(err) => panic!("cursor creation failed: {}", err),
    }
}

fn frame(n: u32) -> Duration {
    Duration::from_secs_f32(MAX_DT * n as f32)
}

fn brightest_texcoord(cursor: &mut Cursor, kind: FieldKind) -> (Vec2, f32) {
    let snapshot = cursor.snapshot(kind).expect("live cursor");
    let mut best = (Vec2::ZERO, f32::MIN);
    for y in 0..snapshot.height {
        for x in 0..snapshot.width {
            let texel = snapshot.texel(x, y);
            let value = texel.x.abs() + texel.y.abs() + texel.z.abs();
            if value > best.1 {
                let uv = Vec2::new(
                    (x as f32 + 0.5) / snapshot.width as f32,
                    (y as f32 + 0.5) / snapshot.height as f32,
                );
                best = (uv, value);
            }
        }
    }
    best
}

#[test]
fn test_click_splat_lands_at_pointer() {
    let mut cursor = cursor(100.0, 100.0, SimulationConfig::default());
    assert!(!cursor.is_running());

    cursor.handle_event(&PointerEvent::MouseDown { x: 50.0, y: 50.0 });

    let pointer = cursor.pointers().pointer(PointerId::Mouse).expect("mouse pointer").clone();
    assert!(pointer.down);
    assert!(!pointer.moved);
    assert_eq!(pointer.texcoord, Vec2::new(0.5, 0.5));
    assert_eq!(cursor.pointers().pending_clicks(), &[Vec2::new(0.5, 0.5)]);
    assert!(cursor.is_running(), "First mouse down should start the loop");

    cursor.scheduler_mut().fire();
    cursor.tick(frame(1));
    assert!(cursor.pointers().pending_clicks().is_empty(), "Clicks are consumed by the frame");

    let (dye_at, dye_peak) = brightest_texcoord(&mut cursor, FieldKind::Dye);
    assert!(dye_peak > 0.5, "Click should inject bright dye, got {}", dye_peak);
    assert!((dye_at - Vec2::new(0.5, 0.5)).length() < 0.02, "Dye peak at {:?}", dye_at);

    let (velocity_at, velocity_peak) = brightest_texcoord(&mut cursor, FieldKind::Velocity);
    assert!(velocity_peak > 0.0);
    assert!((velocity_at - Vec2::new(0.5, 0.5)).length() < 0.1, "Velocity peak at {:?}", velocity_at);
}

#[test]
fn test_drag_marks_pointer_moved_until_next_frame() {
    let mut cursor = cursor(100.0, 100.0, small_config());
    cursor.handle_event(&PointerEvent::MouseDown { x: 20.0, y: 80.0 });
    cursor.handle_event(&PointerEvent::MouseMove { x: 25.0, y: 80.0 });

    let pointer = cursor.pointers().pointer(PointerId::Mouse).expect("mouse pointer").clone();
    assert!((pointer.texcoord - Vec2::new(0.25, 0.2)).length() < 1e-6);
    assert!(pointer.delta.x > 0.0);
    assert_eq!(pointer.delta.y, 0.0);
    assert!(pointer.moved);

    cursor.scheduler_mut().fire();
    cursor.tick(frame(1));
    let pointer = cursor.pointers().pointer(PointerId::Mouse).expect("mouse pointer");
    assert!(!pointer.moved, "The frame should consume the move");
    assert!(pointer.down);

    let dye = cursor.snapshot(FieldKind::Dye).expect("live cursor");
    assert!(!is_blank(&dye, 1e-4));
}

#[test]
fn test_first_move_starts_loop_and_later_input_does_not_restart_it() {
    let mut cursor = cursor(100.0, 100.0, small_config());
    cursor.handle_event(&PointerEvent::MouseMove { x: 10.0, y: 10.0 });
    assert!(cursor.is_running());
    assert_eq!(cursor.scheduler().pending_count(), 1);

    cursor.stop();
    cursor.handle_event(&PointerEvent::MouseDown { x: 30.0, y: 30.0 });
    cursor.handle_event(&PointerEvent::TouchStart(vec![Touch { id: 1, x: 5.0, y: 5.0 }]));
    assert!(!cursor.is_running(), "Auto-start happens once per session");
}

#[test]
fn test_touches_are_tracked_per_identity() {
    let mut cursor = cursor(100.0, 100.0, small_config());
    cursor.handle_event(&PointerEvent::TouchStart(vec![
        Touch { id: 7, x: 10.0, y: 10.0 },
        Touch { id: 9, x: 90.0, y: 90.0 },
    ]));
    assert!(cursor.is_running());
    assert_eq!(cursor.pointers().pending_clicks().len(), 1, "Only the first touch queues a click");

    cursor.handle_event(&PointerEvent::TouchMove(vec![Touch { id: 9, x: 80.0, y: 90.0 }]));
    let first = cursor.pointers().pointer(PointerId::Touch(7)).expect("touch 7");
    let second = cursor.pointers().pointer(PointerId::Touch(9)).expect("touch 9");
    assert!(!first.moved);
    assert!(second.moved);
    assert!(second.delta.x < 0.0);

    cursor.handle_event(&PointerEvent::TouchEnd(vec![Touch { id: 7, x: 10.0, y: 10.0 }]));
    assert!(!cursor.pointers().pointer(PointerId::Touch(7)).expect("touch 7").down);
    assert!(cursor.pointers().pointer(PointerId::Touch(9)).expect("touch 9").down);

    cursor.handle_event(&PointerEvent::TouchStart(vec![Touch { id: 11, x: 50.0, y: 50.0 }]));
    assert_eq!(cursor.pointers().pending_clicks().len(), 1);
}

#[test]
fn test_device_pixel_ratio_scales_input() {
    let surface = SoftwareSurface::new(100.0, 100.0).with_pixel_ratio(2.0);
    let mut cursor = match SplashCursor::new(surface, QueuedScheduler::new(), small_config()) {
        Ok(cursor) => cursor,
        Err(err) => panic!("{}", err),
    };
    assert_eq!(cursor.context().map(|ctx| splash_fluid::GpuContext::drawing_buffer_size(ctx)), Some((200, 200)));

    cursor.handle_event(&PointerEvent::MouseDown { x: 25.0, y: 75.0 });
    let pointer = cursor.pointers().pointer(PointerId::Mouse).expect("mouse pointer");
    assert!((pointer.texcoord - Vec2::new(0.25, 0.25)).length() < 1e-6);
}

#[test]
fn test_resize_preserves_dye() {
    let config = SimulationConfig {
        paused: true,
        ..small_config()
    };
    let mut cursor = cursor(100.0, 100.0, config);
    cursor.handle_event(&PointerEvent::MouseDown { x: 50.0, y: 50.0 });
    cursor.tick(frame(1));
    let original = cursor.fields().expect("live cursor").dye.size();

    cursor.surface_mut().set_client_size(200.0, 100.0);
    cursor.tick(frame(2));
    let bigger = cursor.fields().expect("live cursor").dye.size();
    assert_ne!(bigger, original, "Wider surface should reallocate the dye");

    cursor.surface_mut().set_client_size(50.0, 80.0);
    cursor.tick(frame(3));
    let smaller = cursor.fields().expect("live cursor").dye.size();
    assert_ne!(smaller, bigger);

    let surface = cursor.read_surface().expect("live cursor");
    assert_eq!((surface.width, surface.height), (50, 80));
    assert!(!is_blank(&surface, 1e-3), "Resizing should carry the dye over");
    assert_eq!(cursor.context().map(|ctx| ctx.texture_count()), Some(8));
}

#[test]
fn test_stop_and_start_are_idempotent() {
    let mut cursor = cursor(64.0, 64.0, small_config());

    assert!(!cursor.stop());
    assert!(!cursor.stop());
    assert!(!cursor.is_running());

    assert!(cursor.start());
    assert!(!cursor.start());
    assert_eq!(cursor.scheduler().pending_count(), 1, "Exactly one tick should be pending");

    assert_eq!(cursor.scheduler_mut().fire().len(), 1);
    cursor.tick(frame(1));
    assert_eq!(cursor.scheduler().pending_count(), 1, "A running loop reschedules itself");

    assert!(cursor.stop());
    assert!(!cursor.stop());
    assert_eq!(cursor.scheduler().pending_count(), 0, "Stopping cancels the pending tick");

    cursor.tick(frame(2));
    assert_eq!(cursor.scheduler().pending_count(), 0, "A stopped loop does not reschedule");
}

#[test]
fn test_host_driven_ticks_keep_one_pending_frame() {
    let mut cursor = cursor(64.0, 64.0, small_config());
    assert!(cursor.start());

    // Ticks the scheduler never dispatched
    for n in 1..=3 {
        cursor.tick(frame(n));
        assert_eq!(cursor.scheduler().pending_count(), 1, "Exactly one tick should be pending");
    }

    assert!(cursor.stop());
    assert_eq!(cursor.scheduler().pending_count(), 0, "Stopping cancels every scheduled tick");
    assert!(cursor.scheduler_mut().fire().is_empty());
}

#[derive(Default)]
struct RecordingSource {
    active: Rc<RefCell<HashSet<u64>>>,
    next: u64,
}

impl EventSource for RecordingSource {
    fn add_listener(&mut self, _kind: EventKind) -> ListenerToken {
        self.next += 1;
        self.active.borrow_mut().insert(self.next);
        ListenerToken(self.next)
    }

    fn remove_listener(&mut self, token: ListenerToken) {
        self.active.borrow_mut().remove(&token.0);
    }
}

#[test]
fn test_destroy_unregisters_every_listener() {
    let active = Rc::new(RefCell::new(HashSet::new()));
    let mut cursor = cursor(64.0, 64.0, small_config());
    cursor.attach(RecordingSource {
        active: Rc::clone(&active),
        next: 0,
    });
    assert_eq!(active.borrow().len(), EventKind::ALL.len());

    cursor.destroy();
    assert!(active.borrow().is_empty(), "Teardown should remove all listeners");
}

#[test]
fn test_reattaching_replaces_previous_source() {
    let first = Rc::new(RefCell::new(HashSet::new()));
    let second = Rc::new(RefCell::new(HashSet::new()));
    let mut cursor = cursor(64.0, 64.0, small_config());
    cursor.attach(RecordingSource {
        active: Rc::clone(&first),
        next: 0,
    });
    cursor.attach(RecordingSource {
        active: Rc::clone(&second),
        next: 100,
    });
    assert!(first.borrow().is_empty());
    assert_eq!(second.borrow().len(), 6);

    drop(cursor);
    assert!(second.borrow().is_empty(), "Dropping the cursor should detach it");
}

#[test]
fn test_destroy_is_idempotent() {
    let mut cursor = cursor(64.0, 64.0, small_config());
    cursor.start();
    cursor.destroy();
    assert!(cursor.is_destroyed());
    assert!(!cursor.is_running());
    assert_eq!(cursor.scheduler().pending_count(), 0);

    cursor.destroy();
    assert!(cursor.is_destroyed());
    assert!(!cursor.start(), "A destroyed cursor cannot start");

    // Everything else is a quiet no-op
    cursor.handle_event(&PointerEvent::MouseDown { x: 1.0, y: 1.0 });
    cursor.tick(frame(1));
    assert!(cursor.read_surface().is_none());
    assert!(cursor.snapshot(FieldKind::Dye).is_none());
}

#[test]
fn test_render_to_releases_its_target() {
    let mut cursor = cursor(64.0, 64.0, small_config());
    let ctx = cursor.context().expect("live cursor");
    assert_eq!(ctx.texture_count(), 8);
    assert!(ctx.program_count() > 0);
    assert_eq!(cursor.render_to(16, 16).map(|s| (s.width, s.height)), Some((16, 16)));
    assert_eq!(cursor.context().map(|ctx| ctx.texture_count()), Some(8));
}

#[test]
fn test_partial_config_update() {
    let mut cursor = cursor(64.0, 64.0, small_config());

    let change = cursor.update_config_json(r#"{"curl": 12.5, "splatForce": 100}"#).expect("valid update");
    assert!(!change.resolution);
    assert!(!change.keywords);
    assert_eq!(cursor.config().curl, 12.5);
    assert_eq!(cursor.config().splat_force, 100.0);
    assert_eq!(cursor.config().sim_resolution, 32, "Unspecified options keep their values");

    let change = cursor.update_config_json(r#"{"simResolution": 16}"#).expect("valid update");
    assert!(change.resolution);
    assert_eq!(cursor.fields().map(|f| f.velocity.size()), Some((16, 16)));

    assert!(matches!(cursor.update_config_json(r#"{"curll": 1}"#), Err(Error::Config(_))));
    assert!(matches!(cursor.update_config_json("not json"), Err(Error::Config(_))));
    assert_eq!(cursor.config().curl, 12.5, "Rejected updates change nothing");
}

#[test]
fn test_shading_toggle_reuses_cached_variants() {
    let mut cursor = cursor(64.0, 64.0, small_config());
    assert_eq!(cursor.display_variants(), 1);

    let change = cursor.update_config_json(r#"{"shading": false}"#).expect("valid update");
    assert!(change.keywords);
    assert_eq!(cursor.display_variants(), 2);

    cursor.update_config_json(r#"{"shading": true}"#).expect("valid update");
    assert_eq!(cursor.display_variants(), 2, "Switching back should hit the cache");
}

#[test]
fn test_opaque_background_is_back_color() {
    let config = SimulationConfig {
        transparent: false,
        paused: true,
        ..small_config()
    };
    let mut cursor = cursor(32.0, 32.0, config);
    cursor.tick(frame(1));
    let surface = cursor.read_surface().expect("live cursor");
    let texel = surface.texel(3, 3);
    assert!((texel - Vec4::new(0.5, 0.0, 0.0, 1.0)).abs().max_element() < 1e-5, "got {:?}", texel);

    cursor.update_config_json(r#"{"transparent": true}"#).expect("valid update");
    cursor.tick(frame(2));
    let surface = cursor.read_surface().expect("live cursor");
    assert!(is_blank(&surface, 1e-6));
}

#[test]
fn test_paused_cursor_still_applies_splats() {
    let config = SimulationConfig {
        paused: true,
        ..small_config()
    };
    let mut cursor = cursor(64.0, 64.0, config);
    cursor.handle_event(&PointerEvent::MouseDown { x: 32.0, y: 32.0 });
    cursor.tick(frame(1));
    let dye = cursor.snapshot(FieldKind::Dye).expect("live cursor");
    let peak = dye.texel(32, 32);
    assert!(peak.x + peak.y + peak.z > 0.5);

    // No advection means no dissipation between frames
    cursor.tick(frame(2));
    assert_eq!(cursor.snapshot(FieldKind::Dye).expect("live cursor").texel(32, 32), peak);
}

#[test]
fn test_missing_context_fails_construction() {
    let surface = SoftwareSurface::with_profile(64.0, 64.0, SoftwareProfile::unavailable());
    let result = SplashCursor::new(surface, QueuedScheduler::new(), SimulationConfig::default());
    assert!(matches!(result, Err(Error::NoContext)));
}

#[test]
fn test_missing_four_channel_format_fails_construction() {
    let profile = SoftwareProfile::default().with_renderable(&[Channels::R, Channels::Rg]);
    let surface = SoftwareSurface::with_profile(64.0, 64.0, profile);
    let result = SplashCursor::new(surface, QueuedScheduler::new(), SimulationConfig::default());
    assert!(matches!(result, Err(Error::NoRenderableFormat(Channels::Rgba))));
}

#[test]
fn test_formats_fall_back_to_wider_channels() {
    let profile = SoftwareProfile::default().with_renderable(&[Channels::Rgba]);
    let surface = SoftwareSurface::with_profile(64.0, 64.0, profile);
    let cursor = match SplashCursor::new(surface, QueuedScheduler::new(), small_config()) {
        Ok(cursor) => cursor,
        Err(err) => panic!("{}", err),
    };
    let caps = cursor.capabilities().expect("live cursor");
    assert_eq!(caps.r.channels, Channels::Rgba);
    assert_eq!(caps.rg.channels, Channels::Rgba);

    let profile = SoftwareProfile::default().with_renderable(&[Channels::Rg, Channels::Rgba]);
    let surface = SoftwareSurface::with_profile(64.0, 64.0, profile);
    let cursor = match SplashCursor::new(surface, QueuedScheduler::new(), small_config()) {
        Ok(cursor) => cursor,
        Err(err) => panic!("{}", err),
    };
    let caps = cursor.capabilities().expect("live cursor");
    assert_eq!(caps.r.channels, Channels::Rg);
}

#[test]
fn test_baseline_context_uses_four_channels_everywhere() {
    let surface = SoftwareSurface::with_profile(64.0, 64.0, SoftwareProfile::baseline());
    let cursor = match SplashCursor::new(surface, QueuedScheduler::new(), small_config()) {
        Ok(cursor) => cursor,
        Err(err) => panic!("{}", err),
    };
    let caps = cursor.capabilities().expect("live cursor");
    assert_eq!(caps.tier, splash_fluid::context::ContextTier::Baseline);
    assert_eq!((caps.r.channels, caps.rg.channels), (Channels::Rgba, Channels::Rgba));
}

#[test]
fn test_unfilterable_context_caps_dye_and_disables_shading() {
    let surface = SoftwareSurface::with_profile(64.0, 64.0, SoftwareProfile::default().without_linear_filtering());
    let mut cursor = match SplashCursor::new(surface, QueuedScheduler::new(), SimulationConfig::default()) {
        Ok(cursor) => cursor,
        Err(err) => panic!("{}", err),
    };
    assert_eq!(cursor.config().dye_resolution, 256);
    assert!(!cursor.config().shading);

    cursor.update_config_json(r#"{"dyeResolution": 1024, "shading": true}"#).expect("valid update");
    assert_eq!(cursor.config().dye_resolution, 256);
    assert!(!cursor.config().shading);

    // Manual filtering still moves dye
    cursor.handle_event(&PointerEvent::MouseDown { x: 32.0, y: 32.0 });
    cursor.tick(frame(1));
    assert!(!is_blank(&cursor.snapshot(FieldKind::Dye).expect("live cursor"), 1e-4));
}

#[test]
fn test_broken_kernel_is_skipped_not_fatal() {
    let profile = SoftwareProfile::default().with_broken_kernel(ShaderKind::Splat);
    let surface = SoftwareSurface::with_profile(64.0, 64.0, profile);
    let mut cursor = match SplashCursor::new(surface, QueuedScheduler::new(), small_config()) {
        Ok(cursor) => cursor,
        Err(err) => panic!("{}", err),
    };
    cursor.handle_event(&PointerEvent::MouseDown { x: 32.0, y: 32.0 });
    cursor.tick(frame(1));
    assert!(is_blank(&cursor.snapshot(FieldKind::Dye).expect("live cursor"), 0.0));
}

#[test]
fn test_seeded_cursors_are_reproducible() {
    let run = || {
        let mut cursor = cursor(64.0, 64.0, small_config());
        cursor.handle_event(&PointerEvent::MouseDown { x: 20.0, y: 40.0 });
        cursor.handle_event(&PointerEvent::MouseMove { x: 30.0, y: 35.0 });
        for n in 1..=3 {
            cursor.tick(frame(n));
        }
        cursor.snapshot(FieldKind::Dye).expect("live cursor")
    };
    assert_eq!(run(), run());
}
