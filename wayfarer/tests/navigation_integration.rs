//! Integration tests for navigation tracking.
//!
//! These tests drive the tracker end to end:
//! - A 10 km route walked at 36 km/h until arrival
//! - A declared total far shorter than the real distance
//! - Arrival inside the radius and invalid fixes
//! - Periodic sampling from a pull source
//! - Fixes pushed through a position stream
//! - Save and restore through the file store

use chrono::Utc;
use futures::channel::mpsc;
use futures::StreamExt;
use std::f64::consts::PI;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wayfarer::coordinator::{CoordinatorConfig, ResourceCoordinator};
use wayfarer::geo::{self, Coordinate, EARTH_RADIUS_M};
use wayfarer::navigation::{
    FileStore, NavigationConfig, NavigationPhase, NavigationTracker, PositionError,
    PositionOutcome, PositionSample, PositionSource, PositionStream, SimulatedPositionSource,
};
use wayfarer::scheduler::TokioScheduler;
use wayfarer::throttle::{ThrottleConfig, ThrottleGovernor};

// =============================================================================
// Test Helpers
// =============================================================================

/// Longitude offset along the equator covering `meters`.
fn equator_degrees(meters: f64) -> f64 {
    meters / (EARTH_RADIUS_M * PI / 180.0)
}

struct Harness {
    coordinator: ResourceCoordinator,
    tracker: NavigationTracker,
}

fn harness(source: Option<Arc<dyn PositionSource>>, store: Option<Arc<FileStore>>) -> Harness {
    let scheduler = TokioScheduler::shared();
    let coordinator = ResourceCoordinator::new(CoordinatorConfig::default(), Arc::clone(&scheduler));
    let governor = ThrottleGovernor::with_lane(
        ThrottleConfig::default(),
        scheduler,
        coordinator.lane().clone(),
    );
    let mut builder =
        NavigationTracker::builder(NavigationConfig::default(), coordinator.clone(), governor);
    if let Some(source) = source {
        builder = builder.source(source);
    }
    if let Some(store) = store {
        builder = builder.store(store);
    }
    Harness {
        coordinator,
        tracker: builder.build(),
    }
}

fn fix(latitude: f64, longitude: f64) -> PositionSample {
    PositionSample::new(Coordinate::new(latitude, longitude), Utc::now()).with_speed(10.0)
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Source whose fixes are pushed by the test.
struct PushSource {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<PositionSample>>>,
}

impl PositionSource for PushSource {
    fn current_position(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<PositionSample, PositionError>> + Send + '_>> {
        Box::pin(async { Err(PositionError::Unavailable("push only".to_string())) })
    }

    fn watch(&self) -> Option<PositionStream> {
        let receiver = self.receiver.lock().ok()?.take()?;
        Some(receiver.map(Ok).boxed())
    }
}

// =============================================================================
// Route scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_ten_km_route_at_constant_speed() {
    let start = Coordinate::new(0.0, 0.0);
    let destination = Coordinate::new(0.0, equator_degrees(10_000.0));
    let total = geo::distance_m(start, destination);
    assert!((total - 10_000.0).abs() < 1.0);

    let source = SimulatedPositionSource::new(vec![start, destination], 10.0, Duration::from_secs(1));
    let h = harness(None, None);
    h.tracker.start_navigation(destination, vec![start, destination], total).unwrap();

    let mut last_completion = 0.0;
    let mut arrived_at = None;
    for step in 1..=1_100 {
        let sample = source.current_position().await.unwrap();
        match h.tracker.handle_position(sample) {
            PositionOutcome::Updated(event) => {
                assert!(
                    event.completion_percent >= last_completion,
                    "completion went backwards at step {step}"
                );
                last_completion = event.completion_percent;
                if step >= 30 {
                    assert!((event.speed_kmh() - 36.0).abs() < 0.5, "speed {}", event.speed_kmh());
                }
            }
            PositionOutcome::Arrived(event) => {
                assert_eq!(event.completion_percent, 100.0);
                assert_eq!(event.remaining_distance_m, 0.0);
                arrived_at = Some(step);
                break;
            }
            other => panic!("unexpected outcome {other:?} at step {step}"),
        }
    }

    // 50 m radius is crossed at 9 950 m
    let step = arrived_at.expect("never arrived");
    assert!((995..=996).contains(&step), "arrived at step {step}");
    assert_eq!(h.tracker.phase(), NavigationPhase::Arrived);
    assert!(h.coordinator.timer_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_distant_destination_keeps_completion_clamped() {
    // 10 km declared, but (0, 1) is ~111 km away: remaining clamps to the total
    let h = harness(None, None);
    h.tracker
        .start_navigation(Coordinate::new(0.0, 1.0), Vec::new(), 10_000.0)
        .unwrap();

    let mut last_speed = 0.0;
    let mut last_completion = 0.0;
    for step in 1..=10 {
        let outcome = h.tracker.handle_position(fix(0.0, 0.0005 * step as f64));
        let PositionOutcome::Updated(event) = outcome else {
            panic!("unexpected outcome {outcome:?} at step {step}");
        };
        assert_eq!(event.completion_percent, 0.0);
        assert!(event.completion_percent >= last_completion);
        assert_eq!(event.remaining_distance_m, 10_000.0);
        assert!(event.speed_kmh() > last_speed, "speed stalled at step {step}");
        assert!(event.speed_kmh() <= 36.0 + 1e-9);
        last_speed = event.speed_kmh();
        last_completion = event.completion_percent;
    }

    // 36 km/h * (1 - 0.7^10)
    assert!((last_speed - 36.0).abs() < 1.5, "speed {last_speed}");
}

#[tokio::test(start_paused = true)]
async fn test_arrival_thirty_meters_out() {
    let destination = Coordinate::new(0.0, equator_degrees(2_000.0));
    let h = harness(None, None);
    h.tracker.start_navigation(destination, Vec::new(), 2_000.0).unwrap();
    let mut progress = h.tracker.subscribe().unwrap();

    let outcome = h
        .tracker
        .handle_position(fix(0.0, equator_degrees(2_000.0 - 30.0)));
    assert!(matches!(outcome, PositionOutcome::Arrived(_)));

    let event = progress.recv().await.unwrap();
    assert!(event.arrived);
    assert_eq!(event.completion_percent, 100.0);
    assert_eq!(h.tracker.last_progress().unwrap(), event);
    assert_eq!(h.tracker.phase(), NavigationPhase::Arrived);
}

#[tokio::test(start_paused = true)]
async fn test_nan_latitude_is_ignored() {
    let destination = Coordinate::new(0.0, equator_degrees(2_000.0));
    let h = harness(None, None);
    h.tracker.start_navigation(destination, Vec::new(), 2_000.0).unwrap();
    h.tracker.handle_position(fix(0.0, 0.0));
    let before = h.tracker.session().unwrap();

    assert_eq!(
        h.tracker.handle_position(fix(f64::NAN, 0.001)),
        PositionOutcome::Rejected
    );

    let after = h.tracker.session().unwrap();
    assert_eq!(after.remaining_distance_m, before.remaining_distance_m);
    assert_eq!(after.smoothed_speed_mps, before.smoothed_speed_mps);
    assert_eq!(after.position, before.position);
}

#[tokio::test(start_paused = true)]
async fn test_restart_replaces_session() {
    let h = harness(None, None);
    h.tracker
        .start_navigation(Coordinate::new(0.0, 0.05), Vec::new(), 5_500.0)
        .unwrap();
    let mut first = h.tracker.subscribe().unwrap();

    h.tracker
        .start_navigation(Coordinate::new(0.0, 0.08), Vec::new(), 8_900.0)
        .unwrap();

    assert!(matches!(
        first.recv().await,
        Err(tokio::sync::broadcast::error::RecvError::Closed)
    ));
    assert_eq!(h.tracker.session().unwrap().id, 2);
    assert_eq!(h.coordinator.timer_keys().len(), 2);
    assert!(h.coordinator.timer_keys().iter().all(|key| key.starts_with("navigation.2.")));
}

// =============================================================================
// Position sources
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_sampling_task_polls_source() {
    let start = Coordinate::new(0.0, 0.0);
    let destination = Coordinate::new(0.0, equator_degrees(5_000.0));
    let source = Arc::new(SimulatedPositionSource::new(
        vec![start, destination],
        10.0,
        Duration::from_secs(1),
    ));
    let h = harness(Some(source.clone()), None);
    h.tracker.start_navigation(destination, vec![start, destination], 5_000.0).unwrap();
    let mut progress = h.tracker.subscribe().unwrap();

    tokio::time::sleep(Duration::from_millis(5_500)).await;
    settle().await;

    assert_eq!(source.travelled_m(), 50.0);
    let session = h.tracker.session().unwrap();
    assert!((session.remaining_distance_m - 4_950.0).abs() < 0.5);

    let event = progress.try_recv().unwrap();
    assert!(!event.arrived);
    assert!(event.completion_percent > 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_pushed_fixes_reach_tracker() {
    let (sender, receiver) = mpsc::unbounded();
    let source = Arc::new(PushSource {
        receiver: Mutex::new(Some(receiver)),
    });
    let destination = Coordinate::new(0.0, equator_degrees(1_000.0));
    let h = harness(Some(source), None);
    h.tracker.start_navigation(destination, Vec::new(), 1_000.0).unwrap();
    assert!(h
        .coordinator
        .has_subscription("navigation.1.position_stream"));

    sender.unbounded_send(fix(0.0, equator_degrees(500.0))).unwrap();
    settle().await;
    let remaining = h.tracker.session().unwrap().remaining_distance_m;
    assert!((remaining - 500.0).abs() < 0.5);

    sender.unbounded_send(fix(0.0, equator_degrees(990.0))).unwrap();
    settle().await;
    assert_eq!(h.tracker.phase(), NavigationPhase::Arrived);
    assert!(!h.coordinator.has_subscription("navigation.1.position_stream"));
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_file_store_save_and_restore() {
    let temp = tempfile::TempDir::new().unwrap();
    let destination = Coordinate::new(0.0, equator_degrees(3_000.0));
    let route = vec![
        Coordinate::new(0.0, 0.0),
        Coordinate::new(0.0, equator_degrees(1_500.0)),
        destination,
    ];

    let saved = {
        let store = Arc::new(FileStore::new(temp.path()).unwrap());
        let h = harness(None, Some(store));
        h.tracker.start_navigation(destination, route, 3_000.0).unwrap();
        h.tracker.handle_position(fix(0.0, equator_degrees(1_520.0)));
        h.tracker.session().unwrap()
    };
    assert_eq!(saved.route_index, 1);

    let store = Arc::new(FileStore::new(temp.path()).unwrap());
    let h = harness(None, Some(store));
    assert!(h.tracker.restore_state());

    let restored = h.tracker.session().unwrap();
    assert_eq!(restored.destination, saved.destination);
    assert_eq!(restored.route, saved.route);
    assert_eq!(restored.route_index, saved.route_index);
    assert!((restored.remaining_distance_m - saved.remaining_distance_m).abs() < 1e-6);
    assert!((restored.smoothed_speed_mps - saved.smoothed_speed_mps).abs() < 1e-9);

    assert!(h.tracker.stop_navigation());
    let store = FileStore::new(temp.path()).unwrap();
    let h = harness(None, Some(Arc::new(store)));
    assert!(!h.tracker.restore_state());
}
