//! Integration tests for resource coordination and recovery.
//!
//! These tests verify, through the public API only:
//! - Capacity caps for subscriptions and timers
//! - Replace-by-key without duplicate firing
//! - Immediate, key-based cancellation
//! - Emergency recovery re-arming the navigation tracker

use futures::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wayfarer::config::ConfigFile;
use wayfarer::coordinator::{
    CoordinatorConfig, CoordinatorError, ResourceCoordinator, ResourceKind, SubscriptionHandlers,
};
use wayfarer::geo::Coordinate;
use wayfarer::navigation::MemoryStore;
use wayfarer::recovery::{RecoveryPhase, HEALTH_CHECK_KEY};
use wayfarer::scheduler::TokioScheduler;
use wayfarer::service::CoreServices;

// =============================================================================
// Test Helpers
// =============================================================================

fn coordinator() -> ResourceCoordinator {
    ResourceCoordinator::new(CoordinatorConfig::default(), TokioScheduler::shared())
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn counting_timer(
    coordinator: &ResourceCoordinator,
    key: &str,
    interval: Duration,
) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    coordinator
        .register_periodic_timer(key, interval, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();
    count
}

// =============================================================================
// Capacity
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_twenty_subscriptions_fit_and_twenty_first_is_rejected() {
    let coordinator = coordinator();

    for i in 0..20 {
        coordinator
            .register_subscription(
                format!("feed.{i}"),
                stream::pending::<Result<u32, String>>(),
                SubscriptionHandlers::new(|_| Ok(())),
            )
            .unwrap();
    }
    assert_eq!(coordinator.health_snapshot().active_subscriptions, 20);

    let rejected = coordinator.register_subscription(
        "feed.20",
        stream::pending::<Result<u32, String>>(),
        SubscriptionHandlers::new(|_| Ok(())),
    );
    assert_eq!(
        rejected.unwrap_err(),
        CoordinatorError::ResourceExhausted {
            kind: ResourceKind::Subscription,
            key: "feed.20".to_string(),
            active: 20,
            cap: 20,
        }
    );

    let health = coordinator.health_snapshot();
    assert_eq!(health.active_subscriptions, 20);
    assert!(!health.is_healthy);
    assert_eq!(coordinator.stats().rejected_registrations, 1);
    assert!(!coordinator.has_subscription("feed.20"));
}

#[tokio::test(start_paused = true)]
async fn test_timer_cap_never_exceeded() {
    let coordinator = coordinator();
    let mut accepted = 0;
    let mut rejected = 0;

    for i in 0..25 {
        match coordinator.register_periodic_timer(format!("t.{i}"), Duration::from_secs(1), || async {
            Ok(())
        }) {
            Ok(_) => accepted += 1,
            Err(_) => rejected += 1,
        }
        assert!(coordinator.health_snapshot().active_timers <= 15);
    }

    assert_eq!(accepted, 15);
    assert_eq!(rejected, 10);
}

// =============================================================================
// Replacement and cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_replacing_key_fires_only_new_callback() {
    let coordinator = coordinator();
    let first = counting_timer(&coordinator, "poll", Duration::from_millis(100));
    let second = counting_timer(&coordinator, "poll", Duration::from_millis(100));

    tokio::time::sleep(Duration::from_millis(550)).await;
    settle().await;

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 5);
    assert_eq!(coordinator.timer_keys(), vec!["poll"]);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_timer_never_runs_again() {
    let coordinator = coordinator();
    let count = counting_timer(&coordinator, "tick", Duration::from_millis(100));

    tokio::time::sleep(Duration::from_millis(250)).await;
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 2);

    assert!(coordinator.cancel_timer("tick"));
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Recovery
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_recovery_rearms_active_navigation() {
    let services = CoreServices::builder(ConfigFile::default())
        .store(Arc::new(MemoryStore::new()))
        .build()
        .unwrap();
    services
        .tracker()
        .start_navigation(Coordinate::new(0.0, 0.05), Vec::new(), 5_500.0)
        .unwrap();
    let armed = services.coordinator().timer_keys();
    assert_eq!(armed.len(), 4);

    let failure = std::io::Error::new(std::io::ErrorKind::Other, "route provider unreachable");
    for _ in 0..3 {
        services.recovery().report_error("routing", &failure);
    }
    assert_eq!(services.recovery().phase(), RecoveryPhase::Recovering);

    // teardown happens immediately, restart after the recovery delay
    settle().await;
    assert!(services.coordinator().timer_keys().is_empty());

    tokio::time::sleep(Duration::from_millis(2100)).await;
    settle().await;

    assert_eq!(services.recovery().phase(), RecoveryPhase::Monitoring);
    assert_eq!(services.coordinator().timer_keys(), armed);
    assert!(services.coordinator().has_timer(HEALTH_CHECK_KEY));
    assert_eq!(services.recovery().stats().recoveries_succeeded, 1);
}
