//! Position sources feeding the navigation tracker.

use crate::geo::{self, Coordinate};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// A single position fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub coordinate: Coordinate,
    /// Ground speed in m/s, when the source reports one.
    pub speed_mps: Option<f64>,
    /// Horizontal accuracy in meters.
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(coordinate: Coordinate, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            speed_mps: None,
            accuracy_m: None,
            timestamp,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }
}

/// Errors from a position source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("position unavailable: {0}")]
    Unavailable(String),

    #[error("position request timed out after {0:?}")]
    Timeout(Duration),

    #[error("position permission denied")]
    PermissionDenied,
}

/// Stream of pushed position fixes.
pub type PositionStream = BoxStream<'static, Result<PositionSample, PositionError>>;

/// Supplier of position fixes.
///
/// Sources own their fetch timeout. Invalid coordinates may be returned;
/// the tracker discards them.
pub trait PositionSource: Send + Sync {
    /// Fetch the current position.
    fn current_position(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<PositionSample, PositionError>> + Send + '_>>;

    /// Live stream of fixes, for sources that push.
    fn watch(&self) -> Option<PositionStream> {
        None
    }
}

/// Source that walks a route at constant speed.
///
/// Each fetch advances the simulated agent by `speed * step` along the
/// route, stopping at the last point.
#[derive(Debug)]
pub struct SimulatedPositionSource {
    route: Vec<Coordinate>,
    speed_mps: f64,
    step: Duration,
    travelled_m: Mutex<f64>,
}

impl SimulatedPositionSource {
    pub fn new(route: Vec<Coordinate>, speed_mps: f64, step: Duration) -> Self {
        Self {
            route,
            speed_mps,
            step,
            travelled_m: Mutex::new(0.0),
        }
    }

    /// Distance covered so far in meters.
    pub fn travelled_m(&self) -> f64 {
        *self.travelled_m.lock()
    }

    fn advance(&self) -> Option<Coordinate> {
        let mut travelled = self.travelled_m.lock();
        *travelled += self.speed_mps * self.step.as_secs_f64();
        point_along(&self.route, *travelled)
    }
}

impl PositionSource for SimulatedPositionSource {
    fn current_position(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<PositionSample, PositionError>> + Send + '_>> {
        let result = self
            .advance()
            .map(|coordinate| PositionSample::new(coordinate, Utc::now()).with_speed(self.speed_mps))
            .ok_or_else(|| PositionError::Unavailable("simulated route is empty".to_string()));
        Box::pin(async move { result })
    }
}

/// Point `distance_m` along a polyline, clamped to its last point.
pub(crate) fn point_along(route: &[Coordinate], distance_m: f64) -> Option<Coordinate> {
    let first = *route.first()?;
    let mut remaining = distance_m.max(0.0);
    for pair in route.windows(2) {
        let leg = geo::distance_m(pair[0], pair[1]);
        if remaining <= leg {
            let fraction = if leg > 0.0 { remaining / leg } else { 1.0 };
            return Some(geo::interpolate(pair[0], pair[1], fraction));
        }
        remaining -= leg;
    }
    Some(route.last().copied().unwrap_or(first))
}
