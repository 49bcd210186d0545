//! Navigation session state and progress payloads.

use super::config::NavigationConfig;
use super::source::PositionSample;
use crate::geo::{distance_m, Coordinate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Tracker lifecycle.
///
/// `Arrived` and `Stopped` are terminal for a session; the next
/// `start_navigation` begins a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationPhase {
    Idle,
    Active,
    Arrived,
    Stopped,
}

impl NavigationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationPhase::Idle => "idle",
            NavigationPhase::Active => "active",
            NavigationPhase::Arrived => "arrived",
            NavigationPhase::Stopped => "stopped",
        }
    }
}

impl fmt::Display for NavigationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress broadcast to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub remaining_distance_m: f64,
    pub eta: Duration,
    pub speed_mps: f64,
    /// `100 * (total - remaining) / total`, clamped to `[0, 100]`.
    pub completion_percent: f64,
    pub position: Option<Coordinate>,
    pub arrived: bool,
}

impl ProgressEvent {
    pub fn speed_kmh(&self) -> f64 {
        self.speed_mps * 3.6
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:5.1}% | {:8.0} m left | {:5.1} km/h | ETA {}s",
            self.completion_percent,
            self.remaining_distance_m,
            self.speed_kmh(),
            self.eta.as_secs()
        )?;
        if self.arrived {
            write!(f, " | arrived")?;
        }
        Ok(())
    }
}

/// What the tracker did with a position fix.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionOutcome {
    /// NaN or out-of-range coordinates; the session is untouched.
    Rejected,
    /// No active session.
    Inactive,
    Updated(ProgressEvent),
    /// Within the arrival radius; the session has been closed.
    Arrived(ProgressEvent),
}

/// An in-progress navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationSession {
    pub id: u64,
    pub destination: Coordinate,
    pub route: Vec<Coordinate>,
    pub total_distance_m: f64,
    /// Always within `[0, total_distance_m]`.
    pub remaining_distance_m: f64,
    /// Never decreases.
    pub route_index: usize,
    pub smoothed_speed_mps: f64,
    pub eta: Duration,
    pub started_at: DateTime<Utc>,
    pub position: Option<Coordinate>,
    pub last_sample_at: Option<DateTime<Utc>>,
}

impl NavigationSession {
    pub fn new(
        id: u64,
        destination: Coordinate,
        route: Vec<Coordinate>,
        total_distance_m: f64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            destination,
            route,
            total_distance_m,
            remaining_distance_m: total_distance_m,
            route_index: 0,
            smoothed_speed_mps: 0.0,
            eta: Duration::ZERO,
            started_at,
            position: None,
            last_sample_at: None,
        }
    }

    /// Fold a validated fix into the session.
    ///
    /// Returns the raw great-circle distance to the destination, used for
    /// the arrival check before clamping.
    pub fn apply_sample(&mut self, sample: &PositionSample, config: &NavigationConfig) -> f64 {
        let observed_speed = sample.speed_mps.filter(|s| s.is_finite() && *s >= 0.0).or_else(|| {
            let previous = self.position?;
            let previous_at = self.last_sample_at?;
            let elapsed = (sample.timestamp - previous_at).num_milliseconds() as f64 / 1000.0;
            (elapsed > 0.0).then(|| distance_m(previous, sample.coordinate) / elapsed)
        });
        if let Some(observed) = observed_speed {
            self.update_speed(observed, config);
        }

        let to_destination = distance_m(sample.coordinate, self.destination);
        self.remaining_distance_m = to_destination.clamp(0.0, self.total_distance_m.max(0.0));
        self.advance_route_index(sample.coordinate, config.waypoint_tolerance_m);
        self.position = Some(sample.coordinate);
        self.last_sample_at = Some(sample.timestamp);
        self.eta = self.compute_eta();

        to_destination
    }

    fn update_speed(&mut self, observed_mps: f64, config: &NavigationConfig) {
        let alpha = config.speed_smoothing.clamp(0.0, 1.0);
        let (min, max) = config.speed_bounds_mps();
        let blended = self.smoothed_speed_mps * alpha + observed_mps * (1.0 - alpha);
        self.smoothed_speed_mps = blended.clamp(min, max);
    }

    /// Move to the nearest not-yet-passed route point within `tolerance_m`.
    fn advance_route_index(&mut self, position: Coordinate, tolerance_m: f64) {
        let nearest = self
            .route
            .iter()
            .enumerate()
            .skip(self.route_index)
            .map(|(index, point)| (index, distance_m(position, *point)))
            .filter(|(_, distance)| *distance <= tolerance_m)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((index, _)) = nearest {
            self.route_index = self.route_index.max(index);
        }
    }

    /// Zero when either speed or remaining distance is zero.
    pub fn compute_eta(&self) -> Duration {
        if self.smoothed_speed_mps <= 0.0 || self.remaining_distance_m <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.remaining_distance_m / self.smoothed_speed_mps)
            .unwrap_or(Duration::ZERO)
    }

    pub fn completion_percent(&self) -> f64 {
        if self.total_distance_m <= 0.0 {
            return 0.0;
        }
        let done = self.total_distance_m - self.remaining_distance_m;
        (100.0 * done / self.total_distance_m).clamp(0.0, 100.0)
    }

    pub fn progress(&self) -> ProgressEvent {
        ProgressEvent {
            remaining_distance_m: self.remaining_distance_m,
            eta: self.eta,
            speed_mps: self.smoothed_speed_mps,
            completion_percent: self.completion_percent(),
            position: self.position,
            arrived: false,
        }
    }

    /// The final event broadcast on arrival.
    pub fn arrival(&self) -> ProgressEvent {
        ProgressEvent {
            remaining_distance_m: 0.0,
            eta: Duration::ZERO,
            speed_mps: self.smoothed_speed_mps,
            completion_percent: 100.0,
            position: self.position,
            arrived: true,
        }
    }

    pub fn to_saved(&self, saved_at: DateTime<Utc>) -> SavedSession {
        SavedSession {
            destination: self.destination,
            route: self.route.clone(),
            total_distance_m: self.total_distance_m,
            remaining_distance_m: self.remaining_distance_m,
            smoothed_speed_mps: self.smoothed_speed_mps,
            route_index: self.route_index,
            position: self.position,
            started_at: self.started_at,
            saved_at,
        }
    }

    pub fn from_saved(id: u64, saved: SavedSession) -> Self {
        let total = saved.total_distance_m.max(0.0);
        let mut session = Self {
            id,
            destination: saved.destination,
            route_index: saved.route_index.min(saved.route.len().saturating_sub(1)),
            route: saved.route,
            total_distance_m: total,
            remaining_distance_m: saved.remaining_distance_m.clamp(0.0, total),
            smoothed_speed_mps: saved.smoothed_speed_mps.max(0.0),
            eta: Duration::ZERO,
            started_at: saved.started_at,
            position: saved.position,
            last_sample_at: None,
        };
        session.eta = session.compute_eta();
        session
    }
}

/// Persisted form of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    pub destination: Coordinate,
    #[serde(default)]
    pub route: Vec<Coordinate>,
    pub total_distance_m: f64,
    pub remaining_distance_m: f64,
    pub smoothed_speed_mps: f64,
    pub route_index: usize,
    #[serde(default)]
    pub position: Option<Coordinate>,
    pub started_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
}
