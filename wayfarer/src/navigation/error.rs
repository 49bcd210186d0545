use crate::geo::Coordinate;
use thiserror::Error;

/// Errors from navigation control calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    #[error("invalid destination {0}")]
    InvalidDestination(Coordinate),

    #[error("invalid total distance {0}")]
    InvalidDistance(f64),

    #[error("route contains an invalid point at index {0}")]
    InvalidRoute(usize),
}
