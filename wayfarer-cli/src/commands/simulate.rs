//! Simulate command - drive a synthetic trip through the navigation tracker.
//!
//! A simulated agent walks a straight route at constant speed. The tracker
//! samples it on its normal timer; `--speedup` compresses travel so a long
//! route finishes in seconds.

use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use wayfarer::geo::{self, Coordinate};
use wayfarer::navigation::{NavigationPhase, SimulatedPositionSource};
use wayfarer::service::CoreServices;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for `wayfarer simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Start latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub from_lat: f64,

    /// Start longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub from_lon: f64,

    /// Destination latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub to_lat: f64,

    /// Destination longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub to_lon: f64,

    /// Travel speed
    #[arg(long, default_value = "36")]
    pub speed_kmh: f64,

    /// Simulated seconds per real second
    #[arg(long, default_value = "60")]
    pub speedup: f64,

    /// Intermediate route points between start and destination
    #[arg(long, default_value = "8")]
    pub waypoints: usize,

    /// Give up after this many real seconds
    #[arg(long, default_value = "600")]
    pub max_secs: u64,

    /// Continue a saved session instead of starting a new one
    #[arg(long)]
    pub resume: bool,
}

/// Run the simulate command.
pub async fn run(args: SimulateArgs, runner: CliRunner) -> Result<(), CliError> {
    runner.log_startup("simulate");

    let from = Coordinate::new(args.from_lat, args.from_lon);
    let to = Coordinate::new(args.to_lat, args.to_lon);
    if !from.is_valid() {
        return Err(CliError::InvalidArgument(format!("start {from} is out of range")));
    }
    if !to.is_valid() {
        return Err(CliError::InvalidArgument(format!("destination {to} is out of range")));
    }
    if !(args.speed_kmh > 0.0 && args.speed_kmh.is_finite()) {
        return Err(CliError::InvalidArgument("--speed-kmh must be positive".to_string()));
    }
    if !(args.speedup > 0.0 && args.speedup.is_finite()) {
        return Err(CliError::InvalidArgument("--speedup must be positive".to_string()));
    }

    let route = build_route(from, to, args.waypoints);
    let total_m = geo::path_length_m(&route);
    let config = runner.config().clone();
    let step = Duration::from_millis(config.navigation.sampling_interval_ms).mul_f64(args.speedup);
    let source = Arc::new(SimulatedPositionSource::new(
        route.clone(),
        args.speed_kmh / 3.6,
        step,
    ));

    let services = CoreServices::builder(config)
        .position_source(source)
        .restore_session(args.resume)
        .build()?;
    let tracker = services.tracker();

    if tracker.phase() == NavigationPhase::Active {
        println!("Resumed saved session");
    } else {
        tracker.start_navigation(to, route, total_m)?;
        println!(
            "Navigating {:.2} km from {} to {} at {:.0} km/h (x{})",
            total_m / 1000.0,
            from,
            to,
            args.speed_kmh,
            args.speedup
        );
    }

    let mut progress = tracker
        .subscribe()
        .ok_or_else(|| CliError::InvalidArgument("navigation did not start".to_string()))?;
    let deadline = tokio::time::sleep(Duration::from_secs(args.max_secs));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = progress.recv() => match event {
                Ok(event) => {
                    println!("{event}");
                    if event.arrived {
                        info!("Simulation reached destination");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Progress output fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut deadline => {
                println!("Time limit of {}s reached, stopping", args.max_secs);
                break;
            }
        }
    }

    println!();
    println!("{}", services.diagnostics());
    services.shutdown();
    Ok(())
}

/// Straight route with `waypoints` evenly spaced intermediate points.
fn build_route(from: Coordinate, to: Coordinate, waypoints: usize) -> Vec<Coordinate> {
    let segments = waypoints + 1;
    (0..=segments)
        .map(|i| geo::interpolate(from, to, i as f64 / segments as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_route_endpoints_and_spacing() {
        let from = Coordinate::new(0.0, 0.0);
        let to = Coordinate::new(0.0, 0.1);
        let route = build_route(from, to, 3);

        assert_eq!(route.len(), 5);
        assert_eq!(route[0], from);
        assert!((route[4].longitude - 0.1).abs() < 1e-12);
        let first_leg = geo::distance_m(route[0], route[1]);
        let last_leg = geo::distance_m(route[3], route[4]);
        assert!((first_leg - last_leg).abs() < 1e-6);
    }

    #[test]
    fn test_build_route_without_waypoints() {
        let route = build_route(Coordinate::new(1.0, 1.0), Coordinate::new(2.0, 2.0), 0);
        assert_eq!(route.len(), 2);
    }
}
