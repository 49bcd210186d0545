//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use super::settings::ConfigFile;
use crate::throttle::kinds;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let c = &config.coordinator;
    let t = &config.throttle;
    let b = &config.circuit;
    let r = &config.recovery;
    let n = &config.navigation;
    let l = &config.logging;

    let delay_table = table_section(
        &t.delay_ms,
        kinds::DEFAULTS.iter().map(|(kind, delay, _)| (*kind, delay.to_string())),
    );
    let rate_table = table_section(
        &t.max_per_second,
        kinds::DEFAULTS.iter().map(|(kind, _, max)| (*kind, max.to_string())),
    );
    let autosave = if n.autosave { "true" } else { "false" };

    format!(
        r#"[coordinator]
; Maximum concurrently active timers (default: 15)
max_timers = {max_timers}
; Maximum concurrently active stream subscriptions (default: 20)
max_subscriptions = {max_subscriptions}
; Bound of the deferred event queue; the oldest event is evicted on overflow (default: 100)
max_queued_events = {max_queued_events}

[throttle]
; Delay for event types without an entry in [throttle.delay_ms] (default: 100)
default_delay_ms = {default_delay_ms}
; Budget for event types without an entry in [throttle.max_per_second] (default: 10)
default_max_per_second = {default_max_per_second}

[throttle.delay_ms]
; Per event type delay in milliseconds. Entries override the built-in table.
{delay_table}
[throttle.max_per_second]
; Per event type budget within a one-second window. Entries override the built-in table.
{rate_table}
[circuit]
; Consecutive failures that open a circuit (default: 3)
max_failures = {max_failures}
; Seconds an open circuit waits before letting a trial call through (default: 60)
reset_timeout_secs = {reset_timeout_secs}
; Seconds a half-open circuit waits for a trial before closing on its own (default: 30)
half_open_timeout_secs = {half_open_timeout_secs}
; Per-call timeout in seconds (default: 10)
call_timeout_secs = {call_timeout_secs}
; Seconds a circuit may stay tripped before it is reported stuck open (default: 600)
open_alert_after_secs = {open_alert_after_secs}
; Attempts per call including the first; 1 disables retries (default: 3)
retry_max_attempts = {retry_max_attempts}
; First retry delay, doubled on each further retry (default: 200)
retry_base_delay_ms = {retry_base_delay_ms}
; Upper bound for a single retry delay (default: 5000)
retry_max_delay_ms = {retry_max_delay_ms}

[recovery]
; Seconds between health checks (default: 10)
health_check_interval_secs = {health_check_interval_secs}
; Seconds between sweeps of finished timers and subscriptions (default: 30)
cleanup_interval_secs = {cleanup_interval_secs}
; Overloaded health checks that trigger emergency recovery (default: 10)
max_event_overloads = {max_event_overloads}
; Reported errors that trigger emergency recovery (default: 3)
max_consecutive_errors = {max_consecutive_errors}
; Calls per second of a single event type that count as overload (default: 50)
event_rate_ceiling = {event_rate_ceiling}
; Pause between teardown and restart during recovery (default: 2000)
recovery_delay_ms = {recovery_delay_ms}
; Wait before retrying a failed recovery once (default: 5000)
retry_delay_ms = {retry_delay_ms}

[navigation]
; Position polling interval (default: 1000)
sampling_interval_ms = {sampling_interval_ms}
; Progress re-broadcast interval (default: 2000)
broadcast_interval_ms = {broadcast_interval_ms}
; Weight of the previous speed in the moving average, 0.0 - 1.0 (default: 0.7)
speed_smoothing = {speed_smoothing}
; Bounds applied to the smoothed speed (defaults: 1 and 120)
min_speed_kmh = {min_speed_kmh}
max_speed_kmh = {max_speed_kmh}
; Route points within this many meters count as reached (default: 100)
waypoint_tolerance_m = {waypoint_tolerance_m}
; Distance to the destination that counts as arrival (default: 50)
arrival_radius_m = {arrival_radius_m}
; Saved sessions older than this are discarded on restore (default: 3600)
restore_max_age_secs = {restore_max_age_secs}
; Save the session after every accepted position (default: true)
autosave = {autosave}
; Directory holding the saved session
state_dir = {state_dir}

[logging]
; Directory for log files
directory = {log_directory}
; Log file name, cleared on each start
file = {log_file}
"#,
        max_timers = c.max_timers,
        max_subscriptions = c.max_subscriptions,
        max_queued_events = c.max_queued_events,
        default_delay_ms = t.default_delay_ms,
        default_max_per_second = t.default_max_per_second,
        max_failures = b.max_failures,
        reset_timeout_secs = b.reset_timeout_secs,
        half_open_timeout_secs = b.half_open_timeout_secs,
        call_timeout_secs = b.call_timeout_secs,
        open_alert_after_secs = b.open_alert_after_secs,
        retry_max_attempts = b.retry_max_attempts,
        retry_base_delay_ms = b.retry_base_delay_ms,
        retry_max_delay_ms = b.retry_max_delay_ms,
        health_check_interval_secs = r.health_check_interval_secs,
        cleanup_interval_secs = r.cleanup_interval_secs,
        max_event_overloads = r.max_event_overloads,
        max_consecutive_errors = r.max_consecutive_errors,
        event_rate_ceiling = r.event_rate_ceiling,
        recovery_delay_ms = r.recovery_delay_ms,
        retry_delay_ms = r.retry_delay_ms,
        sampling_interval_ms = n.sampling_interval_ms,
        broadcast_interval_ms = n.broadcast_interval_ms,
        speed_smoothing = n.speed_smoothing,
        min_speed_kmh = n.min_speed_kmh,
        max_speed_kmh = n.max_speed_kmh,
        waypoint_tolerance_m = n.waypoint_tolerance_m,
        arrival_radius_m = n.arrival_radius_m,
        restore_max_age_secs = n.restore_max_age_secs,
        state_dir = path_to_string(&n.state_dir),
        log_directory = path_to_string(&l.directory),
        log_file = l.file,
    )
}

/// Render a per-type table, or the built-in values as comments when empty.
fn table_section<'a, V: ToString>(
    entries: &BTreeMap<String, V>,
    builtin: impl Iterator<Item = (&'a str, String)>,
) -> String {
    let mut out = String::new();
    if entries.is_empty() {
        for (kind, value) in builtin {
            let _ = writeln!(out, "; {kind} = {value}");
        }
    } else {
        for (kind, value) in entries {
            let _ = writeln!(out, "{kind} = {}", value.to_string());
        }
    }
    out
}

fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
