//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
/// Unknown keys are ignored.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [coordinator] section
    if let Some(section) = ini.section(Some("coordinator")) {
        let s = Section::new("coordinator", section);
        if let Some(v) = s.positive("max_timers")? {
            config.coordinator.max_timers = v;
        }
        if let Some(v) = s.positive("max_subscriptions")? {
            config.coordinator.max_subscriptions = v;
        }
        if let Some(v) = s.positive("max_queued_events")? {
            config.coordinator.max_queued_events = v;
        }
    }

    // [throttle] section
    if let Some(section) = ini.section(Some("throttle")) {
        let s = Section::new("throttle", section);
        if let Some(v) = s.number("default_delay_ms", "must be a non-negative integer (milliseconds)")? {
            config.throttle.default_delay_ms = v;
        }
        if let Some(v) = s.positive("default_max_per_second")? {
            config.throttle.default_max_per_second = v;
        }
    }

    // [throttle.delay_ms] section: one key per event type
    if let Some(section) = ini.section(Some("throttle.delay_ms")) {
        let s = Section::new("throttle.delay_ms", section);
        for (kind, _) in section.iter() {
            if let Some(v) = s.number(kind, "must be a non-negative integer (milliseconds)")? {
                config.throttle.delay_ms.insert(kind.to_string(), v);
            }
        }
    }

    // [throttle.max_per_second] section: one key per event type
    if let Some(section) = ini.section(Some("throttle.max_per_second")) {
        let s = Section::new("throttle.max_per_second", section);
        for (kind, _) in section.iter() {
            if let Some(v) = s.positive(kind)? {
                config.throttle.max_per_second.insert(kind.to_string(), v);
            }
        }
    }

    // [circuit] section
    if let Some(section) = ini.section(Some("circuit")) {
        let s = Section::new("circuit", section);
        if let Some(v) = s.positive("max_failures")? {
            config.circuit.max_failures = v;
        }
        if let Some(v) = s.positive("reset_timeout_secs")? {
            config.circuit.reset_timeout_secs = v;
        }
        if let Some(v) = s.positive("half_open_timeout_secs")? {
            config.circuit.half_open_timeout_secs = v;
        }
        if let Some(v) = s.positive("call_timeout_secs")? {
            config.circuit.call_timeout_secs = v;
        }
        if let Some(v) = s.positive("open_alert_after_secs")? {
            config.circuit.open_alert_after_secs = v;
        }
        if let Some(v) = s.positive("retry_max_attempts")? {
            config.circuit.retry_max_attempts = v;
        }
        if let Some(v) = s.number("retry_base_delay_ms", "must be a non-negative integer (milliseconds)")? {
            config.circuit.retry_base_delay_ms = v;
        }
        if let Some(v) = s.number("retry_max_delay_ms", "must be a non-negative integer (milliseconds)")? {
            config.circuit.retry_max_delay_ms = v;
        }
    }

    // [recovery] section
    if let Some(section) = ini.section(Some("recovery")) {
        let s = Section::new("recovery", section);
        if let Some(v) = s.positive("health_check_interval_secs")? {
            config.recovery.health_check_interval_secs = v;
        }
        if let Some(v) = s.positive("cleanup_interval_secs")? {
            config.recovery.cleanup_interval_secs = v;
        }
        if let Some(v) = s.positive("max_event_overloads")? {
            config.recovery.max_event_overloads = v;
        }
        if let Some(v) = s.positive("max_consecutive_errors")? {
            config.recovery.max_consecutive_errors = v;
        }
        if let Some(v) = s.positive("event_rate_ceiling")? {
            config.recovery.event_rate_ceiling = v;
        }
        if let Some(v) = s.number("recovery_delay_ms", "must be a non-negative integer (milliseconds)")? {
            config.recovery.recovery_delay_ms = v;
        }
        if let Some(v) = s.number("retry_delay_ms", "must be a non-negative integer (milliseconds)")? {
            config.recovery.retry_delay_ms = v;
        }
    }

    // [navigation] section
    if let Some(section) = ini.section(Some("navigation")) {
        let s = Section::new("navigation", section);
        if let Some(v) = s.positive("sampling_interval_ms")? {
            config.navigation.sampling_interval_ms = v;
        }
        if let Some(v) = s.positive("broadcast_interval_ms")? {
            config.navigation.broadcast_interval_ms = v;
        }
        if let Some(v) = s.fraction("speed_smoothing")? {
            config.navigation.speed_smoothing = v;
        }
        if let Some(v) = s.distance("min_speed_kmh")? {
            config.navigation.min_speed_kmh = v;
        }
        if let Some(v) = s.distance("max_speed_kmh")? {
            config.navigation.max_speed_kmh = v;
        }
        if let Some(v) = s.distance("waypoint_tolerance_m")? {
            config.navigation.waypoint_tolerance_m = v;
        }
        if let Some(v) = s.distance("arrival_radius_m")? {
            config.navigation.arrival_radius_m = v;
        }
        if let Some(v) = s.positive("restore_max_age_secs")? {
            config.navigation.restore_max_age_secs = v;
        }
        if let Some(v) = section.get("autosave") {
            config.navigation.autosave = parse_bool(v);
        }
        if let Some(v) = section.get("state_dir") {
            let v = v.trim();
            if !v.is_empty() {
                config.navigation.state_dir = expand_tilde(v);
            }
        }

        if config.navigation.min_speed_kmh > config.navigation.max_speed_kmh {
            return Err(ConfigFileError::InvalidValue {
                section: "navigation".to_string(),
                key: "min_speed_kmh".to_string(),
                value: config.navigation.min_speed_kmh.to_string(),
                reason: format!(
                    "must not exceed max_speed_kmh ({})",
                    config.navigation.max_speed_kmh
                ),
            });
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

/// One INI section with typed, error-reporting accessors.
struct Section<'a> {
    name: &'static str,
    properties: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, properties: &'a Properties) -> Self {
        Self { name, properties }
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn number<T: FromStr>(&self, key: &str, reason: &str) -> Result<Option<T>, ConfigFileError> {
        match self.properties.get(key) {
            None => Ok(None),
            Some(v) => v
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(key, v, reason)),
        }
    }

    /// Integer that must be at least 1.
    fn positive<T>(&self, key: &str) -> Result<Option<T>, ConfigFileError>
    where
        T: FromStr + PartialOrd + From<u8>,
    {
        const REASON: &str = "must be a positive integer";
        match self.number::<T>(key, REASON)? {
            Some(v) if v < T::from(1) => {
                let raw = self.properties.get(key).unwrap_or_default();
                Err(self.invalid(key, raw, REASON))
            }
            other => Ok(other),
        }
    }

    /// Finite, non-negative float.
    fn distance(&self, key: &str) -> Result<Option<f64>, ConfigFileError> {
        const REASON: &str = "must be a non-negative number";
        match self.number::<f64>(key, REASON)? {
            Some(v) if !v.is_finite() || v < 0.0 => {
                let raw = self.properties.get(key).unwrap_or_default();
                Err(self.invalid(key, raw, REASON))
            }
            other => Ok(other),
        }
    }

    /// Float in `[0, 1]`.
    fn fraction(&self, key: &str) -> Result<Option<f64>, ConfigFileError> {
        const REASON: &str = "must be a number between 0.0 and 1.0";
        match self.number::<f64>(key, REASON)? {
            Some(v) if !(0.0..=1.0).contains(&v) => {
                let raw = self.properties.get(key).unwrap_or_default();
                Err(self.invalid(key, raw, REASON))
            }
            other => Ok(other),
        }
    }
}

/// Parse a boolean value from a config string.
///
/// Accepts "true", "1", "yes", "on" (case-insensitive) as true.
/// Everything else is false.
pub(super) fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Expand a leading `~` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(content).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_partial_config() {
        let config = parse(
            r#"
[coordinator]
max_timers = 30

[navigation]
arrival_radius_m = 25.5
autosave = no
"#,
        )
        .unwrap();

        assert_eq!(config.coordinator.max_timers, 30);
        assert_eq!(config.coordinator.max_subscriptions, 20);
        assert_eq!(config.navigation.arrival_radius_m, 25.5);
        assert!(!config.navigation.autosave);
        assert_eq!(config.circuit, ConfigFile::default().circuit);
    }

    #[test]
    fn test_throttle_tables() {
        let config = parse(
            r#"
[throttle]
default_delay_ms = 250

[throttle.delay_ms]
map_move = 150
custom = 40

[throttle.max_per_second]
map_move = 12
"#,
        )
        .unwrap();

        assert_eq!(config.throttle.default_delay_ms, 250);
        assert_eq!(config.throttle.delay_ms.get("map_move"), Some(&150));
        assert_eq!(config.throttle.delay_ms.get("custom"), Some(&40));
        assert_eq!(config.throttle.max_per_second.get("map_move"), Some(&12));

        let throttle = crate::throttle::ThrottleConfig::from_settings(&config.throttle);
        assert_eq!(throttle.delay_for("map_move"), Duration::from_millis(150));
        assert_eq!(throttle.delay_for("custom"), Duration::from_millis(40));
        assert_eq!(throttle.delay_for("unlisted"), Duration::from_millis(250));
        // built-in entries not overridden survive
        assert_eq!(throttle.max_per_second_for("route_request"), 1);
    }

    #[test]
    fn test_invalid_number() {
        let result = parse("[circuit]\nmax_failures = many\n");
        match result {
            Err(ConfigFileError::InvalidValue {
                section,
                key,
                value,
                ..
            }) => {
                assert_eq!(section, "circuit");
                assert_eq!(key, "max_failures");
                assert_eq!(value, "many");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_cap_rejected() {
        let result = parse("[coordinator]\nmax_subscriptions = 0\n");
        assert!(matches!(
            result,
            Err(ConfigFileError::InvalidValue { ref key, .. }) if key == "max_subscriptions"
        ));
    }

    #[test]
    fn test_smoothing_out_of_range() {
        let result = parse("[navigation]\nspeed_smoothing = 1.5\n");
        assert!(matches!(
            result,
            Err(ConfigFileError::InvalidValue { ref key, .. }) if key == "speed_smoothing"
        ));
    }

    #[test]
    fn test_speed_bounds_must_be_ordered() {
        let result = parse("[navigation]\nmin_speed_kmh = 200\n");
        assert!(matches!(
            result,
            Err(ConfigFileError::InvalidValue { ref key, .. }) if key == "min_speed_kmh"
        ));
    }

    #[test]
    fn test_negative_distance_rejected() {
        assert!(parse("[navigation]\narrival_radius_m = -3\n").is_err());
        assert!(parse("[navigation]\nwaypoint_tolerance_m = NaN\n").is_err());
    }

    #[test]
    fn test_parse_bool_values() {
        for v in ["true", "TRUE", "1", "yes", "on", " on "] {
            assert!(parse_bool(v), "{v} should be true");
        }
        for v in ["false", "0", "no", "off", "", "maybe"] {
            assert!(!parse_bool(v), "{v} should be false");
        }
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/logs");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("logs"));
        }
        assert_eq!(expand_tilde("/var/log"), PathBuf::from("/var/log"));
    }
}
