use crate::types::PolicyFlags;
use std::time::Duration;

/// Session settings. Defaults suit the bundled demos.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// How long [`Session::wait_connected`](crate::Session::wait_connected) callers should wait by default.
    pub connect_timeout: Duration,
    /// Sleep between polls for consumers that poll instead of waiting.
    pub poll_interval: Duration,
    /// Policy requested right after the connection opens, if non-empty.
    pub policy: PolicyFlags,
    /// Capacity of the observer queue; notifications beyond it are dropped.
    pub event_capacity: usize,
    /// Log every Nth tracking frame at debug level. 0 disables.
    pub frame_log_interval: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            policy: PolicyFlags::empty(),
            event_capacity: 256,
            frame_log_interval: 60,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `LEAPSENSE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            connect_timeout: read_millis(&lookup, "LEAPSENSE_CONNECT_TIMEOUT_MS")
                .unwrap_or(defaults.connect_timeout),
            poll_interval: read_millis(&lookup, "LEAPSENSE_POLL_INTERVAL_MS")
                .unwrap_or(defaults.poll_interval),
            policy: read_policy(&lookup, "LEAPSENSE_POLICY").unwrap_or(defaults.policy),
            event_capacity: read_number(&lookup, "LEAPSENSE_EVENT_CAPACITY")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.event_capacity),
            frame_log_interval: read_number(&lookup, "LEAPSENSE_FRAME_LOG_INTERVAL")
                .unwrap_or(defaults.frame_log_interval),
        }
    }
}

fn read_string(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

fn read_number<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = read_string(lookup, name)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring {}='{}': not a number", name, raw);
            None
        }
    }
}

fn read_millis(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Duration> {
    read_number::<u64>(lookup, name).map(Duration::from_millis)
}

fn read_policy(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<PolicyFlags> {
    let raw = read_string(lookup, name)?;
    let mut flags = PolicyFlags::empty();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part {
            "images" => flags |= PolicyFlags::IMAGES,
            "map_points" => flags |= PolicyFlags::MAP_POINTS,
            "background_frames" => flags |= PolicyFlags::BACKGROUND_FRAMES,
            "allow_pause_resume" => flags |= PolicyFlags::ALLOW_PAUSE_RESUME,
            "optimize_hmd" => flags |= PolicyFlags::OPTIMIZE_HMD,
            other => {
                log::warn!(
                    "Unknown {} entry '{}' (supported: images|map_points|background_frames|allow_pause_resume|optimize_hmd)",
                    name,
                    other
                );
            }
        }
    }
    Some(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        assert_eq!(SessionConfig::from_lookup(|_| None), SessionConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = SessionConfig::from_lookup(lookup(&[
            ("LEAPSENSE_CONNECT_TIMEOUT_MS", "250"),
            ("LEAPSENSE_POLICY", " Images, map_points "),
            ("LEAPSENSE_EVENT_CAPACITY", "8"),
            ("LEAPSENSE_FRAME_LOG_INTERVAL", "0"),
        ]));
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.policy, PolicyFlags::IMAGES | PolicyFlags::MAP_POINTS);
        assert_eq!(config.event_capacity, 8);
        assert_eq!(config.frame_log_interval, 0);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = SessionConfig::from_lookup(lookup(&[
            ("LEAPSENSE_POLL_INTERVAL_MS", "soon"),
            ("LEAPSENSE_EVENT_CAPACITY", "0"),
            ("LEAPSENSE_POLICY", "images,bogus"),
        ]));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.policy, PolicyFlags::IMAGES);
    }
}
