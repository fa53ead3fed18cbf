//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Bounded reconnect policy for the device session."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use rg_common::SessionConfig;

/// Reconnect policy: a fixed number of connect attempts with a fixed pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_attempts: config.reconnect_attempts.max(1),
            delay: config.reconnect_delay,
        }
    }

    /// Pause to take after a failed `attempt` (1-indexed); `None` once attempts are exhausted.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then_some(self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stop_after_last_attempt() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(50),
        };
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay_after(3), None);
    }

    #[test]
    fn config_zero_attempts_still_tries_once() {
        let config = SessionConfig {
            reconnect_attempts: 0,
            ..SessionConfig::default()
        };
        assert_eq!(ReconnectPolicy::from_config(&config).max_attempts, 1);
    }
}
