//! Engine tuning knobs.

use std::time::Duration;

/// Liveness policy for the presence engine.
///
/// The radio never delivers a "tag lost" notification; the engine
/// substitutes a periodic connection probe while a viewer tag is
/// current. These two values are the whole policy.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Interval between liveness probes.
    pub poll_interval: Duration,

    /// Number of failed probes tolerated before the tag is declared
    /// removed. The counter only resets on a fresh viewer
    /// classification, never on a successful probe, so flakiness
    /// accumulates across probes.
    pub failure_threshold: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            failure_threshold: 1,
        }
    }
}
