//! Per-kind alert rate limiting

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::messaging::BreachKind;

#[derive(Debug, Clone)]
struct RateLimitState {
    last_sent: DateTime<Utc>,
    suppressed_count: u32,
}

/// Lets one alert per breach kind through per cooldown window
#[derive(Debug, Clone)]
pub struct AlertThrottle {
    cooldown_secs: i64,
    states: HashMap<BreachKind, RateLimitState>,
}

impl AlertThrottle {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown_secs: i64::try_from(cooldown_secs).unwrap_or(i64::MAX),
            states: HashMap::new(),
        }
    }

    /// True if an alert of this kind may be sent now; records the send
    pub fn allow(&mut self, kind: BreachKind, now: DateTime<Utc>) -> bool {
        if let Some(state) = self.states.get_mut(&kind) {
            let elapsed = now.signed_duration_since(state.last_sent).num_seconds();
            if elapsed < self.cooldown_secs {
                state.suppressed_count += 1;
                debug!(
                    kind = kind.as_str(),
                    suppressed = state.suppressed_count,
                    "alert rate limited"
                );
                return false;
            }
            state.last_sent = now;
            state.suppressed_count = 0;
            return true;
        }
        self.states.insert(
            kind,
            RateLimitState {
                last_sent: now,
                suppressed_count: 0,
            },
        );
        true
    }

    pub fn suppressed(&self, kind: BreachKind) -> u32 {
        self.states.get(&kind).map_or(0, |s| s.suppressed_count)
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}
