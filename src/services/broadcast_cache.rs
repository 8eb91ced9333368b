//! Short-lived memory of recently replicated broadcast packets

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait BroadcastCache: Send + Sync {
    /// True if `payload` was already seen in `scope` within the window;
    /// otherwise records it and returns false.
    fn check_and_record(&self, scope: u64, payload: &[u8]) -> bool;
}

/// Sweep once the table grows past this many entries
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug)]
pub struct TimedBroadcastCache {
    window: Duration,
    seen: Mutex<HashMap<(u64, u64), Instant>>,
}

impl TimedBroadcastCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn check_at(&self, scope: u64, payload: &[u8], now: Instant) -> bool {
        let mut hasher = DefaultHasher::new();
        payload.hash(&mut hasher);
        let key = (scope, hasher.finish());

        let Ok(mut seen) = self.seen.lock() else {
            return false;
        };
        if seen.len() > SWEEP_THRESHOLD {
            let window = self.window;
            seen.retain(|_, at| now.duration_since(*at) < window);
        }
        match seen.get(&key) {
            Some(at) if now.duration_since(*at) < self.window => true,
            _ => {
                seen.insert(key, now);
                false
            }
        }
    }
}

impl BroadcastCache for TimedBroadcastCache {
    fn check_and_record(&self, scope: u64, payload: &[u8]) -> bool {
        self.check_at(scope, payload, Instant::now())
    }
}
