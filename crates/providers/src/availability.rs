use parking_lot::RwLock;
use std::future::Future;
use std::time::{Duration, Instant};

/// Memoized liveness probe with a TTL.
///
/// Readers may see a stale answer while another caller re-probes; the
/// lock is never held across an await.
#[derive(Debug)]
pub struct AvailabilityCache {
    ttl: Duration,
    state: RwLock<Option<(bool, Instant)>>,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, state: RwLock::new(None) }
    }

    /// The cached answer, if still fresh.
    pub fn get(&self) -> Option<bool> {
        match *self.state.read() {
            Some((value, at)) if at.elapsed() < self.ttl => Some(value),
            _ => None,
        }
    }

    pub fn set(&self, value: bool) {
        *self.state.write() = Some((value, Instant::now()));
    }

    pub fn invalidate(&self) {
        *self.state.write() = None;
    }

    /// Return the fresh cached answer or run `probe` and store its result.
    pub async fn get_or_probe<F, Fut>(&self, probe: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        if let Some(value) = self.get() {
            return value;
        }
        let value = probe().await;
        self.set(value);
        value
    }
}
