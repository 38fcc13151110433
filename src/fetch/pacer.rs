// src/fetch/pacer.rs
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::PauseProbe;

/// Request pacing: every request waits at least `delay`, and consecutive
/// requests are never closer than `delay` to each other.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_grant: Mutex::new(None),
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait for the next slot, then report whether the caller may send.
    /// Returns `false` (and burns no slot) if the pipeline got paused meanwhile.
    pub async fn admit(&self, pause: &PauseProbe) -> bool {
        let mut last = self.last_grant.lock().await;
        let now = Instant::now();
        let mut ready_at = now + self.delay;
        if let Some(prev) = *last {
            ready_at = ready_at.max(prev + self.delay);
        }
        tokio::time::sleep_until(ready_at).await;

        if pause.is_paused() {
            return false;
        }
        *last = Some(Instant::now());
        true
    }
}
