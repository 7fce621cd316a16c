//! Fixed-interval throttle serializing dispatches to one destination.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Lower bound on the rate so the derived interval stays representable.
const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

/// Per-destination pacing gate.
///
/// Successive dispatches through one gate are separated by at least the
/// minimum interval derived from the configured rate, regardless of how many
/// callers contend for it. This is deliberately not a token bucket: idle
/// periods never earn a burst allowance.
///
/// `acquire` reserves the next dispatch slot under the mutex and sleeps
/// outside it, so the lock is held only for the timestamp update. Slot
/// reservation totally orders concurrent acquirers; no two callers can
/// compute their wait against the same last-dispatch value.
#[derive(Debug)]
pub struct PacingGate {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl PacingGate {
    pub fn new(requests_per_second: f64) -> Self {
        Self::with_interval(Duration::from_secs_f64(
            1.0 / requests_per_second.max(MIN_REQUESTS_PER_SECOND),
        ))
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the minimum interval since the last dispatch has elapsed,
    /// recording the new dispatch timestamp. Never fails.
    pub async fn acquire(&self) {
        let slot = {
            let mut last = self
                .last_dispatch
                .lock()
                .expect("pacing state should not be poisoned");
            let now = Instant::now();
            let slot = match *last {
                Some(previous) => (previous + self.min_interval).max(now),
                None => now,
            };
            *last = Some(slot);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_is_clamped_to_a_finite_interval() {
        let gate = PacingGate::new(0.0);
        assert_eq!(gate.min_interval(), Duration::from_secs(1000));

        let negative = PacingGate::new(-3.0);
        assert_eq!(negative.min_interval(), Duration::from_secs(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn first_acquire_does_not_wait() {
        let gate = PacingGate::new(2.0);
        let before = Instant::now();
        gate.acquire().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_acquires_are_spaced_by_the_minimum_interval() {
        let gate = PacingGate::new(5.0);

        gate.acquire().await;
        let first = Instant::now();
        gate.acquire().await;
        let second = Instant::now();
        gate.acquire().await;
        let third = Instant::now();

        assert!(second - first >= Duration::from_millis(200));
        assert!(third - second >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_gate_does_not_accumulate_burst_allowance() {
        let gate = PacingGate::new(10.0);

        gate.acquire().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        // After a long idle period the next call goes straight through, but
        // the one after it still has to respect the interval.
        let before = Instant::now();
        gate.acquire().await;
        assert_eq!(Instant::now(), before);

        let before = Instant::now();
        gate.acquire().await;
        assert!(Instant::now() - before >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquirers_never_share_a_slot() {
        use std::sync::Arc;

        let gate = Arc::new(PacingGate::new(50.0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                gate.acquire().await;
                Instant::now()
            }));
        }

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.expect("task should not panic"));
        }
        stamps.sort();

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(20));
        }
    }
}
