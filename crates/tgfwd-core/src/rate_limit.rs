use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Which kind of window was just forwarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelayKind {
    FullBatch,
    FinalBatch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelayOutcome {
    Elapsed,
    Cancelled,
}

/// Fixed pause after every forwarded window to stay under Telegram flood
/// control. Purely schedule-based; it never reacts to `retry_after` signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimiter {
    full_batch: Duration,
    final_batch: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            full_batch: Duration::from_secs(240),
            final_batch: Duration::from_secs(120),
        }
    }
}

impl RateLimiter {
    pub fn new(full_batch: Duration, final_batch: Duration) -> Self {
        Self {
            full_batch,
            final_batch,
        }
    }

    /// No waiting at all. Useful for dry runs and tests.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn duration_for(&self, kind: DelayKind) -> Duration {
        match kind {
            DelayKind::FullBatch => self.full_batch,
            DelayKind::FinalBatch => self.final_batch,
        }
    }

    pub async fn delay(&self, kind: DelayKind, cancel: &CancellationToken) -> DelayOutcome {
        let dur = self.duration_for(kind);
        if dur.is_zero() {
            return DelayOutcome::Elapsed;
        }

        info!(secs = dur.as_secs(), ?kind, "waiting to avoid flood control");
        tokio::select! {
            _ = cancel.cancelled() => DelayOutcome::Cancelled,
            _ = sleep(dur) => DelayOutcome::Elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn defaults_match_flood_schedule() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.duration_for(DelayKind::FullBatch), Duration::from_secs(240));
        assert_eq!(limiter.duration_for(DelayKind::FinalBatch), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn full_batch_waits_the_whole_duration() {
        let limiter = RateLimiter::default();
        let started = Instant::now();

        let outcome = limiter
            .delay(DelayKind::FullBatch, &CancellationToken::new())
            .await;

        assert_eq!(outcome, DelayOutcome::Elapsed);
        assert!(started.elapsed() >= Duration::from_secs(240));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_cuts_the_delay_short() {
        let limiter = RateLimiter::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });
        let started = Instant::now();

        let outcome = limiter.delay(DelayKind::FinalBatch, &cancel).await;

        assert_eq!(outcome, DelayOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(120));
    }

    #[tokio::test]
    async fn disabled_limiter_returns_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = RateLimiter::disabled()
            .delay(DelayKind::FullBatch, &cancel)
            .await;
        assert_eq!(outcome, DelayOutcome::Elapsed);
    }
}
