//! When the next refresh of a lease fires, and the timer that fires it.

use crate::config::LeasePolicy;

use std::{future::Future, time::Duration};
use tokio::{sync::oneshot, time::Instant};

/// Upper bound of a refresh delay. Lease durations reported by the server are
/// clamped to it so the deadline stays representable.
pub const MAX_DELAY: Duration = Duration::from_secs(86400 * 365 * 30);

/// Computes the next refresh instant of a lease. Yields a value only once.
#[derive(Debug)]
pub struct RenewalTrigger {
    delay: Duration,
    last_execution_time: Option<Instant>,
}

impl RenewalTrigger {
    /// `max(lease_duration - expiry_threshold, min_renewal)` from now.
    pub fn new(lease_duration: Duration, policy: &LeasePolicy) -> Self {
        let delay = lease_duration
            .saturating_sub(policy.expiry_threshold)
            .max(policy.min_renewal);
        Self::after(delay)
    }

    pub fn after(delay: Duration) -> Self {
        Self {
            delay: delay.min(MAX_DELAY),
            last_execution_time: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn last_execution_time(&self) -> Option<Instant> {
        self.last_execution_time
    }

    pub fn next_execution_time(&mut self) -> Option<Instant> {
        if self.last_execution_time.is_some() {
            return None;
        }
        let now = Instant::now();
        let next = now
            .checked_add(self.delay)
            .unwrap_or_else(|| now + Duration::from_secs(86400));
        self.last_execution_time = Some(next);
        Some(next)
    }
}

/// An armed oneshot timer.
///
/// Cancelling (or dropping) it before the deadline stops the task from ever
/// running. Once the deadline has passed the task runs to completion, even if
/// the handle is cancelled meanwhile.
#[derive(Debug)]
pub struct ScheduledRefresh {
    deadline: Instant,
    cancel: Option<oneshot::Sender<()>>,
}

impl ScheduledRefresh {
    /// Consumes `trigger`, so a trigger backs at most one timer.
    pub fn arm<F>(mut trigger: RenewalTrigger, task: F) -> Option<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let deadline = trigger.next_execution_time()?;
        let (cancel, cancelled) = oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled => {
                    log::trace!("Scheduled refresh cancelled before firing");
                }
                _ = tokio::time::sleep_until(deadline) => task.await,
            }
        });

        Some(Self {
            deadline,
            cancel: Some(cancel),
        })
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Never blocks. A no-op if the timer already fired.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn policy(threshold: u64, min_renewal: u64) -> LeasePolicy {
        LeasePolicy {
            expiry_threshold: Duration::from_secs(threshold),
            min_renewal: Duration::from_secs(min_renewal),
            ..LeasePolicy::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_fires_once() {
        let mut trigger = RenewalTrigger::new(Duration::from_secs(100), &policy(60, 10));
        assert!(trigger.last_execution_time().is_none());
        assert!(trigger.next_execution_time().is_some());
        assert!(trigger.next_execution_time().is_none());
        assert!(trigger.next_execution_time().is_none());
        assert!(trigger.last_execution_time().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn next_execution_is_lease_minus_threshold() {
        let now = Instant::now();
        let mut trigger = RenewalTrigger::new(Duration::from_secs(100), &policy(60, 10));
        let next = trigger.next_execution_time().unwrap();

        assert!(next > now + Duration::from_secs(35));
        assert!(next < now + Duration::from_secs(41));
    }

    #[test]
    fn short_lease_falls_back_to_min_renewal() {
        let trigger = RenewalTrigger::new(Duration::from_secs(30), &policy(60, 10));
        assert_eq!(trigger.delay(), Duration::from_secs(10));

        let trigger = RenewalTrigger::new(Duration::ZERO, &policy(60, 10));
        assert_eq!(trigger.delay(), Duration::from_secs(10));
    }

    #[test]
    fn delay_is_max_of_window_and_floor() {
        for (lease, threshold, floor) in [(100, 30, 10), (3600, 60, 10), (15, 10, 10), (70, 60, 10)] {
            let trigger = RenewalTrigger::new(Duration::from_secs(lease), &policy(threshold, floor));
            let expected = lease.saturating_sub(threshold).max(floor);
            assert_eq!(trigger.delay(), Duration::from_secs(expected));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_lease_is_clamped() {
        let now = Instant::now();
        let mut trigger = RenewalTrigger::new(Duration::from_secs(u64::MAX), &policy(60, 10));
        assert_eq!(trigger.delay(), MAX_DELAY);

        let next = trigger.next_execution_time().unwrap();
        assert!(next > now + Duration::from_secs(86400 * 365));

        let mut retry = RenewalTrigger::after(Duration::MAX);
        assert!(retry.next_execution_time().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn armed_timer_runs_task_at_deadline() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let scheduled = ScheduledRefresh::arm(RenewalTrigger::after(Duration::from_secs(5)), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        scheduled.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let scheduled = ScheduledRefresh::arm(RenewalTrigger::after(Duration::from_secs(5)), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        scheduled.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_timer_never_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        drop(ScheduledRefresh::arm(RenewalTrigger::after(Duration::from_secs(1)), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spent_trigger_cannot_arm() {
        let mut trigger = RenewalTrigger::after(Duration::from_secs(1));
        trigger.next_execution_time();
        assert!(ScheduledRefresh::arm(trigger, async {}).is_none());
    }
}
