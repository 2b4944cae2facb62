//! Polling of CA-side resources until they reach a final status.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Status of an order, authorization or challenge.
///
/// See [RFC 8555 §7.1.6](https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,

    /// Not sent by the CA, or not a status this client knows.
    #[default]
    #[serde(other)]
    Unknown,
}

impl Status {
    /// Returns true if the CA will not change this status any more.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            Status::Valid | Status::Invalid | Status::Deactivated | Status::Expired | Status::Revoked
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Pending => "pending",
            Status::Ready => "ready",
            Status::Processing => "processing",
            Status::Valid => "valid",
            Status::Invalid => "invalid",
            Status::Deactivated => "deactivated",
            Status::Expired => "expired",
            Status::Revoked => "revoked",
            Status::Unknown => "unknown",
        })
    }
}

/// Time budget and backoff for waiting on a resource.
///
/// Between polls the client waits as long as the CA asks through `Retry-After`. Without that
/// header it waits `initial_delay`, multiplied by `backoff` after each poll and capped at
/// `max_delay`. Once the next wait would exceed the budget, waiting fails with
/// [`Error::Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    timeout: Duration,
    initial_delay: Duration,
    backoff: u32,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy that waits at most `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            initial_delay: Duration::from_millis(500),
            backoff: 2,
            max_delay: Duration::from_secs(10),
        }
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Sets the factor the delay grows by after each poll. A factor of 1 polls at a fixed rate.
    pub fn with_backoff(mut self, backoff: u32) -> Self {
        self.backoff = backoff.max(1);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.saturating_mul(self.backoff).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// A CA-side resource that can be refreshed from its own URL.
#[async_trait]
pub(crate) trait Pollable: Send + Sync {
    /// Fetches the current state and replaces the cached one.
    ///
    /// Returns the `Retry-After` duration if the CA sent one.
    async fn update(&self) -> Result<Option<Duration>>;

    /// Status of the cached state.
    fn status(&self) -> Status;

    fn location(&self) -> &str;
}

/// Polls `resource` until `done` accepts its status.
///
/// The returned status is the one that ended the loop.
pub(crate) async fn poll_until<P, F>(resource: &P, done: F, policy: &RetryPolicy) -> Result<Status>
where
    P: Pollable + ?Sized,
    F: Fn(Status) -> bool + Send + Sync,
{
    // a budget past the clock's range never runs out
    let deadline = Instant::now().checked_add(policy.timeout);
    let mut delay = policy.initial_delay;

    loop {
        let retry_after = resource.update().await?;
        let status = resource.status();

        log::debug!("Polled {}: {status}", resource.location());

        if done(status) {
            return Ok(status);
        }

        let wait = retry_after.unwrap_or(delay);

        let remaining =
            deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));

        if remaining.is_some_and(|remaining| wait > remaining) {
            return Err(Error::Timeout {
                url: resource.location().to_owned(),
                status,
            });
        }

        tokio::time::sleep(wait).await;
        delay = policy.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    /// Walks through a fixed list of states, then stays on the last one.
    struct Script {
        states: Vec<(Status, Option<Duration>)>,
        polls: AtomicUsize,
        current: Mutex<Status>,
    }

    impl Script {
        fn new(states: Vec<(Status, Option<Duration>)>) -> Self {
            Self {
                states,
                polls: AtomicUsize::new(0),
                current: Mutex::new(Status::Pending),
            }
        }
    }

    #[async_trait]
    impl Pollable for Script {
        async fn update(&self) -> Result<Option<Duration>> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            let (status, retry_after) = self.states[n.min(self.states.len() - 1)];
            *self.current.lock() = status;
            Ok(retry_after)
        }

        fn status(&self) -> Status {
            *self.current.lock()
        }

        fn location(&self) -> &str {
            "https://example.com/acme/chall/1"
        }
    }

    #[test]
    fn status_wire_format() {
        let status: Status = serde_json::from_str(r#""processing""#).unwrap();
        assert_eq!(status, Status::Processing);

        let status: Status = serde_json::from_str(r#""on-hold""#).unwrap();
        assert_eq!(status, Status::Unknown);

        assert_eq!(Status::Deactivated.to_string(), "deactivated");
        assert!(Status::Revoked.is_final());
        assert!(!Status::Ready.is_final());
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new(Duration::from_secs(1))
            .with_initial_delay(Duration::from_secs(4))
            .with_max_delay(Duration::from_secs(10));

        assert_eq!(policy.next_delay(Duration::from_secs(4)), Duration::from_secs(8));
        assert_eq!(policy.next_delay(Duration::from_secs(8)), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn stops_at_final_status() {
        let script = Script::new(vec![
            (Status::Pending, None),
            (Status::Processing, Some(Duration::ZERO)),
            (Status::Valid, None),
        ]);
        let policy = RetryPolicy::new(Duration::from_secs(5))
            .with_initial_delay(Duration::from_millis(10));

        let status = poll_until(&script, Status::is_final, &policy).await.unwrap();
        assert_eq!(status, Status::Valid);
        assert_eq!(script.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn huge_retry_after_times_out() {
        let script = Script::new(vec![(
            Status::Processing,
            Some(Duration::from_secs(u64::MAX)),
        )]);
        let policy = RetryPolicy::new(Duration::from_secs(5));

        let err = poll_until(&script, Status::is_final, &policy).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Timeout {
                status: Status::Processing,
                ..
            }
        ));
        assert_eq!(script.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn huge_budget_still_polls() {
        let script = Script::new(vec![
            (Status::Processing, Some(Duration::ZERO)),
            (Status::Valid, None),
        ]);
        let policy = RetryPolicy::new(Duration::from_secs(u64::MAX));

        let status = poll_until(&script, Status::is_final, &policy).await.unwrap();
        assert_eq!(status, Status::Valid);
    }

    #[tokio::test]
    async fn stuck_resource_times_out_within_budget() {
        let script = Script::new(vec![(Status::Processing, None)]);
        let policy = RetryPolicy::new(Duration::from_millis(400))
            .with_initial_delay(Duration::from_millis(50));

        let start = std::time::Instant::now();
        let err = poll_until(&script, Status::is_final, &policy)
            .await
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_millis(600));
        assert!(matches!(
            err,
            Error::Timeout {
                status: Status::Processing,
                ..
            }
        ));
        assert!(script.polls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn retry_after_beyond_budget_times_out_at_once() {
        let script = Script::new(vec![(Status::Pending, Some(Duration::from_secs(3600)))]);
        let policy = RetryPolicy::new(Duration::from_secs(1));

        let start = std::time::Instant::now();
        let err = poll_until(&script, Status::is_final, &policy)
            .await
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(script.polls.load(Ordering::SeqCst), 1);
    }
}
