//! Polls a resource until its status reaches an accepted value.
//!
//! Every lifecycle wait in the stores funnels through [`StatusWaiter`], which
//! polls immediately, then at a fixed interval until a deadline passes. Fetch
//! failures abort the wait straight away; only status mismatches are retried.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Default delay between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A resource exposing a lifecycle status string.
pub trait Observed {
    /// Returns the current status as reported by the backend.
    fn status(&self) -> &str;
}

/// Errors raised while waiting on a resource.
#[derive(Debug, Error)]
pub enum WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when fetching the resource fails.
    #[error("failed to fetch {id} while waiting")]
    Fetch {
        /// Identifier of the awaited resource.
        id: String,
        /// Error returned by the fetch.
        #[source]
        source: E,
    },
    /// Raised when the deadline passes before an accepted status is seen.
    #[error(
        "timed out after {timeout:?} waiting for {id} to reach {expected}, last status: {}",
        .last_status.as_deref().unwrap_or("unknown")
    )]
    Timeout {
        /// Identifier of the awaited resource.
        id: String,
        /// Accepted statuses joined with `|`.
        expected: String,
        /// Last status observed before the deadline.
        last_status: Option<String>,
        /// Configured timeout.
        timeout: Duration,
    },
}

impl<E> WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns `true` when the wait ended because the deadline passed.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Deadline-bounded poller for resource statuses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusWaiter {
    timeout: Duration,
    poll_interval: Duration,
}

impl StatusWaiter {
    /// Creates a waiter with the given timeout and the default poll interval.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the delay between polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Polls `fetch` until the resource reports one of `accepted`.
    ///
    /// The first poll happens immediately. A zero timeout still performs that
    /// single poll. The final sleep is clipped to the remaining time so the
    /// wait never overshoots the deadline by more than one fetch.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Fetch`] as soon as a fetch fails and
    /// [`WaitError::Timeout`] once the deadline passes.
    pub async fn wait_for<R, E, F, Fut>(
        &self,
        id: &str,
        accepted: &[&str],
        mut fetch: F,
    ) -> Result<R, WaitError<E>>
    where
        R: Observed,
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut last_status = None;
        loop {
            let resource = fetch().await.map_err(|source| WaitError::Fetch {
                id: id.to_owned(),
                source,
            })?;
            let status = resource.status();
            if accepted.contains(&status) {
                return Ok(resource);
            }
            if last_status.as_deref() != Some(status) {
                debug!(id, status, expected = ?accepted, "waiting for status change");
                last_status = Some(status.to_owned());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::Timeout {
                    id: id.to_owned(),
                    expected: accepted.join("|"),
                    last_status,
                    timeout: self.timeout,
                });
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Polls `fetch` until `is_gone` classifies its error as the resource
    /// having disappeared.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Fetch`] for errors `is_gone` rejects and
    /// [`WaitError::Timeout`] while the resource remains visible past the
    /// deadline.
    pub async fn wait_for_absence<R, E, F, Fut, G>(
        &self,
        id: &str,
        mut fetch: F,
        is_gone: G,
    ) -> Result<(), WaitError<E>>
    where
        R: Observed,
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        G: Fn(&E) -> bool,
    {
        let deadline = Instant::now() + self.timeout;
        loop {
            let last_status = match fetch().await {
                Ok(resource) => resource.status().to_owned(),
                Err(err) if is_gone(&err) => return Ok(()),
                Err(source) => {
                    return Err(WaitError::Fetch {
                        id: id.to_owned(),
                        source,
                    });
                }
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::Timeout {
                    id: id.to_owned(),
                    expected: String::from("deleted"),
                    last_status: Some(last_status),
                    timeout: self.timeout,
                });
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
