/*!

Bounded polling of an external condition. A [`Poll`] re-runs a check at a fixed interval until the
check reports success or the timeout elapses. Only the observation is retried; whatever operation
produced the condition is never repeated.

!*/

use crate::error::{self, Result};
use log::{debug, trace};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Timeout and interval for repeatedly checking a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    timeout: Duration,
    interval: Duration,
}

impl Poll {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Create a `Poll` whose timeout is multiplied by `scale`. A `scale` of zero is treated as one.
    pub fn scaled(timeout: Duration, interval: Duration, scale: u32) -> Self {
        Self::new(timeout.saturating_mul(scale.max(1)), interval)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `check` until it returns `Ok(Some(_))`. `Ok(None)` and `Err(_)` both mean the condition
    /// does not hold yet; errors are remembered so the timeout error can report the last one. The
    /// first check runs immediately. When `timeout` elapses the in-flight check is dropped and
    /// `Error::Timeout` is returned.
    pub async fn until<F, Fut, T, E>(&self, what: &str, mut check: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: Display,
    {
        let mut last_error = None;
        let polling = async {
            loop {
                match check().await {
                    Ok(Some(value)) => return value,
                    Ok(None) => trace!("{} is not ready yet", what),
                    Err(e) => {
                        debug!("Check for {} failed: {}", what, e);
                        last_error = Some(e.to_string());
                    }
                }
                tokio::time::sleep(self.interval).await;
            }
        };
        let outcome = tokio::time::timeout(self.timeout, polling).await;
        match outcome {
            Ok(value) => Ok(value),
            Err(_) => error::TimeoutSnafu {
                what,
                timeout: self.timeout,
                last_error,
            }
            .fail(),
        }
    }

    /// Re-read a text with `read` until it contains `needle` and return the text that matched.
    /// The whole text is read on every iteration, so `needle` must stay present once it has
    /// appeared.
    pub async fn until_contains<F, Fut, E>(
        &self,
        what: &str,
        needle: &str,
        mut read: F,
    ) -> Result<String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<String, E>>,
        E: Display,
    {
        self.until(what, move || {
            let text = read();
            async move {
                text.await
                    .map(|text| if text.contains(needle) { Some(text) } else { None })
            }
        })
        .await
    }
}
