//! StateChangeConf - poll a refresh function until a target state is reached
//!
//! The refresh function returns `Ok(None)` when the object cannot be found,
//! and `Ok(Some((value, state)))` otherwise. States are classified into
//! pending and target sets; anything else is unexpected.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::errors::{AivenError, Result};

pub const DEFAULT_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_MIN_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const NOT_FOUND_CHECKS: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("unexpected state '{state}', wanted target '{}'", .target.join(", "))]
    UnexpectedState { state: String, target: Vec<String> },

    #[error("timeout while waiting for state to become '{}' (last state: '{last_state}', timeout: {timeout:?})", .target.join(", "))]
    Timeout {
        last_state: String,
        target: Vec<String>,
        timeout: Duration,
    },

    #[error("couldn't find resource ({checks} retries)")]
    NotFound { checks: u32 },
}

#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    /// Wait before the first refresh
    pub delay: Duration,
    pub timeout: Duration,
    /// Smallest wait between refreshes
    pub min_timeout: Duration,
    /// Fixed wait between refreshes, overriding the backoff
    pub poll_interval: Option<Duration>,
    /// Number of target observations in a row required to finish
    pub continuous_target_occurrence: u32,
    pub not_found_checks: u32,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            delay: DEFAULT_DELAY,
            timeout,
            min_timeout: DEFAULT_MIN_TIMEOUT,
            poll_interval: None,
            continuous_target_occurrence: 1,
            not_found_checks: NOT_FOUND_CHECKS,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_continuous_target_occurrence(mut self, n: u32) -> Self {
        self.continuous_target_occurrence = n.max(1);
        self
    }

    /// Poll `refresh` until a target state has been seen enough times in a row
    ///
    /// With an empty target set, the object disappearing counts as reaching
    /// the target and `T::default()` is returned.
    pub async fn wait<T, F, Fut>(&self, mut refresh: F) -> Result<T>
    where
        T: Default,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<(T, String)>>>,
    {
        log::debug!(
            "waiting for state to become '{}' (timeout: {:?})",
            self.target.join(", "),
            self.timeout
        );

        let mut last_state = String::new();
        match tokio::time::timeout(self.timeout, self.poll(&mut refresh, &mut last_state)).await {
            Ok(result) => result,
            Err(_) => Err(WaitError::Timeout {
                last_state,
                target: self.target.clone(),
                timeout: self.timeout,
            }
            .into()),
        }
    }

    async fn poll<T, F, Fut>(&self, refresh: &mut F, last_state: &mut String) -> Result<T>
    where
        T: Default,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<(T, String)>>>,
    {
        tokio::time::sleep(self.delay).await;

        let mut wait = Duration::ZERO;
        let mut not_found_ticks = 0;
        let mut target_occurrence = 0;

        loop {
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            wait = self.next_wait(wait);

            match refresh().await? {
                None => {
                    if self.target.is_empty() {
                        target_occurrence += 1;
                        if target_occurrence >= self.continuous_target_occurrence {
                            return Ok(T::default());
                        }
                        continue;
                    }
                    not_found_ticks += 1;
                    if not_found_ticks > self.not_found_checks {
                        return Err(WaitError::NotFound {
                            checks: not_found_ticks,
                        }
                        .into());
                    }
                }
                Some((value, state)) => {
                    not_found_ticks = 0;
                    log::debug!("refresh returned state '{}'", state);
                    *last_state = state.clone();

                    if self.target.contains(&state) {
                        target_occurrence += 1;
                        if target_occurrence >= self.continuous_target_occurrence {
                            return Ok(value);
                        }
                        continue;
                    }

                    if self.pending.contains(&state) {
                        target_occurrence = 0;
                    } else if !self.pending.is_empty() {
                        return Err(WaitError::UnexpectedState {
                            state,
                            target: self.target.clone(),
                        }
                        .into());
                    }
                }
            }
        }
    }

    fn next_wait(&self, current: Duration) -> Duration {
        if let Some(interval) = self.poll_interval {
            return interval;
        }
        (current * 2).clamp(self.min_timeout, MAX_BACKOFF.max(self.min_timeout))
    }
}

/// Run `op` until it succeeds, fails with an error `retryable` rejects, or
/// `timeout` elapses; the last error is returned on timeout.
pub async fn retry<T, F, Fut, R>(
    timeout: Duration,
    interval: Duration,
    retryable: R,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    R: Fn(&AivenError) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) && tokio::time::Instant::now() + interval < deadline => {
                log::debug!("retrying after error: {}", e);
                tokio::time::sleep(interval).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn fast(pending: &[&str], target: &[&str]) -> StateChangeConf {
        StateChangeConf::new(pending, target, Duration::from_secs(5))
            .with_delay(Duration::ZERO)
            .with_min_timeout(Duration::from_millis(1))
            .with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn reaches_target_after_pending() {
        let states = Mutex::new(vec!["APPROVED", "APPROVED", "ACTIVE"].into_iter());
        let conf = fast(&["APPROVED"], &["ACTIVE"]);

        let result = conf
            .wait(|| {
                let state = states.lock().unwrap().next().unwrap_or("ACTIVE");
                async move { Ok(Some((state.len(), state.to_string()))) }
            })
            .await
            .unwrap();
        assert_eq!(result, "ACTIVE".len());
    }

    #[tokio::test]
    async fn continuous_target_resets_on_pending() {
        let seen = Mutex::new(0);
        let sequence = ["RUNNING", "REBUILDING", "RUNNING", "RUNNING", "RUNNING"];
        let conf = fast(&["REBUILDING"], &["RUNNING"]).with_continuous_target_occurrence(3);

        conf.wait(|| {
            let mut n = seen.lock().unwrap();
            let state = sequence[(*n).min(sequence.len() - 1)];
            *n += 1;
            async move { Ok(Some(((), state.to_string()))) }
        })
        .await
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), 5);
    }

    #[tokio::test]
    async fn unexpected_state_errors() {
        let conf = fast(&["APPROVED"], &["ACTIVE"]);
        let err = conf
            .wait(|| async { Ok(Some(((), "REJECTED".to_string()))) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AivenError::Wait(WaitError::UnexpectedState { ref state, .. }) if state == "REJECTED"
        ));
    }

    #[tokio::test]
    async fn times_out_with_last_state() {
        let conf = StateChangeConf::new(&["deleting"], &["deleted"], Duration::from_millis(50))
            .with_delay(Duration::ZERO)
            .with_poll_interval(Duration::from_millis(5));
        let err = conf
            .wait(|| async { Ok(Some(((), "deleting".to_string()))) })
            .await
            .unwrap_err();
        match err {
            AivenError::Wait(WaitError::Timeout { last_state, .. }) => {
                assert_eq!(last_state, "deleting")
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn not_found_is_counted() {
        let mut conf = fast(&["APPROVED"], &["ACTIVE"]);
        conf.not_found_checks = 2;
        let err = conf
            .wait(|| async { Ok(None::<((), String)>) })
            .await
            .unwrap_err();
        assert!(matches!(err, AivenError::Wait(WaitError::NotFound { checks: 3 })));
    }

    #[tokio::test]
    async fn empty_target_accepts_disappearance() {
        let conf = fast(&["deleting"], &[]);
        let value: Option<String> = conf.wait(|| async { Ok(None) }).await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn refresh_errors_propagate() {
        let conf = fast(&["APPROVED"], &["ACTIVE"]);
        let err = conf
            .wait(|| async { Err::<Option<((), String)>, _>(AivenError::Other("boom".to_string())) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn retry_stops_on_fatal_error() {
        let calls = Mutex::new(0);
        let err = retry(
            Duration::from_secs(5),
            Duration::from_millis(1),
            |e| e.to_string().contains("busy"),
            || {
                let mut n = calls.lock().unwrap();
                *n += 1;
                let msg = if *n < 3 { "busy" } else { "fatal" };
                async move { Err::<(), _>(AivenError::Other(msg.to_string())) }
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "fatal");
        assert_eq!(*calls.lock().unwrap(), 3);
    }
}
