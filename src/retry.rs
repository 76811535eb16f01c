//! Bounded retry loop with a fixed backoff.
//!
//! Only errors the caller classifies as retryable are retried. The wait goes
//! through `tokio::time::sleep`, so tests run it under a paused clock.

use std::{future::Future, time::Duration};

use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Extra attempts after the first one.
  pub max_retries: u32,
  /// Fixed wait before each retry.
  pub backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_retries: 3, backoff: Duration::from_secs(1) }
  }
}

impl RetryPolicy {
  pub fn new(max_retries: u32, backoff: Duration) -> Self {
    Self { max_retries, backoff }
  }

  /// Run `op` until it succeeds, fails with a non-retryable error, or the
  /// retry budget is spent. `op` receives the zero-based attempt number.
  pub async fn run<T, E, F, Fut>(&self, mut op: F, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
  where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
  {
    let mut attempt = 0;
    loop {
      match op(attempt).await {
        Ok(v) => return Ok(v),
        Err(e) if attempt < self.max_retries && is_retryable(&e) => {
          attempt += 1;
          debug!(target: "generation", attempt, max_retries = self.max_retries, backoff = ?self.backoff, error = %e, "retrying");
          tokio::time::sleep(self.backoff).await;
        }
        Err(e) => return Err(e),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[derive(Debug)]
  enum E {
    Flaky,
    Fatal,
  }

  impl std::fmt::Display for E {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      write!(f, "{self:?}")
    }
  }

  #[tokio::test(start_paused = true)]
  async fn retries_up_to_budget_with_fixed_backoff() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(3, Duration::from_secs(1));
    let start = tokio::time::Instant::now();

    let res: Result<(), E> = policy
      .run(
        |_| {
          calls.fetch_add(1, Ordering::SeqCst);
          async { Err(E::Flaky) }
        },
        |e| matches!(e, E::Flaky),
      )
      .await;

    assert!(res.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4));
  }

  #[tokio::test(start_paused = true)]
  async fn non_retryable_errors_stop_immediately() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::default();

    let res: Result<(), E> = policy
      .run(
        |_| {
          calls.fetch_add(1, Ordering::SeqCst);
          async { Err(E::Fatal) }
        },
        |e| matches!(e, E::Flaky),
      )
      .await;

    assert!(matches!(res, Err(E::Fatal)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn succeeds_after_transient_failures() {
    let policy = RetryPolicy::new(3, Duration::from_millis(10));
    let res: Result<u32, E> = policy
      .run(|attempt| async move { if attempt < 2 { Err(E::Flaky) } else { Ok(attempt) } }, |_| true)
      .await;
    assert_eq!(res.unwrap(), 2);
  }
}
