use std::future::Future;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// How many times a failed request is repeated. Retries are immediate:
/// there is no backoff and credentials are not refreshed in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

/// Run `operation`, repeating it while `classifier` says `Retry` and the
/// policy has retries left.
///
/// Returns the first `Ok`, the error the classifier aborted on, or the last
/// error once retries are exhausted. The attempt number (0 = first try) is
/// passed to `operation` so callers can log or tag the retry.
pub async fn retry<F, Fut, T, E, C>(policy: RetryPolicy, classifier: C, operation: F) -> Result<T, E>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if classifier(&e) == RetryAction::Abort || attempt >= policy.max_retries {
                    return Err(e);
                }
                tracing::debug!(
                    "Request failed (attempt {}/{}), retrying: {}",
                    attempt + 1,
                    policy.max_retries + 1,
                    e
                );
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_policy_retries_once() {
        assert_eq!(RetryPolicy::default().max_retries, 1);
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, String> =
            retry(RetryPolicy::default(), |_| RetryAction::Retry, |_| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_abort_skips_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = calls.clone();
        let result: Result<i32, String> = retry(
            RetryPolicy::default(),
            |_| RetryAction::Abort,
            |_| {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err("fatal".to_string())
                }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "fatal");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_attempt_result_is_returned() {
        let result: Result<u32, String> = retry(
            RetryPolicy::default(),
            |_| RetryAction::Retry,
            |attempt| async move {
                if attempt == 0 {
                    Err("transient".to_string())
                } else {
                    Ok(attempt)
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_exactly_one_retry_then_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = calls.clone();
        let result: Result<i32, String> = retry(
            RetryPolicy::default(),
            |_| RetryAction::Retry,
            |attempt| {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err(format!("failure {attempt}"))
                }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "failure 1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let cc = calls.clone();
        let _: Result<(), String> = retry(
            RetryPolicy { max_retries: 0 },
            |_| RetryAction::Retry,
            |_| {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err("nope".to_string())
                }
            },
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
