//! Rate-limit backoff loop.
//!
//! A 429 is retried after the advertised `Retry-After` delay, with no upper
//! bound on the number of retries. The sleep is injected through [`Sleeper`]
//! so tests never wait on a real clock.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::provider::FetchError;

const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Lower bound on a single backoff wait. `Retry-After: 0` would otherwise
/// turn the loop into a hot retry.
const MIN_RETRY_WAIT: Duration = Duration::from_secs(1);

/// Suspension dependency for the backoff loop.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, wait: Duration);
}

/// Production sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, wait: Duration) {
        tokio::time::sleep(wait).await;
    }
}

/// The parts of an HTTP response the backoff loop and decoder need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Raw `Retry-After` header value, if present.
    pub retry_after: Option<String>,
    pub body: String,
}

/// Parse a delta-seconds `Retry-After` value. HTTP-date values are not
/// accepted.
pub fn parse_retry_after(raw: Option<&str>) -> Option<Duration> {
    let secs: u64 = raw?.trim().parse().ok()?;
    Some(Duration::from_secs(secs).max(MIN_RETRY_WAIT))
}

/// Issue `send` until the response is anything other than a 429.
///
/// Each retry re-issues the identical request and is gated by the advertised
/// wait. A 429 without a parseable `Retry-After` fails with
/// [`FetchError::RateLimited`]. Transport errors propagate immediately.
pub async fn send_with_backoff<F, Fut>(
    sleeper: &dyn Sleeper,
    mut send: F,
) -> Result<RawResponse, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RawResponse, FetchError>>,
{
    let mut attempt: u32 = 0;
    loop {
        let resp = send().await?;
        if resp.status != STATUS_TOO_MANY_REQUESTS {
            return Ok(resp);
        }

        attempt = attempt.saturating_add(1);
        let wait = parse_retry_after(resp.retry_after.as_deref()).ok_or_else(|| {
            FetchError::RateLimited {
                retry_after: resp.retry_after.clone(),
            }
        })?;

        warn!(
            attempt,
            wait_secs = wait.as_secs(),
            "upstream rate limited; backing off before retry"
        );
        sleeper.sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    #[async_trait::async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, wait: Duration) {
            self.waits.lock().unwrap().push(wait);
        }
    }

    fn resp(status: u16, retry_after: Option<&str>, body: &str) -> RawResponse {
        RawResponse {
            status,
            retry_after: retry_after.map(str::to_string),
            body: body.to_string(),
        }
    }

    async fn run_script(
        sleeper: &RecordingSleeper,
        script: Vec<Result<RawResponse, FetchError>>,
    ) -> (Result<RawResponse, FetchError>, usize) {
        let script = Mutex::new(VecDeque::from(script));
        let calls = Mutex::new(0_usize);
        let out = send_with_backoff(sleeper, || {
            *calls.lock().unwrap() += 1;
            let next = script
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted");
            async move { next }
        })
        .await;
        let n = *calls.lock().unwrap();
        (out, n)
    }

    #[tokio::test]
    async fn success_without_rate_limit_does_not_sleep() {
        let sleeper = RecordingSleeper::default();
        let (out, calls) = run_script(&sleeper, vec![Ok(resp(200, None, "[]"))]).await;
        assert_eq!(out.unwrap().body, "[]");
        assert_eq!(calls, 1);
        assert!(sleeper.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_after_gates_each_retry() {
        let sleeper = RecordingSleeper::default();
        let (out, calls) = run_script(
            &sleeper,
            vec![
                Ok(resp(429, Some("2"), "")),
                Ok(resp(429, Some("5"), "")),
                Ok(resp(200, None, "[]")),
            ],
        )
        .await;
        assert_eq!(out.unwrap().status, 200);
        assert_eq!(calls, 3);
        assert_eq!(
            *sleeper.waits.lock().unwrap(),
            vec![Duration::from_secs(2), Duration::from_secs(5)]
        );
    }

    #[tokio::test]
    async fn missing_retry_after_is_terminal() {
        let sleeper = RecordingSleeper::default();
        let (out, calls) = run_script(&sleeper, vec![Ok(resp(429, None, ""))]).await;
        assert_eq!(out.unwrap_err(), FetchError::RateLimited { retry_after: None });
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn non_rate_limit_failure_is_returned_unretried() {
        let sleeper = RecordingSleeper::default();
        let (out, calls) = run_script(&sleeper, vec![Ok(resp(500, None, "boom"))]).await;
        assert_eq!(out.unwrap().status, 500);
        assert_eq!(calls, 1);
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(parse_retry_after(Some("2")), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(Some(" 30 ")), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(Some("0")), Some(MIN_RETRY_WAIT));
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
