//! Retry with exponential backoff for idempotent requests.
//!
//! Only transport failures are retried. Status codes are the caller's
//! business.

use std::future::Future;

use crate::config::ClientConfig;

pub(crate) async fn retry_send<F, Fut>(
    config: &ClientConfig,
    endpoint: &str,
    f: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..config.transport_retries {
        match f().await {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                let delay = config.backoff(attempt);
                tracing::warn!(
                    endpoint,
                    attempt = attempt + 1,
                    max_retries = config.transport_retries,
                    "request failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    f().await
}
