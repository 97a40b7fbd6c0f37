use std::time::Duration;

/// Settings for an [`HttpBatchStore`](crate::HttpBatchStore).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server URL, including any namespace path and query parameters such
    /// as `access_token`. Query parameters are kept on every request.
    pub base_url: String,
    /// Sent unchanged as the `Authorization` header when set.
    pub auth_header: Option<String>,
    /// Most hashes fetched by one `/getRefs` call.
    pub read_batch_size: usize,
    /// Writes accumulated before a `/writeValue` call is made without an
    /// explicit flush.
    pub write_batch_size: usize,
    pub read_queue_capacity: usize,
    pub write_queue_capacity: usize,
    /// Concurrent `/getRefs` calls in flight.
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
    /// Retries of idempotent requests after a transport failure.
    pub transport_retries: u32,
    /// Resends of a write batch the server pushed back on.
    pub backpressure_retries: u32,
    /// First backoff delay; doubles on every retry.
    pub retry_base_delay: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_auth_header(mut self, value: impl Into<String>) -> Self {
        self.auth_header = Some(value.into());
        self
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            auth_header: None,
            read_batch_size: 256,
            write_batch_size: 128,
            read_queue_capacity: 1024,
            write_queue_capacity: 1024,
            max_concurrent_requests: 8,
            request_timeout: Duration::from_secs(30),
            transport_retries: 3,
            backpressure_retries: 5,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}
