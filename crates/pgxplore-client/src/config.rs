use std::collections::BTreeMap;
use std::time::Duration;

/// Lower bound applied to configured rates so the pacing interval stays finite.
const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

/// Per-destination client configuration.
///
/// Values are supplied by the external settings loader at construction time
/// and are immutable afterwards; each client instance owns its own copy.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub requests_per_second: f64,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub base_retry_delay: Duration,
    pub default_headers: BTreeMap<String, String>,
    pub access_key: Option<String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut default_headers = BTreeMap::new();
        default_headers.insert(
            String::from("user-agent"),
            String::from("pgxplore-client/0.1.0"),
        );
        default_headers.insert(String::from("accept"), String::from("application/json"));

        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            requests_per_second: 10.0,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            base_retry_delay: Duration::from_secs(1),
            default_headers,
            access_key: None,
        }
    }

    pub fn with_requests_per_second(mut self, requests_per_second: f64) -> Self {
        self.requests_per_second = requests_per_second.max(MIN_REQUESTS_PER_SECOND);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay = delay.max(Duration::from_millis(1));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    /// Minimum spacing between successive dispatches at the configured rate.
    pub fn minimum_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.requests_per_second)
    }
}
