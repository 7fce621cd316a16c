//! Retry executor: one logical request, classified per failure class and
//! retried with bounded exponential backoff behind the pacing gate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, RetryReason};
use crate::http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
};
use crate::negotiate::{negotiate, FormatHint, Payload};
use crate::pacing::PacingGate;

/// One logical upstream call: endpoint, query parameters, and decode hint.
///
/// Query parameters keep insertion order so built URLs are stable for
/// scripted-transport assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub method: HttpMethod,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub format: FormatHint,
}

impl ApiCall {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
            format: FormatHint::Auto,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_format(mut self, format: FormatHint) -> Self {
        self.format = format;
        self
    }
}

/// Outcome of a single HTTP attempt, as seen by the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(HttpResponse),
    Retryable(RetryReason),
    Fatal(ApiError),
}

/// Executes logical requests against one destination.
///
/// Owns the destination's [`ClientConfig`] and [`PacingGate`]; the gate is
/// the only synchronization point shared by concurrent calls through one
/// executor. Sharing a global rate budget across several clients is done by
/// constructing them from one config, never implicitly.
pub struct RequestExecutor {
    config: ClientConfig,
    gate: PacingGate,
    transport: Arc<dyn HttpClient>,
}

impl RequestExecutor {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpClient>) -> Self {
        let gate = PacingGate::with_interval(config.minimum_interval());
        Self {
            config,
            gate,
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn build_url(&self, call: &ApiCall) -> String {
        let endpoint = call.endpoint.trim_start_matches('/');
        let mut url = format!("{}/{}", self.config.base_url, endpoint);
        for (index, (name, value)) in call.params.iter().enumerate() {
            let separator = if index == 0 { '?' } else { '&' };
            url.push(separator);
            url.push_str(&urlencoding::encode(name));
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    fn http_request(&self, call: &ApiCall, url: &str) -> HttpRequest {
        let mut request = HttpRequest::new(call.method, url)
            .with_timeout_ms(self.config.request_timeout.as_millis() as u64);
        for (name, value) in &self.config.default_headers {
            request = request.with_header(name, value);
        }
        for (name, value) in &call.headers {
            request = request.with_header(name, value);
        }
        if let Some(body) = &call.body {
            request = request.with_body(body.clone());
        }
        request
    }

    fn classify(&self, result: Result<HttpResponse, HttpError>, url: &str) -> AttemptOutcome {
        match result {
            Ok(response) if response.is_success() => AttemptOutcome::Success(response),
            Ok(response) if response.status == 404 => AttemptOutcome::Fatal(ApiError::NotFound {
                url: url.to_owned(),
            }),
            Ok(response) if response.status == 429 => {
                AttemptOutcome::Retryable(RetryReason::RateLimited)
            }
            Ok(response) if response.status >= 500 => {
                AttemptOutcome::Retryable(RetryReason::ServerError(response.status))
            }
            Ok(response) => AttemptOutcome::Fatal(ApiError::Http {
                destination: self.config.base_url.clone(),
                status: response.status,
                payload: response.body,
            }),
            Err(transport) if transport.retryable() => {
                AttemptOutcome::Retryable(RetryReason::Transport(transport.message().to_owned()))
            }
            Err(transport) => AttemptOutcome::Fatal(ApiError::Transport {
                destination: self.config.base_url.clone(),
                detail: transport.message().to_owned(),
            }),
        }
    }

    /// Executes the call without a cancellation signal.
    pub async fn execute(&self, call: ApiCall) -> Result<Payload, ApiError> {
        self.execute_cancellable(call, &CancellationToken::new())
            .await
    }

    /// Executes the call, aborting at the next suspension point once `cancel`
    /// fires. A cancelled call returns [`ApiError::Cancelled`] and consumes
    /// no retry budget.
    pub async fn execute_cancellable(
        &self,
        call: ApiCall,
        cancel: &CancellationToken,
    ) -> Result<Payload, ApiError> {
        let url = self.build_url(&call);
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                _ = self.gate.acquire() => {}
            }

            debug!(attempt, url = %url, "dispatching upstream request");
            let request = self.http_request(&call, &url);
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                result = self.transport.execute(request) => self.classify(result, &url),
            };

            match outcome {
                AttemptOutcome::Success(response) => {
                    debug!(attempt, url = %url, status = response.status, "upstream request succeeded");
                    return negotiate(&self.config.base_url, &response, call.format);
                }
                AttemptOutcome::Fatal(api_error) => {
                    error!(url = %url, error = %api_error, "upstream request failed");
                    return Err(api_error);
                }
                AttemptOutcome::Retryable(reason) => {
                    if attempt >= self.config.max_retries {
                        let api_error = ApiError::RetriesExhausted {
                            destination: self.config.base_url.clone(),
                            attempts: attempt + 1,
                            last: reason,
                        };
                        error!(url = %url, error = %api_error, "retry budget exhausted");
                        return Err(api_error);
                    }

                    let delay = backoff_delay(self.config.base_retry_delay, attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        url = %url,
                        "retrying upstream request"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Executes the call pinned to the JSON decoder and returns the tabular
    /// value.
    pub async fn get_json(&self, call: ApiCall) -> Result<serde_json::Value, ApiError> {
        match self.execute(call.with_format(FormatHint::Json)).await? {
            Payload::Json(value) => Ok(value),
            Payload::Document(_) => Err(self.unexpected_payload("JSON")),
        }
    }

    /// Executes the call pinned to the XML decoder and returns the document.
    pub async fn get_document(&self, call: ApiCall) -> Result<crate::document::Document, ApiError> {
        match self.execute(call.with_format(FormatHint::Xml)).await? {
            Payload::Document(document) => Ok(document),
            Payload::Json(_) => Err(self.unexpected_payload("XML")),
        }
    }

    fn unexpected_payload(&self, expected: &str) -> ApiError {
        ApiError::Parse {
            destination: self.config.base_url.clone(),
            detail: format!("expected {expected} payload"),
        }
    }
}

/// Backoff before retry number `attempt + 1`: the base delay doubled per
/// completed attempt, regardless of which failure class triggered it.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.checked_pow(attempt).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(base_url: &str) -> RequestExecutor {
        RequestExecutor::with_transport(
            ClientConfig::new(base_url),
            Arc::new(crate::http_client::NoopHttpClient),
        )
    }

    #[test]
    fn url_joins_base_and_endpoint_with_single_slash() {
        let executor = executor("https://rest.ensembl.org/");
        let call = ApiCall::get("/lookup/id/ENSG00000100197");
        assert_eq!(
            executor.build_url(&call),
            "https://rest.ensembl.org/lookup/id/ENSG00000100197"
        );
    }

    #[test]
    fn query_parameters_are_percent_encoded_in_order() {
        let executor = executor("https://eutils.ncbi.nlm.nih.gov/entrez/eutils");
        let call = ApiCall::get("/esearch.fcgi")
            .with_param("db", "clinvar")
            .with_param("term", "CYP2D6[gene] AND pathogenic[clin]");
        assert_eq!(
            executor.build_url(&call),
            "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi?db=clinvar&term=CYP2D6%5Bgene%5D%20AND%20pathogenic%5Bclin%5D"
        );
    }

    #[test]
    fn backoff_doubles_from_the_same_base() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(8));
    }

    #[test]
    fn classification_follows_the_failure_taxonomy() {
        let executor = executor("https://example.test");
        let url = "https://example.test/x";

        let ok = executor.classify(Ok(HttpResponse::ok_json("{}")), url);
        assert!(matches!(ok, AttemptOutcome::Success(_)));

        let not_found = executor.classify(Ok(HttpResponse::status(404, "")), url);
        assert!(matches!(
            not_found,
            AttemptOutcome::Fatal(ApiError::NotFound { .. })
        ));

        let limited = executor.classify(Ok(HttpResponse::status(429, "")), url);
        assert_eq!(limited, AttemptOutcome::Retryable(RetryReason::RateLimited));

        let upstream = executor.classify(Ok(HttpResponse::status(502, "")), url);
        assert_eq!(
            upstream,
            AttemptOutcome::Retryable(RetryReason::ServerError(502))
        );

        let other = executor.classify(Ok(HttpResponse::status(400, "bad allele")), url);
        match other {
            AttemptOutcome::Fatal(ApiError::Http { status, payload, .. }) => {
                assert_eq!(status, 400);
                assert_eq!(payload, "bad allele");
            }
            outcome => panic!("unexpected outcome: {outcome:?}"),
        }

        let transient = executor.classify(Err(HttpError::new("connection reset")), url);
        assert!(matches!(
            transient,
            AttemptOutcome::Retryable(RetryReason::Transport(_))
        ));

        let permanent = executor.classify(Err(HttpError::non_retryable("invalid request")), url);
        assert!(matches!(
            permanent,
            AttemptOutcome::Fatal(ApiError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn request_carries_default_and_per_call_headers() {
        let executor = RequestExecutor::with_transport(
            ClientConfig::new("https://example.test").with_header("accept", "application/json"),
            Arc::new(crate::http_client::NoopHttpClient),
        );
        let call = ApiCall::get("/ping").with_header("x-trace", "abc");
        let request = executor.http_request(&call, "https://example.test/ping");

        assert_eq!(
            request.headers.get("accept").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(
            request.headers.get("x-trace").map(String::as_str),
            Some("abc")
        );
        assert_eq!(request.timeout_ms, 30_000);
    }
}
