//! Shared fixtures for the behavior-driven integration tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use pgxplore_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use tokio::time::Instant;

/// Offline transport that replays a scripted sequence of responses and
/// records every request with its dispatch instant.
///
/// The last scripted entry repeats once the sequence is exhausted, so a
/// single entry models an upstream that always answers the same way.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<(Instant, HttpRequest)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn then_ok(self, response: HttpResponse) -> Self {
        self.script
            .lock()
            .expect("script should not be poisoned")
            .push_back(Ok(response));
        self
    }

    pub fn then_status(self, status: u16, body: &str) -> Self {
        self.then_ok(HttpResponse::status(status, body))
    }

    pub fn then_err(self, error: HttpError) -> Self {
        self.script
            .lock()
            .expect("script should not be poisoned")
            .push_back(Err(error));
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .expect("request log should not be poisoned")
            .len()
    }

    pub fn request_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("request log should not be poisoned")
            .iter()
            .map(|(_, request)| request.url.clone())
            .collect()
    }

    pub fn dispatch_instants(&self) -> Vec<Instant> {
        self.requests
            .lock()
            .expect("request log should not be poisoned")
            .iter()
            .map(|(instant, _)| *instant)
            .collect()
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ScriptedTransport {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.requests
            .lock()
            .expect("request log should not be poisoned")
            .push((Instant::now(), request));

        let response = {
            let mut script = self.script.lock().expect("script should not be poisoned");
            if script.len() > 1 {
                script.pop_front().expect("checked non-empty")
            } else {
                script
                    .front()
                    .cloned()
                    .unwrap_or_else(|| Ok(HttpResponse::ok_json("{}")))
            }
        };

        Box::pin(async move { response })
    }
}

/// Esearch-style JSON body with the given identifier list.
pub fn esearch_body(ids: &[&str]) -> String {
    let quoted: Vec<String> = ids.iter().map(|id| format!("\"{id}\"")).collect();
    format!(
        "{{\"esearchresult\": {{\"count\": \"{}\", \"idlist\": [{}]}}}}",
        ids.len(),
        quoted.join(", ")
    )
}
