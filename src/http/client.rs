use super::debug::{Direction, HttpDebugConfig, debug_lines, redact_url};
use crate::trace::SessionTrace;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// Model-facing HTTP client. Every exchange can be echoed to stderr (redacted)
/// and recorded verbatim in the session trace.
#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
    debug: HttpDebugConfig,
    sink: LogSink,
    trace: Option<SessionTrace>,
}

#[derive(Clone)]
enum LogSink {
    Stderr,
    #[cfg(test)]
    Buffer(Arc<Mutex<Vec<String>>>),
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("debug", &self.debug)
            .field("traced", &self.trace.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponseData {
    pub status: u16,
    pub body: String,
}

impl HttpClient {
    pub fn new(inner: Client, debug: HttpDebugConfig) -> Self {
        Self {
            inner,
            debug,
            sink: LogSink::Stderr,
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: SessionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Posts `payload` as JSON. Non-2xx statuses are returned as data; only
    /// transport failures are errors.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        bearer_token: Option<&str>,
        payload: &T,
    ) -> Result<HttpResponseData, reqwest::Error> {
        let mut builder = self.inner.post(url).json(payload);
        if let Some(token) = bearer_token {
            builder = builder.bearer_auth(token);
        }
        let request = builder.build()?;
        let body_text = serde_json::to_string(payload)
            .unwrap_or_else(|err| format!("{{\"_serialization_error\":\"{err}\"}}"));

        let shown_url = redact_url(request.url(), self.debug.redact_secrets);
        self.record(
            Direction::Request,
            &format!("{} {shown_url}", request.method()),
            &format!("{} {}", request.method(), request.url()),
            request.headers(),
            &body_text,
        );

        let response = match self.inner.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                if let Some(trace) = &self.trace {
                    trace.log_http_error(&err.to_string());
                }
                return Err(err);
            }
        };
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        let start_line = format!("HTTP {status}");
        self.record(Direction::Response, &start_line, &start_line, &headers, &body);

        Ok(HttpResponseData { status, body })
    }

    /// `shown_start` goes to the debug log, `raw_start` to the trace.
    fn record(
        &self,
        direction: Direction,
        shown_start: &str,
        raw_start: &str,
        headers: &HeaderMap,
        body: &str,
    ) {
        if self.debug.enabled {
            for line in debug_lines(self.debug, direction, shown_start, headers, body) {
                self.emit(line);
            }
        }
        if let Some(trace) = &self.trace {
            trace.log_http(direction, raw_start, headers, body);
        }
    }

    fn emit(&self, line: String) {
        match &self.sink {
            LogSink::Stderr => {
                let _ = writeln!(io::stderr().lock(), "{line}");
            }
            #[cfg(test)]
            LogSink::Buffer(buffer) => {
                if let Ok(mut lines) = buffer.lock() {
                    lines.push(line);
                }
            }
        }
    }

    #[cfg(test)]
    pub fn with_buffer_sink(
        inner: Client,
        debug: HttpDebugConfig,
    ) -> (Self, Arc<Mutex<Vec<String>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let client = Self {
            inner,
            debug,
            sink: LogSink::Buffer(Arc::clone(&buffer)),
            trace: None,
        };
        (client, buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpClient, HttpResponseData};
    use crate::http::debug::HttpDebugConfig;
    use crate::trace::SessionTrace;
    use reqwest::Client;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn post_json_logs_redacted_request_and_response_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer super-secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_json(json!({"api_key":"response-secret","ok":true})),
            )
            .mount(&server)
            .await;

        let (client, logs) = HttpClient::with_buffer_sink(
            Client::new(),
            HttpDebugConfig {
                enabled: true,
                redact_secrets: true,
                max_body_chars: 4_000,
            },
        );

        let response = client
            .post_json(
                &format!("{}/v1/chat/completions", server.uri()),
                Some("super-secret"),
                &json!({"token":"request-secret"}),
            )
            .await
            .expect("request should succeed");

        assert_eq!(
            response,
            HttpResponseData {
                status: 200,
                body: "{\"api_key\":\"response-secret\",\"ok\":true}".to_string(),
            }
        );

        let logged = logs.lock().expect("logs lock").join("\n");
        assert!(logged.contains("[http-debug] > POST"));
        assert!(logged.contains("[http-debug] < HTTP 200"));
        assert!(logged.contains("authorization: ***REDACTED***"));
        assert!(!logged.contains("super-secret"));
        assert!(!logged.contains("request-secret"));
        assert!(!logged.contains("response-secret"));
    }

    #[tokio::test]
    async fn post_json_without_token_sends_no_authorization_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok":true})))
            .mount(&server)
            .await;

        let (client, logs) =
            HttpClient::with_buffer_sink(Client::new(), HttpDebugConfig::disabled());

        let response = client
            .post_json(&format!("{}/chat", server.uri()), None, &json!({"query":"hi"}))
            .await
            .expect("request should succeed");
        assert_eq!(response.status, 200);

        let requests = server.received_requests().await.expect("recorded requests");
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));
        assert!(logs.lock().expect("logs lock").is_empty());
    }

    #[tokio::test]
    async fn post_json_returns_non_success_status_as_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let client = HttpClient::new(Client::new(), HttpDebugConfig::disabled());
        let response = client
            .post_json(&server.uri(), None, &json!({}))
            .await
            .expect("transport succeeds");

        assert_eq!(
            response,
            HttpResponseData {
                status: 503,
                body: "busy".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn post_json_writes_full_raw_http_trace_when_trace_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-api-key", "response-secret")
                    .set_body_json(json!({"api_key":"response-secret","ok":true})),
            )
            .mount(&server)
            .await;

        let dir = tempdir().expect("tempdir");
        let trace = SessionTrace::create_in_temp_dir("test-session", dir.path()).expect("trace");
        let trace_file = trace.file_path().to_path_buf();

        let client =
            HttpClient::new(Client::new(), HttpDebugConfig::disabled()).with_trace(trace.clone());

        let response = client
            .post_json(
                &format!("{}/v1/chat/completions", server.uri()),
                Some("super-secret"),
                &json!({"token":"request-secret"}),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status, 200);
        let trace_text = fs::read_to_string(trace_file).expect("read trace file");

        assert!(trace_text.contains("authorization: Bearer super-secret"));
        assert!(trace_text.contains("\"token\":\"request-secret\""));
        assert!(trace_text.contains("x-api-key: response-secret"));
        assert!(trace_text.contains("\"api_key\":\"response-secret\""));
    }

    #[tokio::test]
    async fn debug_log_truncates_long_response_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "{\"message\":\"abcdefghijklmnopqrstuvwxyz\"}",
                    "application/json",
                ),
            )
            .mount(&server)
            .await;

        let (client, logs) = HttpClient::with_buffer_sink(
            Client::new(),
            HttpDebugConfig {
                enabled: true,
                redact_secrets: true,
                max_body_chars: 24,
            },
        );
        client
            .post_json(&server.uri(), None, &json!({"model": "m"}))
            .await
            .expect("request should succeed");

        let logged = logs.lock().expect("logs lock").clone();
        assert!(logged.contains(&"[http-debug] > {\"model\":\"m\"}".to_string()));
        assert!(logged.contains(
            &"[http-debug] < {\"message\":\"abcdefghijkl... <truncated 16 chars>".to_string()
        ));
    }
}
