//! Authenticated backend client.
//!
//! Owns the 5xx retry loop and the translation of HTTP outcomes into the
//! typed [`AppError`] taxonomy. Holds no mutable state, so one instance can
//! be shared across tasks behind an `Arc`.

use crate::config::{AuthMode, ClientConfig};
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::stream::{decode_completion_stream, AppByteStream, CompletionStream};
use crate::transport::{
    with_read_timeout, HttpTransport, Method, Transport, TransportError, TransportRequest,
    TransportResponse,
};
use futures::StreamExt;
use ragent_core::{AppError, AppResult};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// `retry_after` used when a 429 carries no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Client for the retrieval/completion backend.
#[derive(Clone)]
pub struct BackendClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Create a client over real HTTP.
    pub fn new(config: ClientConfig) -> AppResult<Self> {
        let transport = HttpTransport::new()?;
        Ok(Self::with_transport(
            config,
            Arc::new(transport),
            Arc::new(TokioSleeper),
        ))
    }

    /// Create a client over an arbitrary transport and sleeper.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config,
            transport,
            sleeper,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a JSON request and return the parsed JSON body.
    ///
    /// # Errors
    /// - `Api` for 4xx, and for 5xx once every attempt failed
    /// - `RateLimit` for 429 (never retried here)
    /// - `Timeout` / `Connection` for transport failures (never retried here)
    /// - `Serialization` when a 2xx body is not JSON
    #[instrument(skip(self, query, body))]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        auth: AuthMode,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> AppResult<Value> {
        let operation = operation(method, path);
        let request = self.build_request(method, path, auth, query, body, true);
        let response = self.execute(request, &operation).await?;

        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e, &operation))?;

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            AppError::Serialization(format!("Invalid JSON from {}: {}", operation, e))
        })
    }

    pub async fn get(&self, path: &str, auth: AuthMode, query: &[(&str, String)]) -> AppResult<Value> {
        self.request(Method::Get, path, auth, query, None).await
    }

    pub async fn post(&self, path: &str, auth: AuthMode, body: Value) -> AppResult<Value> {
        self.request(Method::Post, path, auth, &[], Some(body)).await
    }

    pub async fn put(&self, path: &str, auth: AuthMode, body: Value) -> AppResult<Value> {
        self.request(Method::Put, path, auth, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str, auth: AuthMode, body: Value) -> AppResult<Value> {
        self.request(Method::Delete, path, auth, &[], Some(body)).await
    }

    /// POST a request whose response is a stream of completion frames.
    ///
    /// Status classification and 5xx retries happen before the first
    /// frame; once streaming starts, the connection is held only while
    /// the returned stream is polled. The configured timeout bounds the
    /// wait for response headers and for each body read.
    #[instrument(skip(self, body))]
    pub async fn stream(&self, path: &str, auth: AuthMode, body: Value) -> AppResult<CompletionStream> {
        let operation = operation(Method::Post, path);
        let request = self.build_request(Method::Post, path, auth, &[], Some(body), false);
        let response = self.execute(request, &operation).await?;

        let base_url = self.config.base_url().to_string();
        let timeout = self.config.timeout;
        let body = with_read_timeout(response.body, timeout);
        let bytes: AppByteStream = Box::pin(body.map(move |chunk| {
            chunk.map_err(|e| map_transport_error(e, &base_url, timeout, &operation))
        }));

        Ok(decode_completion_stream(bytes))
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        auth: AuthMode,
        query: &[(&str, String)],
        body: Option<Value>,
        bounded: bool,
    ) -> TransportRequest {
        let mut headers = vec![(
            "Authorization".to_string(),
            self.config.authorization(auth),
        )];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        TransportRequest {
            method,
            url: format!("{}{}", self.config.base_url(), path),
            headers,
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            body,
            timeout: bounded.then_some(self.config.timeout),
        }
    }

    /// Send with bounded retries on 5xx and classify the final outcome.
    async fn execute(
        &self,
        request: TransportRequest,
        operation: &str,
    ) -> AppResult<TransportResponse> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("{} (attempt {}/{})", operation, attempt, max_attempts);

            // Streams carry no whole-request timeout, so the wait for
            // response headers is bounded here for every request.
            let send = self.transport.send(request.clone());
            let response = tokio::time::timeout(self.config.timeout, send)
                .await
                .unwrap_or(Err(TransportError::Timeout))
                .map_err(|e| self.transport_error(e, operation))?;

            let status = response.status;

            if (500..600).contains(&status) {
                if attempt < max_attempts {
                    warn!(
                        "{} returned {} (attempt {}/{}), retrying in {}ms",
                        operation,
                        status,
                        attempt,
                        max_attempts,
                        self.config.retry_delay.as_millis()
                    );
                    self.sleeper.sleep(self.config.retry_delay).await;
                    continue;
                }

                let body = response.text().await.unwrap_or_default();
                warn!("{} failed with {} after {} attempts", operation, status, attempt);
                return Err(api_error(status, &body));
            }

            if status == 429 {
                let retry_after = parse_retry_after(response.header("retry-after"));
                warn!("{} rate limited, retry after {}s", operation, retry_after);
                return Err(AppError::RateLimit { retry_after });
            }

            if status >= 400 {
                let body = response.text().await.unwrap_or_default();
                return Err(api_error(status, &body));
            }

            return Ok(response);
        }
    }

    fn transport_error(&self, err: TransportError, operation: &str) -> AppError {
        map_transport_error(err, self.config.base_url(), self.config.timeout, operation)
    }
}

fn operation(method: Method, path: &str) -> String {
    format!("{} {}", method.as_str(), path)
}

fn map_transport_error(
    err: TransportError,
    base_url: &str,
    timeout: Duration,
    operation: &str,
) -> AppError {
    match err {
        TransportError::Timeout => AppError::Timeout {
            timeout,
            operation: operation.to_string(),
        },
        TransportError::Connect(cause) | TransportError::Other(cause) => AppError::Connection {
            base_url: base_url.to_string(),
            cause,
        },
    }
}

/// Integer seconds from a `Retry-After` header, or the default.
pub fn parse_retry_after(header: Option<&str>) -> u64 {
    header
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Build an API error, lifting `code`/`message` out of a JSON body.
fn api_error(status: u16, body: &str) -> AppError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error_code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_i64);
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status_reason(status).to_string());

    AppError::Api {
        status_code: status,
        error_code,
        message,
        body: (!body.trim().is_empty()).then(|| body.to_string()),
    }
}

fn status_reason(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Request failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleeper::RecordingSleeper;
    use crate::stream::CompletionEvent;
    use crate::transport::{MockReply, MockTransport};
    use futures::TryStreamExt;
    use serde_json::json;

    fn client_with(
        replies: Vec<MockReply>,
    ) -> (BackendClient, Arc<MockTransport>, Arc<RecordingSleeper>) {
        let transport = Arc::new(MockTransport::with_replies(replies));
        let sleeper = Arc::new(RecordingSleeper::new());
        let config = ClientConfig::new("http://ragflow.local/", "api-key", "login-token")
            .unwrap()
            .with_retry(3, Duration::from_millis(500));
        let client = BackendClient::with_transport(config, transport.clone(), sleeper.clone());
        (client, transport, sleeper)
    }

    #[tokio::test]
    async fn test_success_returns_json() {
        let (client, transport, _) =
            client_with(vec![MockReply::json(200, json!({"code": 0, "data": []}))]);

        let value = client
            .get("/api/v1/datasets", AuthMode::ApiKey, &[("page", "1".to_string())])
            .await
            .unwrap();

        assert_eq!(value["code"], 0);
        let requests = transport.requests();
        assert_eq!(requests[0].url, "http://ragflow.local/api/v1/datasets");
        assert_eq!(requests[0].header("authorization"), Some("Bearer api-key"));
        assert_eq!(requests[0].query, vec![("page".to_string(), "1".to_string())]);
        assert_eq!(requests[0].timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_login_token_mode() {
        let (client, transport, _) = client_with(vec![MockReply::json(200, json!({}))]);
        client
            .post("/v1/conversation/set", AuthMode::LoginToken, json!({}))
            .await
            .unwrap();
        assert_eq!(
            transport.requests()[0].header("Authorization"),
            Some("login-token")
        );
    }

    #[tokio::test]
    async fn test_500_then_success_is_transparent() {
        let (client, transport, sleeper) = client_with(vec![
            MockReply::status(500),
            MockReply::json(200, json!({"code": 0, "data": {"ok": true}})),
        ]);

        let value = client
            .post("/api/v1/retrieval", AuthMode::ApiKey, json!({}))
            .await
            .unwrap();

        assert_eq!(value["data"]["ok"], true);
        assert_eq!(transport.request_count(), 2);
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(500)]);
    }

    #[tokio::test]
    async fn test_5xx_exhausts_attempts() {
        let (client, transport, sleeper) = client_with(vec![
            MockReply::status(502),
            MockReply::status(503),
            MockReply::text(504, "upstream down"),
        ]);

        let err = client
            .post("/api/v1/retrieval", AuthMode::ApiKey, json!({}))
            .await
            .unwrap_err();

        match err {
            AppError::Api {
                status_code, body, ..
            } => {
                assert_eq!(status_code, 504);
                assert_eq!(body.as_deref(), Some("upstream down"));
            }
            other => panic!("expected api error, got {:?}", other),
        }
        assert_eq!(transport.request_count(), 3);
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_429_not_retried() {
        let (client, transport, sleeper) = client_with(vec![
            MockReply::status(429).with_header("Retry-After", "60"),
            MockReply::json(200, json!({})),
        ]);

        let err = client
            .post("/api/v1/retrieval", AuthMode::ApiKey, json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RateLimit { retry_after: 60 }));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(transport.remaining(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_429_without_header_uses_default() {
        let (client, _, _) = client_with(vec![MockReply::status(429)]);
        let err = client
            .get("/api/v1/datasets", AuthMode::ApiKey, &[])
            .await
            .unwrap_err();
        assert_eq!(err.retry_after(), Some(DEFAULT_RETRY_AFTER_SECS));
    }

    #[tokio::test]
    async fn test_4xx_carries_error_code() {
        let (client, transport, _) = client_with(vec![MockReply::json(
            401,
            json!({"code": 109, "message": "Authentication error: API key is invalid!"}),
        )]);

        let err = client
            .get("/api/v1/datasets", AuthMode::ApiKey, &[])
            .await
            .unwrap_err();

        match err {
            AppError::Api {
                status_code,
                error_code,
                message,
                ..
            } => {
                assert_eq!(status_code, 401);
                assert_eq!(error_code, Some(109));
                assert!(message.contains("API key is invalid"));
            }
            other => panic!("expected api error, got {:?}", other),
        }
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        let (client, transport, _) = client_with(vec![MockReply::timeout()]);
        let err = client
            .post("/api/v1/retrieval", AuthMode::ApiKey, json!({}))
            .await
            .unwrap_err();

        match err {
            AppError::Timeout { timeout, operation } => {
                assert_eq!(timeout, Duration::from_secs(30));
                assert_eq!(operation, "POST /api/v1/retrieval");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_maps_to_connection_error() {
        let (client, _, _) = client_with(vec![MockReply::connect_error("connection refused")]);
        let err = client
            .get("/api/v1/datasets", AuthMode::ApiKey, &[])
            .await
            .unwrap_err();

        match err {
            AppError::Connection { base_url, cause } => {
                assert_eq!(base_url, "http://ragflow.local");
                assert!(cause.contains("refused"));
            }
            other => panic!("expected connection error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_body() {
        let (client, _, _) = client_with(vec![MockReply::text(200, "<html>")]);
        let err = client
            .get("/api/v1/datasets", AuthMode::ApiKey, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_stream_decodes_events() {
        let (client, transport, _) = client_with(vec![MockReply::chunked(&[
            "data:{\"code\":0,\"data\":{\"answer\":\"Hi\",\"session_id\":\"s1\"}}\n",
            "data:{\"code\":0,\"data\":true}\n",
        ])]);

        let stream = client
            .stream(
                "/api/v1/chats/c1/completions",
                AuthMode::ApiKey,
                json!({"question": "hi", "stream": true}),
            )
            .await
            .unwrap();
        let events: Vec<CompletionEvent> = stream.try_collect().await.unwrap();

        assert_eq!(events.len(), 2);
        assert!(events[1].is_final());
        assert_eq!(transport.requests()[0].timeout, None);
    }

    #[tokio::test]
    async fn test_stream_retries_before_first_frame() {
        let (client, transport, _) = client_with(vec![
            MockReply::status(503),
            MockReply::chunked(&["data:{\"code\":0,\"data\":true}\n"]),
        ]);

        let stream = client
            .stream("/api/v1/chats/c1/completions", AuthMode::ApiKey, json!({}))
            .await
            .unwrap();
        let events: Vec<CompletionEvent> = stream.try_collect().await.unwrap();

        assert_eq!(events, vec![CompletionEvent::Final]);
        assert_eq!(transport.request_count(), 2);
    }

    fn impatient_client(reply: MockReply) -> BackendClient {
        let config = ClientConfig::new("http://ragflow.local", "api-key", "login-token")
            .unwrap()
            .with_timeout(Duration::from_millis(50));
        BackendClient::with_transport(
            config,
            Arc::new(MockTransport::with_replies([reply])),
            Arc::new(RecordingSleeper::new()),
        )
    }

    #[tokio::test]
    async fn test_stream_times_out_waiting_for_headers() {
        let client = impatient_client(MockReply::Hang);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.stream("/api/v1/chats/c1/completions", AuthMode::ApiKey, json!({})),
        )
        .await
        .expect("stream open should be bounded by the client timeout");

        match result {
            Err(AppError::Timeout { timeout, operation }) => {
                assert_eq!(timeout, Duration::from_millis(50));
                assert_eq!(operation, "POST /api/v1/chats/c1/completions");
            }
            Err(other) => panic!("expected timeout, got {:?}", other),
            Ok(_) => panic!("expected timeout, got a stream"),
        }
    }

    #[tokio::test]
    async fn test_stream_times_out_on_silent_body() {
        let client = impatient_client(MockReply::stalled(&[
            "data:{\"code\":0,\"data\":{\"answer\":\"Hi\"}}\n",
        ]));

        let mut stream = client
            .stream("/api/v1/chats/c1/completions", AuthMode::ApiKey, json!({}))
            .await
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.is_final());

        let second = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("body read should be bounded by the client timeout");
        assert!(matches!(second, Some(Err(AppError::Timeout { .. }))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_request_times_out_when_transport_hangs() {
        let client = impatient_client(MockReply::Hang);
        let err = client
            .get("/api/v1/datasets", AuthMode::ApiKey, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout { .. }));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some(" 120 ")), 120);
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), 60);
        assert_eq!(parse_retry_after(None), 60);
    }
}
