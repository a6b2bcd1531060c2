//! Authenticated HTTP transport with base-URL pinning and bounded retries.

use crate::config::{ApiKey, ClientConfig, DEFAULT_BASE_URL, RetryPolicy};
use crate::error::{MoltbookError, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Async delay used between retry attempts.
pub type SleepFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// Sleeps on the Tokio timer.
pub fn tokio_sleep() -> SleepFn {
    Arc::new(|delay| Box::pin(tokio::time::sleep(delay)))
}

const BODY_SNIPPET_CHARS: usize = 400;

/// Result of a single request attempt that did not fail outright.
enum Attempt {
    Done(Value),
    Retry {
        error: MoltbookError,
        retry_after: Option<Duration>,
    },
}

/// Sends requests to the Moltbook API.
///
/// Only `https://www.moltbook.com/api/v1` is accepted as a base URL; the bare
/// domain redirects to www and the redirect drops the `Authorization` header.
#[derive(Clone)]
pub struct Transport {
    base_url: String,
    api_key: ApiKey,
    http: Client,
    retry: RetryPolicy,
    sleep: SleepFn,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Build a transport, rejecting any non-canonical base URL.
    pub fn new(config: &ClientConfig, api_key: ApiKey) -> Result<Self> {
        let base_url = pin_base_url(&config.base_url)?;
        Self::build(base_url, config, api_key)
    }

    /// Build against an arbitrary base URL (mock servers in tests).
    #[cfg(test)]
    pub(crate) fn unpinned(base_url: &str, config: &ClientConfig, api_key: ApiKey) -> Result<Self> {
        Self::build(base_url.trim_end_matches('/').to_string(), config, api_key)
    }

    fn build(base_url: String, config: &ClientConfig, api_key: ApiKey) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(MoltbookError::Http)?;
        Ok(Self {
            base_url,
            api_key,
            http,
            retry: config.retry,
            sleep: tokio_sleep(),
        })
    }

    /// Replace the delay function used between retries.
    pub fn with_sleep(mut self, sleep: SleepFn) -> Self {
        self.sleep = sleep;
        self
    }

    fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{path}", self.base_url)
    }

    /// Issue a request and decode the JSON response.
    ///
    /// Generic throttling (429 without `retry_after_minutes`), 500/502/503/504
    /// and connection failures are retried up to the policy's attempt budget.
    /// A 429 carrying `retry_after_minutes` is a posting-frequency limit and
    /// fails immediately.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.url(path);
        let max_attempts = self.retry.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(%method, %url, attempt, "moltbook request");

            let mut builder = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(self.api_key.expose());
            if !query.is_empty() {
                builder = builder.query(query);
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let outcome = match builder.send().await {
                Ok(response) => self.check_response(response, attempt).await?,
                Err(err) if err.is_connect() || err.is_timeout() => Attempt::Retry {
                    error: MoltbookError::Http(err),
                    retry_after: None,
                },
                Err(err) => return Err(MoltbookError::Http(err)),
            };

            match outcome {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry { error, retry_after } => {
                    if attempt >= max_attempts {
                        warn!(%url, attempt, "giving up: {error}");
                        return Err(error);
                    }
                    let delay = self.retry.delay_for(retry_after);
                    warn!(
                        %url,
                        "{error}. Retrying in {}s (attempt {attempt}/{max_attempts})",
                        delay.as_secs_f64()
                    );
                    (self.sleep)(delay).await;
                }
            }
        }
    }

    async fn check_response(&self, response: Response, attempt: u32) -> Result<Attempt> {
        let status = response.status();
        let retry_after = retry_after_header(&response);
        let body = response.text().await.map_err(MoltbookError::Http)?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Attempt::Done(Value::Null));
            }
            let value = serde_json::from_str(&body).map_err(|e| MoltbookError::Api {
                status: status.as_u16(),
                error: format!("error decoding response body: {e}"),
                hint: Some(format!("Response snippet: {}...", snippet(&body))),
            })?;
            return Ok(Attempt::Done(value));
        }

        let parsed = ApiErrorBody::parse(&body);
        if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(minutes) = parsed.retry_after_minutes {
                return Err(MoltbookError::RateLimited {
                    retry_after_seconds: minutes * 60,
                    attempts: attempt,
                });
            }
            let wait = self.retry.delay_for(retry_after);
            return Ok(Attempt::Retry {
                error: MoltbookError::RateLimited {
                    retry_after_seconds: wait.as_secs(),
                    attempts: attempt,
                },
                retry_after,
            });
        }

        let error = MoltbookError::Api {
            status: status.as_u16(),
            error: parsed.error.unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("HTTP {}", status.as_u16())
                } else {
                    snippet(&body)
                }
            }),
            hint: parsed.hint,
        };
        if matches!(
            status,
            StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Ok(Attempt::Retry { error, retry_after });
        }
        Err(error)
    }
}

/// Accept only the canonical base URL (trailing slash tolerated).
pub fn pin_base_url(base_url: &str) -> Result<String> {
    let reject = |reason: &str| MoltbookError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(base_url.trim()).map_err(|_| reject("not a valid URL"))?;
    if url.scheme() != "https" {
        return Err(reject("must use https"));
    }
    match url.host_str() {
        Some("www.moltbook.com") => {}
        Some("moltbook.com") => {
            return Err(reject(
                "bare domain redirects to www and the redirect strips the Authorization header",
            ));
        }
        _ => return Err(reject("host must be www.moltbook.com")),
    }
    if url.port().is_some_and(|port| port != 443)
        || url.path().trim_end_matches('/') != "/api/v1"
        || url.query().is_some()
        || url.fragment().is_some()
        || !url.username().is_empty()
    {
        return Err(reject("must be exactly https://www.moltbook.com/api/v1"));
    }
    Ok(DEFAULT_BASE_URL.to_string())
}

fn retry_after_header(response: &Response) -> Option<Duration> {
    let raw = response.headers().get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(raw, Utc::now())
}

/// `Retry-After` as delta-seconds or an HTTP-date. Dates in the past mean
/// retry now.
fn parse_retry_after(raw: &str, now: DateTime<Utc>) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_CHARS).collect()
}

/// Error payload fields the API is known to send.
#[derive(Debug, Default)]
struct ApiErrorBody {
    error: Option<String>,
    hint: Option<String>,
    retry_after_minutes: Option<u64>,
}

impl ApiErrorBody {
    fn parse(body: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return Self::default();
        };
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            error: text("error").or_else(|| text("message")),
            hint: text("hint"),
            retry_after_minutes: value.get("retry_after_minutes").and_then(|v| {
                v.as_u64()
                    .or_else(|| v.as_f64().map(|m| m.max(0.0).ceil() as u64))
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn recording_sleep() -> (SleepFn, Arc<Mutex<Vec<Duration>>>) {
        let delays = Arc::new(Mutex::new(Vec::new()));
        let recorded = delays.clone();
        let sleep: SleepFn = Arc::new(move |delay| {
            recorded.lock().unwrap().push(delay);
            Box::pin(async {})
        });
        (sleep, delays)
    }

    fn transport(server: &MockServer) -> (Transport, Arc<Mutex<Vec<Duration>>>) {
        transport_with(server, &ClientConfig::default())
    }

    fn transport_with(
        server: &MockServer,
        config: &ClientConfig,
    ) -> (Transport, Arc<Mutex<Vec<Duration>>>) {
        let (sleep, delays) = recording_sleep();
        let transport = Transport::unpinned(
            &server.uri(),
            config,
            ApiKey::new("moltbook_test_key"),
        )
        .expect("transport")
        .with_sleep(sleep);
        (transport, delays)
    }

    #[test]
    fn canonical_base_url_is_accepted() {
        assert_eq!(pin_base_url(DEFAULT_BASE_URL).unwrap(), DEFAULT_BASE_URL);
        assert_eq!(
            pin_base_url("https://www.moltbook.com/api/v1/").unwrap(),
            DEFAULT_BASE_URL
        );
    }

    #[test]
    fn non_canonical_base_urls_are_rejected() {
        for url in [
            "https://moltbook.com/api/v1",
            "http://www.moltbook.com/api/v1",
            "https://www.moltbook.com/api/v2",
            "https://www.moltbook.com:8443/api/v1",
            "https://evil.example/api/v1",
            "www.moltbook.com/api/v1",
        ] {
            assert!(
                matches!(pin_base_url(url), Err(MoltbookError::InvalidBaseUrl { .. })),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn construction_fails_before_any_request() {
        let config = ClientConfig::default().base_url("https://moltbook.com/api/v1");
        let err = Transport::new(&config, ApiKey::new("k")).unwrap_err();
        assert!(matches!(err, MoltbookError::InvalidBaseUrl { .. }));
    }

    #[tokio::test]
    async fn sends_bearer_auth_query_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/posts"))
            .and(query_param("dry", "1"))
            .and(header("authorization", "Bearer moltbook_test_key"))
            .and(body_json(json!({"title": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (transport, _) = transport(&server);
        let value = transport
            .request(
                Method::POST,
                "/posts",
                &[("dry", "1".to_string())],
                Some(&json!({"title": "hi"})),
            )
            .await
            .expect("request");
        assert_eq!(value, json!({"success": true}));
        server.verify().await;
    }

    #[tokio::test]
    async fn retries_throttling_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"posts": []})))
            .mount(&server)
            .await;

        let (transport, delays) = transport(&server);
        let value = transport
            .request(Method::GET, "feed", &[], None)
            .await
            .expect("third attempt succeeds");
        assert_eq!(value, json!({"posts": []}));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
        assert_eq!(
            *delays.lock().unwrap(),
            vec![Duration::from_secs(1), Duration::from_secs(1)]
        );
    }

    #[tokio::test]
    async fn exhausted_throttling_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let (transport, delays) = transport(&server);
        let err = transport
            .request(Method::GET, "feed", &[], None)
            .await
            .unwrap_err();
        match err {
            MoltbookError::RateLimited { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
        assert_eq!(delays.lock().unwrap().len(), 2);
        assert_eq!(delays.lock().unwrap()[0], Duration::from_secs(10));
    }

    #[tokio::test]
    async fn posting_limit_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/posts"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "success": false,
                "error": "You can only post once every 30 minutes",
                "retry_after_minutes": 27
            })))
            .mount(&server)
            .await;

        let (transport, delays) = transport(&server);
        let err = transport
            .request(Method::POST, "posts", &[], Some(&json!({})))
            .await
            .unwrap_err();
        match err {
            MoltbookError::RateLimited {
                retry_after_seconds,
                attempts,
            } => {
                assert_eq!(retry_after_seconds, 27 * 60);
                assert_eq!(attempts, 1);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
        assert!(delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn client_errors_surface_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "error": "Post not found",
                "hint": "Check the post id"
            })))
            .mount(&server)
            .await;

        let (transport, _) = transport(&server);
        let err = transport
            .request(Method::GET, "posts/nope", &[], None)
            .await
            .unwrap_err();
        match err {
            MoltbookError::Api {
                status,
                error,
                hint,
            } => {
                assert_eq!(status, 404);
                assert_eq!(error, "Post not found");
                assert_eq!(hint.as_deref(), Some("Check the post id"));
            }
            other => panic!("expected Api, got {other:?}"),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gateway_errors_are_retried_then_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let (transport, _) = transport(&server);
        let err = transport
            .request(Method::GET, "feed", &[], None)
            .await
            .unwrap_err();
        match err {
            MoltbookError::Api { status, error, .. } => {
                assert_eq!(status, 503);
                assert_eq!(error, "upstream down");
            }
            other => panic!("expected Api, got {other:?}"),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn internal_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let (transport, delays) = transport(&server);
        let value = transport
            .request(Method::GET, "feed", &[], None)
            .await
            .expect("second attempt succeeds");
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
        assert_eq!(*delays.lock().unwrap(), vec![Duration::from_secs(10)]);
    }

    #[tokio::test]
    async fn timeouts_are_retried_then_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"posts": []}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let config = ClientConfig::default().timeout(Duration::from_millis(100));
        let (transport, delays) = transport_with(&server, &config);
        let err = transport
            .request(Method::GET, "feed", &[], None)
            .await
            .unwrap_err();
        match err {
            MoltbookError::Http(err) => assert!(err.is_timeout()),
            other => panic!("expected Http, got {other:?}"),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
        assert_eq!(
            *delays.lock().unwrap(),
            vec![Duration::from_secs(10), Duration::from_secs(10)]
        );
    }

    #[test]
    fn retry_after_accepts_seconds_and_http_dates() {
        let now = DateTime::parse_from_rfc3339("2015-10-21T07:28:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_retry_after(" 5 ", now), Some(Duration::from_secs(5)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[tokio::test]
    async fn empty_success_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let (transport, _) = transport(&server);
        let value = transport
            .request(Method::DELETE, "posts/p1", &[], None)
            .await
            .expect("delete");
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn error_body_parsing_is_lenient() {
        let parsed = ApiErrorBody::parse(r#"{"message": "slow down", "retry_after_minutes": "5"}"#);
        assert_eq!(parsed.error.as_deref(), Some("slow down"));
        assert_eq!(parsed.retry_after_minutes, Some(5));
        let parsed = ApiErrorBody::parse("<html>bad gateway</html>");
        assert!(parsed.error.is_none());
        assert!(parsed.retry_after_minutes.is_none());
    }
}
