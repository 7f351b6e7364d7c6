//! Blocking HTTP client for the server under test.
//!
//! One logical request may be attempted many times. Two independent budgets,
//! both measured from the first attempt, decide how long to keep trying:
//!
//! - connection failures (server not listening yet) retry every
//!   `connect_interval` until `connect_window` has elapsed;
//! - `503 Service Unavailable` (server warming up) retries every
//!   `unavailable_interval` until `unavailable_window` has elapsed.
//!
//! Every other transport error is fatal at once, and every other status code
//! is returned to the caller untouched.

use std::fmt;
use std::time::{Duration, Instant};

use newscheck_core::build_info;
use newscheck_core::config::RetryConfig;
use newscheck_core::{Error, Result};
use tracing::{debug, info};

/// HTTP methods the harness issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A request against the server, relative to its base address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, Vec::new())
    }

    pub fn put(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(Method::Put, path, body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path, Vec::new())
    }

    fn new(method: Method, path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// The response to a logical request once retries are over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutcome {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpOutcome {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failure of a single attempt below the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No connection could be established (refused, nothing listening).
    Connect(String),
    Other(String),
}

/// Sends one attempt. Implementations must not retry on their own.
pub trait Transport {
    fn send(&mut self, request: &HttpRequest) -> std::result::Result<HttpOutcome, TransportError>;
}

/// Time source for the retry budgets.
pub trait Clock {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;
    fn sleep(&mut self, duration: Duration);
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Keep-alive transport over `reqwest`'s blocking client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Transport for a server listening on `127.0.0.1:<port>`.
    pub fn new(port: u16, timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(build_info::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("http://127.0.0.1:{port}"),
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(&mut self, request: &HttpRequest) -> std::result::Result<HttpOutcome, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, request.path));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            // A Vec body is sent with an explicit Content-Length.
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(classify)?;

        Ok(HttpOutcome {
            status,
            body: body.to_vec(),
        })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    let message = describe(&err);
    if err.is_connect() {
        TransportError::Connect(message)
    } else {
        TransportError::Other(message)
    }
}

/// Flatten an error and its sources into one line.
fn describe(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// `1 sec` for whole seconds, `250 ms` otherwise.
fn describe_interval(interval: Duration) -> String {
    let millis = interval.as_millis();
    if millis > 0 && millis % 1_000 == 0 {
        format!("{} sec", millis / 1_000)
    } else {
        format!("{millis} ms")
    }
}

/// Retry budgets, see the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub connect_window: Duration,
    pub connect_interval: Duration,
    pub unavailable_window: Duration,
    pub unavailable_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            connect_window: Duration::from_millis(config.connect_window_ms),
            connect_interval: Duration::from_millis(config.connect_interval_ms),
            unavailable_window: Duration::from_millis(config.unavailable_window_ms),
            unavailable_interval: Duration::from_millis(config.unavailable_interval_ms),
        }
    }
}

#[derive(Debug)]
enum RetryState {
    Attempting,
    RetryingConnection,
    RetryingUnavailable,
    Done(HttpOutcome),
    Failed(Error),
}

/// Client issuing logical requests with the two retry budgets.
pub struct RetryClient<T = ReqwestTransport, C = SystemClock> {
    transport: T,
    clock: C,
    policy: RetryPolicy,
}

impl RetryClient {
    /// Client for `127.0.0.1:<port>` with budgets from `config`.
    pub fn connect(port: u16, config: &RetryConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(port, config.request_timeout())?;
        Ok(Self::with_parts(
            transport,
            SystemClock::new(),
            RetryPolicy::from(config),
        ))
    }
}

impl<T: Transport, C: Clock> RetryClient<T, C> {
    pub fn with_parts(transport: T, clock: C, policy: RetryPolicy) -> Self {
        Self {
            transport,
            clock,
            policy,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Issue `request` until it completes or a budget runs out.
    pub fn request(&mut self, request: &HttpRequest) -> Result<HttpOutcome> {
        info!("> {} {}", request.method, request.path);

        let started = self.clock.now();
        let mut state = RetryState::Attempting;
        loop {
            state = match state {
                RetryState::Attempting => {
                    let result = self.transport.send(request);
                    let elapsed = self.clock.now().saturating_sub(started);
                    self.next_state(result, elapsed)
                }
                RetryState::RetryingConnection => {
                    self.clock.sleep(self.policy.connect_interval);
                    RetryState::Attempting
                }
                RetryState::RetryingUnavailable => {
                    self.clock.sleep(self.policy.unavailable_interval);
                    info!(
                        "> Retrying after {}...",
                        describe_interval(self.policy.unavailable_interval)
                    );
                    info!("> {} {}", request.method, request.path);
                    RetryState::Attempting
                }
                RetryState::Done(outcome) => {
                    info!("< {}", outcome.status);
                    return Ok(outcome);
                }
                RetryState::Failed(err) => return Err(err),
            };
        }
    }

    fn next_state(
        &self,
        result: std::result::Result<HttpOutcome, TransportError>,
        elapsed: Duration,
    ) -> RetryState {
        match result {
            Ok(outcome) if outcome.status == 503 => {
                info!("< 503");
                if elapsed < self.policy.unavailable_window {
                    RetryState::RetryingUnavailable
                } else {
                    RetryState::Failed(Error::Timeout {
                        payload: outcome.body_text(),
                    })
                }
            }
            Ok(outcome) => RetryState::Done(outcome),
            Err(TransportError::Connect(message)) => {
                if elapsed < self.policy.connect_window {
                    debug!("Server not accepting connections yet: {}", message);
                    RetryState::RetryingConnection
                } else {
                    RetryState::Failed(Error::ConnectionRefused(message))
                }
            }
            Err(TransportError::Other(message)) => RetryState::Failed(Error::Transport(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays queued results, then keeps returning `fallback`.
    struct ScriptedTransport {
        replies: VecDeque<std::result::Result<HttpOutcome, TransportError>>,
        fallback: std::result::Result<HttpOutcome, TransportError>,
        attempts: usize,
    }

    impl ScriptedTransport {
        fn new(
            replies: Vec<std::result::Result<HttpOutcome, TransportError>>,
            fallback: std::result::Result<HttpOutcome, TransportError>,
        ) -> Self {
            Self {
                replies: replies.into(),
                fallback,
                attempts: 0,
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send(
            &mut self,
            _request: &HttpRequest,
        ) -> std::result::Result<HttpOutcome, TransportError> {
            self.attempts += 1;
            self.replies
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    /// Virtual clock: sleeping advances time instantly.
    #[derive(Default)]
    struct ManualClock {
        now: Duration,
    }

    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            self.now
        }

        fn sleep(&mut self, duration: Duration) {
            self.now += duration;
        }
    }

    fn ok(status: u16, body: &str) -> std::result::Result<HttpOutcome, TransportError> {
        Ok(HttpOutcome {
            status,
            body: body.as_bytes().to_vec(),
        })
    }

    fn refused() -> std::result::Result<HttpOutcome, TransportError> {
        Err(TransportError::Connect("connection refused".to_string()))
    }

    fn client(transport: ScriptedTransport) -> RetryClient<ScriptedTransport, ManualClock> {
        RetryClient::with_parts(transport, ManualClock::default(), RetryPolicy::default())
    }

    #[test]
    fn test_first_response_returned() {
        let mut client = client(ScriptedTransport::new(vec![], ok(201, "")));
        let outcome = client.request(&HttpRequest::put("/a.html", b"<html/>".to_vec())).unwrap();

        assert_eq!(outcome.status, 201);
        assert_eq!(client.transport().attempts, 1);
    }

    #[test]
    fn test_client_errors_not_retried() {
        let mut client = client(ScriptedTransport::new(vec![], ok(404, "missing")));
        let outcome = client.request(&HttpRequest::delete("/a.html")).unwrap();

        assert_eq!(outcome.status, 404);
        assert_eq!(outcome.body_text(), "missing");
        assert_eq!(client.transport().attempts, 1);
    }

    #[test]
    fn test_connection_refused_under_window_recovers() {
        // 5 seconds of refusals at 100 ms intervals.
        let mut replies: Vec<_> = (0..50).map(|_| refused()).collect();
        replies.push(ok(200, r#"{"threads":[]}"#));
        let mut client = client(ScriptedTransport::new(replies, refused()));

        let outcome = client.request(&HttpRequest::get("/threads")).unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(client.transport().attempts, 51);
        assert_eq!(client.clock.now, Duration::from_secs(5));
    }

    #[test]
    fn test_connection_refused_past_window_is_fatal() {
        let mut client = client(ScriptedTransport::new(vec![], refused()));

        let err = client.request(&HttpRequest::get("/threads")).unwrap_err();
        assert!(matches!(err, Error::ConnectionRefused(_)));
        // Attempts at 0.0s, 0.1s, ... 10.0s; the one at 10.0s is the last.
        assert_eq!(client.transport().attempts, 101);
        assert_eq!(client.clock.now, Duration::from_secs(10));
    }

    #[test]
    fn test_unavailable_under_window_yields_first_real_response() {
        let mut replies: Vec<_> = (0..120).map(|_| ok(503, "warming up")).collect();
        replies.push(ok(200, r#"{"threads":[]}"#));
        let mut client = client(ScriptedTransport::new(replies, ok(500, "unexpected")));

        let outcome = client.request(&HttpRequest::get("/threads")).unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(client.transport().attempts, 121);
        assert_eq!(client.clock.now, Duration::from_secs(120));
    }

    #[test]
    fn test_unavailable_past_window_times_out() {
        let mut client = client(ScriptedTransport::new(vec![], ok(503, "still warming")));

        let err = client.request(&HttpRequest::get("/threads")).unwrap_err();
        assert_eq!(err.to_string(), "Request timed out: 503 Service Unavailable");
        assert_eq!(err.payload(), Some("still warming"));
        assert_eq!(client.transport().attempts, 301);
    }

    #[test]
    fn test_other_transport_error_is_immediately_fatal() {
        let mut client = client(ScriptedTransport::new(
            vec![Err(TransportError::Other("connection reset".to_string()))],
            ok(200, ""),
        ));

        let err = client.request(&HttpRequest::get("/threads")).unwrap_err();
        assert!(matches!(err, Error::Transport(ref m) if m == "connection reset"));
        assert_eq!(client.transport().attempts, 1);
        assert_eq!(client.clock.now, Duration::ZERO);
    }

    #[test]
    fn test_budgets_share_the_first_attempt_as_origin() {
        // 9.5s of refusals eat into the same clock the 503 budget reads.
        let policy = RetryPolicy {
            unavailable_window: Duration::from_secs(12),
            ..RetryPolicy::default()
        };
        let replies: Vec<_> = (0..95).map(|_| refused()).collect();
        let mut client = RetryClient::with_parts(
            ScriptedTransport::new(replies, ok(503, "")),
            ManualClock::default(),
            policy,
        );

        let err = client.request(&HttpRequest::get("/threads")).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        // 95 refusals, then 503s at 9.5s, 10.5s, 11.5s, 12.5s.
        assert_eq!(client.transport().attempts, 99);
    }

    #[test]
    fn test_request_builders() {
        let request = HttpRequest::put("/a.html", b"body".to_vec())
            .with_header("Content-Type", "text/html")
            .with_header("Cache-Control", "max-age=300");

        assert_eq!(request.method, Method::Put);
        assert_eq!(request.method.to_string(), "PUT");
        assert_eq!(request.headers.len(), 2);
        assert_eq!(HttpRequest::delete("/a.html").method.to_string(), "DELETE");
        assert!(HttpRequest::get("/threads").body.is_empty());
    }

    #[test]
    fn test_retry_interval_wording() {
        assert_eq!(describe_interval(RetryPolicy::default().unavailable_interval), "1 sec");
        assert_eq!(describe_interval(Duration::from_secs(3)), "3 sec");
        assert_eq!(describe_interval(Duration::from_millis(20)), "20 ms");
        assert_eq!(describe_interval(Duration::from_millis(1_500)), "1500 ms");
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetryConfig {
            connect_window_ms: 250,
            connect_interval_ms: 10,
            unavailable_window_ms: 1_000,
            unavailable_interval_ms: 50,
            request_timeout_ms: 0,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.connect_window, Duration::from_millis(250));
        assert_eq!(policy.unavailable_interval, Duration::from_millis(50));
    }
}
