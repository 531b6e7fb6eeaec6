use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::check::{Check, ResultCallback};
use super::types::CheckResult;

/// Methods accepted for HTTP checks.
const SUPPORTED_METHODS: [&str; 9] =
    ["GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS", "PATCH", "TRACE", "CONNECT"];

/// Errors raised while building a check from its configuration.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("unsupported http method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid target url {url}: {source}")]
    InvalidUrl { url: String, source: url::ParseError },

    #[error("invalid content pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid {field}: {value} (must be a finite, non-negative number of seconds)")]
    InvalidDuration { field: &'static str, value: f64 },
}

/// Seconds-as-float from the configuration surface, rejected unless it
/// maps onto a valid `Duration`.
fn duration_from_secs(field: &'static str, value: f64) -> Result<Duration, CheckError> {
    if !value.is_finite() || value < 0.0 {
        return Err(CheckError::InvalidDuration { field, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| CheckError::InvalidDuration { field, value })
}

/// Options for constructing an [`HttpCheck`]; defaults match the CLI.
#[derive(Debug, Clone)]
pub struct HttpCheckOptions {
    pub method: String,
    pub regex: Option<String>,
    pub timeout: f64,
    pub headers: HashMap<String, String>,
    pub verify_tls: bool,
    pub interval: f64,
}

impl Default for HttpCheckOptions {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            regex: None,
            timeout: 2.0,
            headers: HashMap::new(),
            verify_tls: true,
            interval: 30.0,
        }
    }
}

/// Periodic HTTP probe against a single target URL.
///
/// Each iteration issues one request, classifies the outcome into a
/// [`CheckResult`], hands it to the callback and sleeps for the configured
/// interval. Requests never run concurrently within one check and the
/// client keeps at most one idle connection to the target.
#[derive(Debug)]
pub struct HttpCheck {
    url: Url,
    method: Method,
    pattern: Option<Regex>,
    timeout: Duration,
    headers: HashMap<String, String>,
    header_map: HeaderMap,
    verify_tls: bool,
    interval: Duration,
}

impl HttpCheck {
    pub fn new(url: &str, options: HttpCheckOptions) -> Result<Self, CheckError> {
        let method_name = options.method.trim().to_uppercase();
        if !SUPPORTED_METHODS.contains(&method_name.as_str()) {
            return Err(CheckError::UnsupportedMethod(options.method));
        }
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| CheckError::UnsupportedMethod(method_name.clone()))?;

        let url = Url::parse(url)
            .map_err(|source| CheckError::InvalidUrl { url: url.to_string(), source })?;

        let timeout = duration_from_secs("timeout", options.timeout)?;
        let interval = duration_from_secs("interval", options.interval)?;

        let pattern = options.regex.as_deref().map(Regex::new).transpose()?;

        let mut header_map = HeaderMap::new();
        for (name, value) in &options.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| CheckError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| CheckError::InvalidHeader(format!("{name}: {value}")))?;
            header_map.insert(header_name, header_value);
        }

        Ok(Self {
            url,
            method,
            pattern,
            timeout,
            headers: options.headers,
            header_map,
            verify_tls: options.verify_tls,
            interval,
        })
    }

    fn build_client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .pool_max_idle_per_host(1)
            .danger_accept_invalid_certs(!self.verify_tls)
            .default_headers(self.header_map.clone())
            .timeout(self.timeout)
            .build()
    }

    /// Perform one probe iteration and classify its outcome.
    async fn probe(&self, client: &Client) -> CheckResult {
        let mut result = CheckResult::new_http();
        let started = Instant::now();

        match client.request(self.method.clone(), self.url.clone()).send().await {
            Ok(response) => {
                let http = result.http_mut();
                http.elapsed = Some(started.elapsed().as_secs_f64());
                http.connected = true;
                http.status = Some(response.status().as_u16());

                if let Some(pattern) = &self.pattern {
                    match response.text().await {
                        Ok(body) => result.http_mut().content_verified = pattern.is_match(&body),
                        // The head completed, so the recorded status stands
                        Err(err) => result.error = Some(err.to_string()),
                    }
                }
            }
            // Target unreachable: refused, DNS, TLS handshake, timeout
            Err(err) if err.is_connect() || err.is_timeout() => {
                result.error = Some(err.to_string());
            }
            // Connection was established, then the exchange broke down
            Err(err) => {
                result.http_mut().connected = true;
                result.error = Some(err.to_string());
            }
        }

        result
    }
}

#[async_trait::async_trait]
impl Check for HttpCheck {
    fn config_document(&self) -> Result<serde_json::Value> {
        Ok(json!({
            "url": self.url.as_str(),
            "method": self.method.as_str(),
            "regex": self.pattern.as_ref().map(Regex::as_str),
            "timeout": self.timeout.as_secs_f64(),
            "headers": self.headers,
            "verify_tls": self.verify_tls,
            "interval": self.interval.as_secs_f64(),
        }))
    }

    async fn start(&self, callback: ResultCallback) -> Result<()> {
        let client = self.build_client()?;
        loop {
            let result = self.probe(&client).await;
            debug!(url = %self.url, error = result.error.as_deref(), "probe finished");
            callback(result).await?;
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use anyhow::anyhow;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    use super::*;

    /// Minimal fixture endpoint answering every request with one canned
    /// response.
    async fn serve(status_line: &'static str, body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        addr
    }

    /// Endpoint that accepts the connection, then answers with bytes that
    /// are not HTTP.
    async fn serve_garbled() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(b"this is not http\r\n\r\n").await;
                });
            }
        });
        addr
    }

    /// An address nothing is listening on.
    async fn refused_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    /// Run the check loop in its own task, collecting results over a
    /// channel-backed callback.
    fn run_check(check: HttpCheck) -> (JoinHandle<()>, mpsc::Receiver<CheckResult>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            let callback: ResultCallback = Box::new(move |result| {
                let tx = tx.clone();
                Box::pin(async move { tx.send(result).await.map_err(|_| anyhow!("receiver dropped")) })
            });
            let _ = check.start(callback).await;
        });
        (handle, rx)
    }

    #[tokio::test]
    async fn matching_pattern_verifies_content() {
        let addr = serve("200 OK", "Hello World").await;
        let check = HttpCheck::new(
            &format!("http://{addr}/"),
            HttpCheckOptions {
                regex: Some(" Worl[d]+".to_string()),
                interval: 0.025,
                ..Default::default()
            },
        )
        .unwrap();

        let (handle, mut rx) = run_check(check);
        let result = rx.recv().await.unwrap();
        handle.abort();

        assert!(result.error.is_none());
        assert!(result.http().connected);
        assert_eq!(result.http().status, Some(200));
        assert!(result.http().content_verified);
        assert!(result.http().elapsed.is_some());
    }

    #[tokio::test]
    async fn no_pattern_leaves_content_unverified() {
        let addr = serve("200 OK", "Hello World").await;
        let check = HttpCheck::new(
            &format!("http://{addr}/"),
            HttpCheckOptions { interval: 0.025, ..Default::default() },
        )
        .unwrap();

        let (handle, mut rx) = run_check(check);
        let result = rx.recv().await.unwrap();
        handle.abort();

        assert_eq!(result.http().status, Some(200));
        assert!(!result.http().content_verified);
    }

    #[tokio::test]
    async fn refused_connection_is_unconnected_with_error() {
        let addr = refused_addr().await;
        let check = HttpCheck::new(
            &format!("http://{addr}/"),
            HttpCheckOptions {
                regex: Some(" Worl[d]+".to_string()),
                interval: 0.025,
                ..Default::default()
            },
        )
        .unwrap();

        let (handle, mut rx) = run_check(check);
        let result = rx.recv().await.unwrap();
        handle.abort();

        assert!(result.error.is_some());
        assert!(!result.http().connected);
        assert!(result.http().status.is_none());
        assert!(!result.http().content_verified);
        assert!(result.http().elapsed.is_none());
    }

    #[tokio::test]
    async fn broken_exchange_after_connect_keeps_connected() {
        let addr = serve_garbled().await;
        let check = HttpCheck::new(
            &format!("http://{addr}/"),
            HttpCheckOptions { interval: 0.025, ..Default::default() },
        )
        .unwrap();

        let (handle, mut rx) = run_check(check);
        let result = rx.recv().await.unwrap();
        handle.abort();

        assert!(result.error.is_some());
        assert!(result.http().connected);
        assert!(result.http().status.is_none());
        assert!(!result.http().content_verified);
    }

    #[tokio::test]
    async fn iterations_are_sequential_with_one_result_each() {
        let addr = serve("200 OK", "ok").await;
        let check = HttpCheck::new(
            &format!("http://{addr}/"),
            HttpCheckOptions { interval: 0.025, ..Default::default() },
        )
        .unwrap();

        let (handle, mut rx) = run_check(check);
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        handle.abort();

        assert!(second.timestamp > first.timestamp);
        assert!(third.timestamp > second.timestamp);
    }

    #[tokio::test]
    async fn cancellation_mid_wait_emits_nothing_further() {
        let addr = serve("200 OK", "ok").await;
        let check = HttpCheck::new(
            &format!("http://{addr}/"),
            HttpCheckOptions { interval: 30.0, ..Default::default() },
        )
        .unwrap();

        let (handle, mut rx) = run_check(check);
        let _first = rx.recv().await.unwrap();
        handle.abort();

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn unsupported_method_fails_construction() {
        let err = HttpCheck::new(
            "http://127.0.0.1/",
            HttpCheckOptions { method: "FETCH".to_string(), ..Default::default() },
        )
        .unwrap_err();
        assert!(matches!(err, CheckError::UnsupportedMethod(_)));
    }

    #[tokio::test]
    async fn method_is_normalized_before_validation() {
        let check = HttpCheck::new(
            "http://127.0.0.1/",
            HttpCheckOptions { method: " get ".to_string(), ..Default::default() },
        )
        .unwrap();
        assert_eq!(check.config_document().unwrap()["method"], "GET");
    }

    #[tokio::test]
    async fn negative_timeout_fails_construction() {
        let err = HttpCheck::new(
            "http://127.0.0.1/",
            HttpCheckOptions { timeout: -1.0, ..Default::default() },
        )
        .unwrap_err();
        assert!(matches!(err, CheckError::InvalidDuration { field: "timeout", .. }));
    }

    #[tokio::test]
    async fn non_finite_interval_fails_construction() {
        let err = HttpCheck::new(
            "http://127.0.0.1/",
            HttpCheckOptions { interval: f64::NAN, ..Default::default() },
        )
        .unwrap_err();
        assert!(matches!(err, CheckError::InvalidDuration { field: "interval", .. }));
    }

    #[tokio::test]
    async fn invalid_header_fails_construction() {
        let headers = HashMap::from([("bad header".to_string(), "value".to_string())]);
        let err = HttpCheck::new(
            "http://127.0.0.1/",
            HttpCheckOptions { headers, ..Default::default() },
        )
        .unwrap_err();
        assert!(matches!(err, CheckError::InvalidHeader(_)));
    }

    #[tokio::test]
    async fn config_document_round_trips_declared_fields() {
        let headers = HashMap::from([("authorization".to_string(), "Bearer token".to_string())]);
        let check = HttpCheck::new(
            "https://example.com/health",
            HttpCheckOptions {
                method: "HEAD".to_string(),
                regex: Some("ok".to_string()),
                timeout: 1.5,
                headers,
                verify_tls: false,
                interval: 10.0,
            },
        )
        .unwrap();

        let config = check.config_document().unwrap();
        assert_eq!(config["url"], "https://example.com/health");
        assert_eq!(config["method"], "HEAD");
        assert_eq!(config["regex"], "ok");
        assert_eq!(config["timeout"], 1.5);
        assert_eq!(config["headers"]["authorization"], "Bearer token");
        assert_eq!(config["verify_tls"], false);
        assert_eq!(config["interval"], 10.0);
    }
}
