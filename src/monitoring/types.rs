use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current time as fractional seconds since the Unix epoch.
pub fn epoch_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Result of a single probe iteration.
///
/// Constructed fresh at the start of every iteration, populated as the
/// iteration proceeds, then handed once to the result callback. `error`
/// and the connection-level outcome fields are deliberately orthogonal: a
/// result can be connected yet errored (reachable target, broken exchange)
/// or unconnected with an error (target unreachable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// When the result was finalized, seconds since the Unix epoch
    pub timestamp: f64,

    /// Failure description; `None` means the probe itself did not error
    pub error: Option<String>,

    /// Kind-specific fields, serialized flat alongside the base fields
    #[serde(flatten)]
    pub outcome: CheckOutcome,
}

/// Kind-specific portion of a check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckOutcome {
    Http(HttpOutcome),
}

/// Outcome fields recorded by an HTTP probe.
///
/// Invariant: `connected == false` implies `status == None` and
/// `content_verified == false`; `content_verified == true` implies
/// `connected == true`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOutcome {
    /// Response status, when a response head was received
    pub status: Option<u16>,

    /// Whether a TCP/TLS connection to the target was established
    pub connected: bool,

    /// Whether the configured pattern matched the response body; `false`
    /// when no pattern is configured
    pub content_verified: bool,

    /// Seconds from request dispatch to response completion
    pub elapsed: Option<f64>,
}

impl CheckResult {
    /// Fresh HTTP result stamped with the current time.
    pub fn new_http() -> Self {
        Self { timestamp: epoch_now(), error: None, outcome: CheckOutcome::Http(HttpOutcome::default()) }
    }

    pub fn http(&self) -> &HttpOutcome {
        match &self.outcome {
            CheckOutcome::Http(outcome) => outcome,
        }
    }

    pub fn http_mut(&mut self) -> &mut HttpOutcome {
        match &mut self.outcome {
            CheckOutcome::Http(outcome) => outcome,
        }
    }
}
