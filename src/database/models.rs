use serde::{Deserialize, Serialize};

/// CheckRow model - the durable record of a check's declared configuration.
///
/// Created once when the check's loop is first started, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRow {
    pub id: i64,
    pub kind: String,
    pub config: serde_json::Value,
}

/// EventRow model - one persisted check result correlated to its check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub id: i64,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub check_id: i64,
    /// Result document, without its timestamp field
    pub result: serde_json::Value,
}
