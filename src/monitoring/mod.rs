/// Monitoring module - periodic probes and their results
///
/// This module is responsible for:
/// - The polymorphic `Check` contract and its execution-loop semantics
/// - The HTTP check implementation
/// - The per-iteration result model carried through the pipeline
pub mod check;
pub mod http;
pub mod types;

pub use check::{Check, ResultCallback};
pub use http::HttpCheck;
pub use types::CheckResult;
