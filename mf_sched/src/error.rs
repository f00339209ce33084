use thiserror::Error;

/// Attach-time and introspection failures. Per-packet anomalies (queue
/// full, flow cap, malformed option) are counters or skipped rewrites,
/// never errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MfError {
    #[error("failed to pre-allocate queue memory at attach")]
    NoMemory,

    #[error("mf exposes a single built-in leaf class; grafting is not supported")]
    SingleClassOnly,
}
