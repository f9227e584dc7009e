use thiserror::Error;

/// Typed failures for the fleet controller.
///
/// Discovery callers treat the first three differently: a timeout and an
/// unparseable response both mean "unreachable or untrusted" but are logged
/// with their own cause, while a non-zero exit carries the program's stderr.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("discovery timed out, process killed")]
    DiscoveryTimeout,

    #[error("invalid control-plane response: {0}")]
    InvalidResponse(String),

    #[error("control-plane process failed: {reason}")]
    Process { code: Option<i32>, reason: String },

    #[error("router not found: {0}")]
    RouterNotFound(String),

    #[error("router payload rejected: {0}")]
    InvalidPayload(String),

    #[error("registry persistence failed: {0}")]
    Persistence(String),
}

impl ControllerError {
    pub fn process(code: Option<i32>, stderr: &str) -> Self {
        let trimmed = stderr.trim();
        let reason = if trimmed.is_empty() {
            format!("exited with code {}", code.unwrap_or(-1))
        } else {
            trimmed.to_string()
        };
        Self::Process { code, reason }
    }
}
