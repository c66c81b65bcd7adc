use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phrases the daemon relays from a provider when an OAuth grant is no longer
/// usable. Matched case-insensitively against the error body.
pub const AUTH_FAILURE_MARKERS: &[&str] = &[
    "invalid_grant",
    "token expired",
    "expired or revoked",
    "couldn't fetch token",
    "cannot fetch token",
    "empty token",
    "invalid_client",
    "unauthorized_client",
];

/// Failure category shared by every caller of the daemon.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AuthExpired,
    UpstreamError,
    Unreachable,
}

impl FailureKind {
    /// Whether trying again later, without user action, can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::Unreachable)
    }
}

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("authorization expired for {call}: {message}")]
    AuthExpired { call: &'static str, message: String },

    #[error("daemon rejected {call} (HTTP {status}): {message}")]
    Upstream {
        call: &'static str,
        status: u16,
        message: String,
    },

    #[error("daemon returned an unreadable reply to {call}: {message}")]
    Decode { call: &'static str, message: String },

    #[error("daemon unreachable during {call}: {message}")]
    Unreachable { call: &'static str, message: String },
}

impl DaemonError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DaemonError::AuthExpired { .. } => FailureKind::AuthExpired,
            DaemonError::Upstream { .. } | DaemonError::Decode { .. } => {
                FailureKind::UpstreamError
            }
            DaemonError::Unreachable { .. } => FailureKind::Unreachable,
        }
    }

    /// The daemon's own wording, without the call prefix.
    pub fn message(&self) -> &str {
        match self {
            DaemonError::AuthExpired { message, .. }
            | DaemonError::Upstream { message, .. }
            | DaemonError::Decode { message, .. }
            | DaemonError::Unreachable { message, .. } => message,
        }
    }

    /// Builds the error for a non-success HTTP status from the raw body.
    pub fn from_status(call: &'static str, status: u16, body: &str) -> Self {
        let message = extract_message(body);
        match classify_failure(&message) {
            FailureKind::AuthExpired => DaemonError::AuthExpired { call, message },
            _ => DaemonError::Upstream {
                call,
                status,
                message,
            },
        }
    }

    pub(crate) fn transport(call: &'static str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            DaemonError::Decode {
                call,
                message: err.to_string(),
            }
        } else {
            DaemonError::Unreachable {
                call,
                message: err.to_string(),
            }
        }
    }
}

/// Classifies a daemon error message. Anything not carrying an auth marker is
/// an ordinary upstream failure.
pub fn classify_failure(message: &str) -> FailureKind {
    let lowered = message.to_lowercase();
    if AUTH_FAILURE_MARKERS.iter().any(|m| lowered.contains(m)) {
        FailureKind::AuthExpired
    } else {
        FailureKind::UpstreamError
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn extract_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => body.trim().to_string(),
    }
}
