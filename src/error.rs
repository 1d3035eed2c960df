//! Unified error handling for pulsehub-node.
//!
//! Mirrors the teacher's split of one error enum per concern rather than a
//! single giant enum, but all concerns ultimately narrow to the six kinds
//! the core's error policy names.

use thiserror::Error;

/// The six error kinds the core's error policy recognizes.
///
/// These are kinds, not concrete error types: every leaf error in this
/// crate maps to exactly one of them via [`CoreError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Token verification failed at admission.
    AuthInvalid,
    /// Repository/cache lookup found nothing; not itself an error condition.
    NotFound,
    /// The requested state transition conflicts with current state.
    Conflict,
    /// Caller-supplied request was malformed.
    BadRequest,
    /// Repository/cache/bus failure that is safe to retry.
    Transient,
    /// Unrecoverable; the caller should not retry.
    Fatal,
}

/// Errors raised while admitting, routing, or fanning out on the core's
/// hot paths (session admission, hub/channel operations, presence).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Token verification rejected the connection.
    #[error("authentication failed")]
    AuthInvalid,

    /// A referenced tenant, channel, or client does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested transition is not valid from the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller's request was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A collaborator (repository/cache/bus) failed in a retry-safe way.
    #[error("transient failure in {collaborator}: {source}")]
    Transient {
        /// Name of the failing collaborator, for metrics/logging.
        collaborator: &'static str,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },

    /// An unrecoverable failure; the caller must not retry.
    #[error("fatal error: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl CoreError {
    /// Map to one of the six error kinds, for metrics labeling and policy
    /// dispatch (e.g. "log and continue" vs "reject with no side effects").
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthInvalid => ErrorKind::AuthInvalid,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Static label for metrics, matching the teacher's `error_code()` style.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthInvalid => "auth_invalid",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadRequest(_) => "bad_request",
            Self::Transient { .. } => "transient",
            Self::Fatal(_) => "fatal",
        }
    }

    /// Build a [`CoreError::Transient`] tagging which collaborator failed.
    pub fn transient(collaborator: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Transient {
            collaborator,
            source: source.into(),
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the connection transport (read/write loop, handshake).
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The underlying socket returned an I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The WebSocket handshake or framing layer rejected the connection.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A pong was not received before `pong_wait` elapsed.
    #[error("pong timeout")]
    PongTimeout,

    /// The bounded send queue is closed (connection already shutting down).
    #[error("send queue closed")]
    QueueClosed,
}

/// Errors raised while loading or validating the node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file as TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A config value failed post-parse validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_correctly() {
        assert_eq!(CoreError::AuthInvalid.kind(), ErrorKind::AuthInvalid);
        assert_eq!(
            CoreError::NotFound("tenant".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoreError::transient("repository", anyhow::anyhow!("timeout")).kind(),
            ErrorKind::Transient
        );
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(CoreError::AuthInvalid.error_code(), "auth_invalid");
        assert_eq!(CoreError::BadRequest("x".into()).error_code(), "bad_request");
    }
}
