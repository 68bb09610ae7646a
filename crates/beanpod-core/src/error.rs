use std::fmt;
use std::time::Duration;

use crate::backend::BackendError;
use crate::quarantine::QuarantineError;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    BeanNotFound,
    InvalidInput,
    InvalidEnumValue,
    MalformedResponse,
    BackendUnavailable,
    BackendTimeout,
    BackendRejected,
    PermissionDenied,
    QuarantineFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::BeanNotFound => "E2001",
            Self::InvalidInput => "E2004",
            Self::InvalidEnumValue => "E2005",
            Self::MalformedResponse => "E3001",
            Self::BackendUnavailable => "E4001",
            Self::BackendTimeout => "E4002",
            Self::BackendRejected => "E4003",
            Self::PermissionDenied => "E5003",
            Self::QuarantineFailed => "E5004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::BeanNotFound => "Bean not found",
            Self::InvalidInput => "Invalid input",
            Self::InvalidEnumValue => "Invalid status/type/priority value",
            Self::MalformedResponse => "Backend returned an unparsable response",
            Self::BackendUnavailable => "Beans backend unavailable",
            Self::BackendTimeout => "Beans backend timed out",
            Self::BackendRejected => "Beans backend rejected the request",
            Self::PermissionDenied => "Permission denied",
            Self::QuarantineFailed => "Quarantine failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .beans.yml and retry."),
            Self::BeanNotFound => None,
            Self::InvalidInput => Some("Check the values passed to the command."),
            Self::InvalidEnumValue => {
                Some("Use one of the statuses/types/priorities configured in .beans.yml.")
            }
            Self::MalformedResponse => {
                Some("Check that the installed `beans` version supports `--json` output.")
            }
            Self::BackendUnavailable => Some("Install `beans` or set `backend_program` in config."),
            Self::BackendTimeout => Some("Raise `backend_timeout_ms` or retry when idle."),
            Self::BackendRejected => None,
            Self::PermissionDenied => Some("Check write permissions on the beans directory."),
            Self::QuarantineFailed => Some("Move the offending file out of the beans directory by hand."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by the [`crate::store::BeanStore`] facade.
///
/// Cloneable so a single in-flight listing result can be handed to every
/// waiter that joined it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("beans backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("beans backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("bean not found: '{0}'")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Mutation rejected by the backend; message is already cleaned.
    #[error("{0}")]
    Backend(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("quarantine failed: {0}")]
    Quarantine(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::BackendUnavailable(_) => ErrorCode::BackendUnavailable,
            Self::Timeout(_) => ErrorCode::BackendTimeout,
            Self::MalformedResponse(_) => ErrorCode::MalformedResponse,
            Self::NotFound(_) => ErrorCode::BeanNotFound,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::InvalidValue(_) => ErrorCode::InvalidEnumValue,
            Self::Backend(_) => ErrorCode::BackendRejected,
            Self::Permission(_) => ErrorCode::PermissionDenied,
            Self::Quarantine(_) => ErrorCode::QuarantineFailed,
            Self::Internal(_) => ErrorCode::InternalUnexpected,
        }
    }

    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// True for failures where a cached listing may stand in for a fresh one.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::Timeout(_))
    }
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(msg) => Self::BackendUnavailable(msg),
            BackendError::Timeout(waited) => Self::Timeout(waited),
            BackendError::Malformed(msg) => Self::MalformedResponse(msg),
            BackendError::Permission(msg) => Self::Permission(msg),
            BackendError::NotFound(id) => Self::NotFound(id),
            BackendError::Failed(msg) => Self::Backend(msg),
        }
    }
}

impl From<QuarantineError> for StoreError {
    fn from(err: QuarantineError) -> Self {
        match err {
            QuarantineError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Self::Permission(e.to_string())
            }
            other => Self::Quarantine(other.to_string()),
        }
    }
}
