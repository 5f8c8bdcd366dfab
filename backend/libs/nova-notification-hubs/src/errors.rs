use thiserror::Error;

/// Result type alias for hub operations
pub type Result<T> = std::result::Result<T, HubError>;

/// Stage of a hub call that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    /// Rejected locally before any network call
    Validation,
    /// Malformed XML/JSON or an unusable field value
    Encoding,
    /// Network failure, cancellation or a non-2xx response
    Transport,
}

/// Failure reported by a [`HubTransport`](crate::transport::HubTransport)
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Notification Hubs client error types
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Unknown notification format '{0}'")]
    InvalidFormat(String),

    #[error("Unknown target platform '{0}'")]
    InvalidPlatform(String),

    #[error("Registration platform not supported: {0}")]
    UnsupportedPlatform(String),

    #[error("Cannot batch send to more than {max} devices (got {count})")]
    BatchTooLarge { count: usize, max: usize },

    #[error("cannot schedule a notification in the past")]
    ScheduleInPast,

    #[error("Invalid hub URL: {0}")]
    InvalidUrl(String),

    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("Invalid value for header {name}: {message}")]
    InvalidHeader { name: &'static str, message: String },

    #[error("Failed to decode XML: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Failed to encode or decode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unparsable expiration time '{0}'")]
    InvalidTimestamp(String),

    #[error("Registration entry is missing {0}")]
    MissingField(&'static str),

    #[error("{operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("{operation}: unexpected response status code {status}: {body}")]
    UnexpectedStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

impl HubError {
    /// Which stage of the call failed
    pub fn stage(&self) -> ErrorStage {
        match self {
            Self::InvalidFormat(_)
            | Self::InvalidPlatform(_)
            | Self::UnsupportedPlatform(_)
            | Self::BatchTooLarge { .. }
            | Self::ScheduleInPast
            | Self::InvalidUrl(_)
            | Self::InvalidHeader { .. }
            | Self::MissingConfig(_) => ErrorStage::Validation,
            Self::Xml(_) | Self::Json(_) | Self::InvalidTimestamp(_) | Self::MissingField(_) => {
                ErrorStage::Encoding
            }
            Self::Transport { .. } | Self::UnexpectedStatus { .. } | Self::Cancelled => {
                ErrorStage::Transport
            }
        }
    }

    /// Hint for callers that run their own retry policy. The client never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<HubError> for String {
    fn from(err: HubError) -> Self {
        err.to_string()
    }
}
