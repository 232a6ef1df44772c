use thiserror::Error;

/// Errors produced by the circles protocol layer.
///
/// Every variant is recoverable at the connection level: the dispatcher turns
/// it into an `error` frame for the originating connection and keeps going.
#[derive(Debug, Error)]
pub enum CircleError {
    /// Malformed frame: not JSON, not an object, or no usable `type`.
    #[error("{message}")]
    Protocol { field: String, message: String },

    /// A required field is missing or has the wrong type.
    #[error("{message}")]
    Validation { field: String, message: String },

    /// Missing, invalid or expired credentials, or not yet authenticated.
    #[error("{message}")]
    Auth { field: String, message: String },

    /// Authenticated, but not allowed to act on the target (e.g. not a member).
    #[error("{message}")]
    Forbidden { field: String, message: String },

    /// A referenced entity does not exist.
    #[error("{message}")]
    NotFound { field: String, message: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The external store failed or was unreachable.
    #[error("store error: {0}")]
    Store(String),

    #[error("timeout")]
    Timeout,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl CircleError {
    pub fn protocol(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn auth(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn forbidden(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Forbidden {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            field: field.into(),
            message: message.into(),
        }
    }

    /// HTTP-style status carried in the `error` frame.
    pub fn status(&self) -> u16 {
        match self {
            Self::Protocol { .. } | Self::Validation { .. } | Self::Codec(_) => 400,
            Self::Auth { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::RateLimited(_) => 429,
            Self::Store(_)
            | Self::Timeout
            | Self::Transport(_)
            | Self::Io(_)
            | Self::Other(_) => 500,
        }
    }

    /// Name of the offending field carried in the `error` frame.
    pub fn field(&self) -> &str {
        match self {
            Self::Protocol { field, .. }
            | Self::Validation { field, .. }
            | Self::Auth { field, .. }
            | Self::Forbidden { field, .. }
            | Self::NotFound { field, .. } => field,
            Self::RateLimited(_) => "token",
            Self::Codec(_) => "payload",
            _ => "server",
        }
    }

    /// Message safe to show to the client. Internal failures are not echoed.
    pub fn client_message(&self) -> String {
        match self.status() {
            500 => match self {
                Self::Timeout => "Request timed out".to_string(),
                _ => "An error occurred".to_string(),
            },
            429 => "Too many authentication attempts".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<serde_json::Error> for CircleError {
    fn from(e: serde_json::Error) -> Self {
        CircleError::Codec(e.to_string())
    }
}

pub type CircleResult<T> = Result<T, CircleError>;
