//! The typed error taxonomy: one enum per place an error can surface —
//! synchronously on the inbound connection, asynchronously via a callback
//! frame, or as a fatal startup failure.

use thiserror::Error;

/// The closed set of wire-level error tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorToken {
    InvalidRequest,
    QueueFull,
    ParseError,
    InternalError,
    CallbackFailed,
}

impl ErrorToken {
    /// Stable numeric code. A `const fn` match, not a runtime table, so the
    /// code can never drift from the token it's paired with.
    pub const fn code(self) -> u16 {
        match self {
            ErrorToken::InvalidRequest => 400,
            ErrorToken::QueueFull => 429,
            ErrorToken::ParseError => 422,
            ErrorToken::InternalError => 500,
            ErrorToken::CallbackFailed => 502,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorToken::InvalidRequest => "invalid_request",
            ErrorToken::QueueFull => "queue_full",
            ErrorToken::ParseError => "parse_error",
            ErrorToken::InternalError => "internal_error",
            ErrorToken::CallbackFailed => "callback_failed",
        }
    }
}

/// Errors reported synchronously on the inbound connection; no task is
/// created. Queue-full rejection is never one of these: capacity is only
/// discovered at push time, after the ack has already gone out, so it is
/// always a [`PostAckError`] instead.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

impl AdmissionError {
    pub fn token_and_code(&self) -> (ErrorToken, u16) {
        let token = match self {
            AdmissionError::MissingField(_) | AdmissionError::Malformed(_) => {
                ErrorToken::InvalidRequest
            }
        };
        (token, token.code())
    }
}

/// Errors reported asynchronously via an Error frame to the submitter's
/// callback endpoint.
#[derive(Debug, Error)]
pub enum PostAckError {
    #[error("ranked queue is at capacity")]
    QueueFull,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("no model available")]
    NoModelAvailable,
    #[error("model {0} not found")]
    ModelNotFound(u64),
    #[error("response too large ({0} bytes)")]
    ResponseOverflow(usize),
}

impl PostAckError {
    pub fn token_and_code(&self) -> (ErrorToken, u16) {
        let token = match self {
            PostAckError::QueueFull => ErrorToken::QueueFull,
            PostAckError::InferenceFailed(_)
            | PostAckError::NoModelAvailable
            | PostAckError::ModelNotFound(_)
            | PostAckError::ResponseOverflow(_) => ErrorToken::InternalError,
        };
        (token, token.code())
    }
}

/// Errors that abort process startup. The process exits with a non-zero
/// status after logging; no task lifecycle is involved.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("failed to load driver {driver}: {source}")]
    DriverLoad {
        driver: String,
        #[source]
        source: crate::backend::BackendError,
    },
    #[error("failed to load model {spec}: {source}")]
    ModelLoad {
        spec: String,
        #[source]
        source: crate::backend::BackendError,
    },
    #[error("failed to bind socket at {path}: {source}")]
    SocketBind {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorToken::InvalidRequest.code(), 400);
        assert_eq!(ErrorToken::QueueFull.code(), 429);
        assert_eq!(ErrorToken::ParseError.code(), 422);
        assert_eq!(ErrorToken::InternalError.code(), 500);
        assert_eq!(ErrorToken::CallbackFailed.code(), 502);
    }

    #[test]
    fn admission_missing_field_maps_to_400() {
        let (token, code) = AdmissionError::MissingField("text").token_and_code();
        assert_eq!(token.as_str(), "invalid_request");
        assert_eq!(code, 400);
    }

    #[test]
    fn admission_malformed_maps_to_400() {
        let (token, code) = AdmissionError::Malformed("bad envelope".to_string()).token_and_code();
        assert_eq!(token.as_str(), "invalid_request");
        assert_eq!(code, 400);
    }
}
