//! Error types for the webhook runtime.
//!
//! Request-time variants carry the HTTP status the transport answers with;
//! registration and startup variants are fatal and never reach a request.

use axum::http::StatusCode;
use thiserror::Error;

/// Error type for webhook runtime operations
#[derive(Error, Debug)]
pub enum Error {
    /// Request carried a content type other than `application/json`
    #[error("request has invalid content type {0}; expected application/json")]
    UnsupportedMediaType(String),

    /// Request body is not a well-formed admission review
    #[error("error deserializing admission review request: {0}")]
    BadEnvelope(String),

    /// Embedded object could not be decoded into the handler's type
    #[error("{0}")]
    ObjectDecode(String),

    /// Operation requires an object the request did not carry
    #[error("admission request has no {0}")]
    MissingObject(&'static str),

    /// Mutated object could not be re-encoded or diffed
    #[error("error creating mutation patch: {0}")]
    Patch(String),

    /// Admission review response could not be serialized
    #[error("error serializing admission review response: {0}")]
    Encode(#[from] serde_json::Error),

    /// Type was never added to the scheme
    #[error("error fetching scheme information for type {0}: type is not registered")]
    UnregisteredType(&'static str),

    /// Type is registered as unversioned
    #[error("encountering unversioned object type {0}; unversioned types are not supported")]
    UnversionedType(&'static str),

    /// Type does not resolve to exactly one resource identity
    #[error("type {type_name} resolves to {count} resource identities; exactly one is required")]
    AmbiguousKinds {
        type_name: &'static str,
        count: usize,
    },

    /// A handler is already registered on this path
    #[error("a webhook is already registered on path {0}")]
    DuplicatePath(String),

    /// Invalid server options
    #[error("invalid server configuration: {0}")]
    Config(String),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Listener failure while serving
    #[error("webhook server error: {0}")]
    Server(String),
}

impl Error {
    /// HTTP status answered when this error ends request handling
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::BadEnvelope(_) | Error::ObjectDecode(_) | Error::MissingObject(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error is raised while registering webhooks
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Error::UnregisteredType(_)
                | Error::UnversionedType(_)
                | Error::AmbiguousKinds { .. }
                | Error::DuplicatePath(_)
        )
    }
}

/// Result type alias for webhook runtime operations
pub type Result<T> = std::result::Result<T, Error>;
