//! Error types for the federation core

use thiserror::Error;

use crate::policy::PolicyError;

/// Result type alias using FederationError
pub type Result<T> = std::result::Result<T, FederationError>;

/// Errors that can occur while handling entity statements and trust chains
#[derive(Error, Debug)]
pub enum FederationError {
    /// Metadata was requested from a chain without statements
    #[error("Trust chain is empty")]
    EmptyChain,

    /// The statement could not be decoded as a compact JWS
    #[error("Invalid entity statement: {0}")]
    InvalidStatement(String),

    /// No key in the supplied key set verified the signature
    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Statement is past its expiration time
    #[error("Statement expired at {0}")]
    Expired(String),

    /// Statement is not valid yet
    #[error("Statement not valid until {0}")]
    NotYetValid(String),

    /// The metadata policy algebra rejected a combination or application
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// A constraint carried by a superior statement was violated
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Cryptographic error
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl From<serde_json::Error> for FederationError {
    fn from(err: serde_json::Error) -> Self {
        FederationError::SerializationError(err.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for FederationError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        FederationError::CryptoError(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for FederationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::InvalidSignature => FederationError::SignatureInvalid(err.to_string()),
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                FederationError::InvalidStatement(err.to_string())
            }
            _ => FederationError::CryptoError(err.to_string()),
        }
    }
}
