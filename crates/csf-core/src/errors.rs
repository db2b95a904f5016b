use std::time::Duration;

use crate::{
    types::{ErrorCode, FieldName},
    wire::MessageType,
};

/// Error types for wire encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// JSON serialization/deserialization errors.
    #[error("Serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// A message type that may not travel in this direction.
    #[error("Message type '{0}' not allowed in this direction")]
    UnexpectedDirection(MessageType),

    /// A preview that could carry the raw field value.
    #[error("Unmasked value for field '{0}'")]
    RawDataExposed(FieldName),
}

/// A specialized `Result` type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How loudly a [`ConfigurationError`] should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Bad or missing setup. Not retriable; the subsystem does not initialize.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("No setup configuration provided")]
    MissingSetup,

    #[error("Root node not found: {}", selector.as_deref().unwrap_or("<none>"))]
    RootNodeNotFound { selector: Option<String> },

    #[error("No client key provided")]
    MissingCredential,

    #[error("No secured field slots found for setup type '{setup_type}'")]
    NoSecuredFields { setup_type: String },

    #[error("Invalid frame source: {reason}")]
    InvalidFrameSource { reason: String },

    #[error("Credential endpoint failed: {reason}")]
    CredentialEndpoint { reason: String },

    #[error("No encryption key for field '{field}'")]
    MissingEncryptionKey { field: FieldName },

    #[error("Failed to mount frame for field '{field}': {reason}")]
    FrameMount { field: FieldName, reason: String },
}

impl ConfigurationError {
    pub fn severity(&self) -> Severity {
        match self {
            ConfigurationError::MissingCredential => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// A received message that fails authentication or does not fit the field's lifecycle.
///
/// Anomalies are logged and dropped; they are expected around teardown and never reach
/// host callbacks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolAnomaly {
    #[error("Malformed message: {reason}")]
    Malformed { reason: String },

    #[error("Message for unknown field '{field}'")]
    UnknownField { field: String },

    #[error("Origin '{actual}' does not match frame origin '{expected}'")]
    OriginMismatch { expected: String, actual: String },

    #[error("Session token mismatch for field '{field}'")]
    TokenMismatch { field: FieldName },

    #[error("Session for field '{field}' has been revoked")]
    TokenRevoked { field: FieldName },

    #[error("Message '{kind}' not permitted for field '{field}' while {state}")]
    NotPermitted {
        field: FieldName,
        kind: MessageType,
        state: &'static str,
    },

    #[error("Message '{kind}' may not be sent by a frame")]
    UnexpectedDirection { kind: MessageType },

    #[error("Unmasked value rejected for field '{field}'")]
    RawDataRejected { field: FieldName },

    #[error("Brand hint from non card number field '{field}'")]
    BrandFromNonCardNumber { field: FieldName },

    #[error("Secured fields have been destroyed")]
    Destroyed,
}

/// A per-field validation failure. Fully recoverable; the field stays usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Field '{field}' is invalid: {code}")]
pub struct FieldValidationError {
    pub field: FieldName,
    pub code: ErrorCode,
}

/// Why a frame never became ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameLoadReason {
    /// No handshake within the configured load timeout.
    Timeout { after: Duration },
    /// The frame reported an error before completing its handshake.
    FrameReported { code: ErrorCode },
}

/// A frame that failed to load or respond. The field is degraded; the rest keep working.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Frame for field '{field}' failed to load: {reason:?}")]
pub struct FrameLoadFailure {
    pub field: FieldName,
    pub reason: FrameLoadReason,
}

/// Failure to produce the submit payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("Secured fields not ready; pending: {pending:?}")]
    NotReady { pending: Vec<FieldName> },

    #[error("Secured fields have been destroyed")]
    Destroyed,
}

/// Failure to deliver a host command to a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown field '{0}'")]
    UnknownField(FieldName),

    #[error("Field '{field}' is not ready ({state})")]
    FieldNotReady { field: FieldName, state: &'static str },

    #[error("Failed to encode command: {0}")]
    Encode(String),

    #[error("Transport failed for field '{field}': {reason}")]
    Transport { field: FieldName, reason: String },

    #[error("Failed to recreate field: {0}")]
    Remount(#[from] ConfigurationError),

    #[error("Secured fields have been destroyed")]
    Destroyed,
}
