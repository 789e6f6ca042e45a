use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum VenError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Sampler error: {0}")]
    Sampler(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Serialize for VenError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Failure modes of a single request/response exchange with the VTN.
///
/// Every error path of the exchange is a tagged variant so the dispatcher can
/// match on the outcome instead of unwinding. All variants are logged at the
/// point where they arise; callers treat any of them as "no usable reply".
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("could not reach the VTN: {0}")]
    Network(String),

    #[error("VTN returned HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("incoming message failed schema validation: {0}")]
    Schema(String),

    #[error("incoming message had an invalid signature")]
    Signature,

    #[error("certificate fingerprint mismatch (expected {expected}, got {actual})")]
    FingerprintMismatch { expected: String, actual: String },

    #[error("incoming message could not be parsed: {0}")]
    Malformed(String),
}

/// Errors produced by a [`MessageCodec`](crate::codec::MessageCodec)
/// implementation.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("schema validation failed: {0}")]
    Schema(String),

    #[error("invalid signature")]
    Signature,

    #[error("fingerprint mismatch (expected {expected}, got {actual})")]
    FingerprintMismatch { expected: String, actual: String },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("encode failed: {0}")]
    Encode(String),
}

impl From<CodecError> for RequestError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Schema(msg) => RequestError::Schema(msg),
            CodecError::Signature => RequestError::Signature,
            CodecError::FingerprintMismatch { expected, actual } => {
                RequestError::FingerprintMismatch { expected, actual }
            }
            CodecError::Malformed(msg) => RequestError::Malformed(msg),
            CodecError::Encode(msg) => RequestError::Malformed(msg),
        }
    }
}
