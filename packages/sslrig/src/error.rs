//! Error types shared across the crate.

/// Errors produced while parsing material, loading keystores, building the
/// TLS context, or verifying a connected peer.
#[derive(Debug, thiserror::Error)]
pub enum SslError {
    #[error("malformed DER: {0}")]
    MalformedDer(String),
    #[error("bad base64 in PEM body: {0}")]
    BadBase64(String),
    #[error("unterminated PEM block: {0}")]
    UnterminatedBlock(String),
    #[error("unsupported keystore container: {0}")]
    UnsupportedContainer(String),
    #[error("malformed keystore container: {0}")]
    MalformedContainer(String),
    #[error("keystore password incorrect")]
    WrongPassword,
    #[error("keystore contains no private key entry")]
    NoPrivateKey,
    #[error("certificate invalid: {0}")]
    CertificateInvalid(String),
    #[error("trust failure: {0}")]
    TrustFailure(String),
    #[error("hostname `{expected}` does not match certificate names {actual:?}")]
    HostnameMismatch {
        expected: String,
        actual: Vec<String>,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("platform TLS failure: {0}")]
    PlatformFailure(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SslError {
    pub(crate) fn der(detail: impl Into<String>) -> Self {
        SslError::MalformedDer(detail.into())
    }

    pub(crate) fn container(detail: impl Into<String>) -> Self {
        SslError::MalformedContainer(detail.into())
    }
}
