use thiserror::Error;

/// Errors produced while loading keys, signing or verifying tokens.
///
/// Every variant is terminal for the call that produced it. Callers are
/// expected to map them onto protocol responses (401, 400, ...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Key material is missing, unreadable or not valid PEM
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// The caller tried to set a header that is reserved for the signer
    #[error("Header '{name}' is reserved and cannot be set by the caller")]
    HeaderInjection { name: String },

    /// Signing failed, including missing or invalid private key material
    #[error("Signing error: {0}")]
    Signing(String),

    /// The compact token is structurally invalid
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The signature does not verify under the pinned algorithm and key
    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token is not valid yet")]
    NotYetValid,

    /// The token does not carry enough temporal claims to be trusted
    #[error("Invalid temporal claims: {0}")]
    InvalidTemporalClaims(String),
}

impl TokenError {
    pub fn certificate<S: Into<String>>(msg: S) -> Self {
        TokenError::Certificate(msg.into())
    }

    pub fn header_injection<S: Into<String>>(name: S) -> Self {
        TokenError::HeaderInjection { name: name.into() }
    }

    pub fn signing<S: Into<String>>(msg: S) -> Self {
        TokenError::Signing(msg.into())
    }

    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        TokenError::MalformedToken(msg.into())
    }

    pub fn invalid_temporal_claims<S: Into<String>>(msg: S) -> Self {
        TokenError::InvalidTemporalClaims(msg.into())
    }

    /// Returns `true` when the error came from checking a presented token
    /// rather than from local key material or caller input.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            TokenError::MalformedToken(_)
                | TokenError::InvalidSignature
                | TokenError::Expired
                | TokenError::NotYetValid
                | TokenError::InvalidTemporalClaims(_)
        )
    }
}
