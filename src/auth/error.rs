//! Authentication error types

use thiserror::Error;

/// Reasons a handshake token is rejected
///
/// Every variant maps to `401 Unauthorized` at the handshake; none of them
/// ever reaches the hub.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No token on the request (absent or empty query parameter)
    #[error("Missing token")]
    MissingToken,

    /// Token is not a well-formed JWT
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Token `exp` is in the past
    #[error("Token expired")]
    Expired,

    /// Signature does not match the verification secret
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Token decoded but its claims are unusable
    #[error("Invalid token claims: {0}")]
    InvalidClaims(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                AuthError::InvalidSignature
            }
            ErrorKind::MissingRequiredClaim(claim) => {
                AuthError::InvalidClaims(format!("missing claim `{}`", claim))
            }
            ErrorKind::ImmatureSignature => {
                AuthError::InvalidClaims("token not yet valid".to_string())
            }
            ErrorKind::Json(e) => AuthError::InvalidClaims(e.to_string()),
            _ => AuthError::Malformed(err.to_string()),
        }
    }
}
