//! JWT verification
//!
//! Tokens are HS256-signed and carry the user's id and display name. They
//! arrive on the handshake as the `token` query parameter.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Claims carried by a chat token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Numeric user id
    pub user_id: i64,
    /// Display name shown to other users
    pub username: String,
    /// Expiry (seconds since epoch)
    pub exp: u64,
    /// Issued-at (seconds since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

/// Who is on the other end of a connection
///
/// Resolved once at handshake and never changed afterwards.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: i64,
    pub display_name: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            display_name: claims.username,
        }
    }
}

/// Verifies handshake tokens against a shared secret
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    /// Create a validator for HS256 tokens signed with `secret`
    pub fn new(secret: &str) -> Self {
        Self::with_leeway(secret, 0)
    }

    /// Create a validator that tolerates `leeway_secs` of clock skew on `exp`
    pub fn with_leeway(secret: &str, leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate a raw token and resolve the identity it carries
    pub fn validate(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        let claims = data.claims;

        if claims.username.trim().is_empty() {
            return Err(AuthError::InvalidClaims("empty username".to_string()));
        }

        Ok(claims.into())
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

/// Sign a token the way the REST backend does (tests only)
#[cfg(test)]
pub(crate) fn issue_token(secret: &str, user_id: i64, username: &str, ttl_secs: i64) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        user_id,
        username: username.to_string(),
        exp: (now + ttl_secs).max(0) as u64,
        iat: Some(now as u64),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
