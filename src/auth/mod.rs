//! Handshake Authentication
//!
//! Verifies the bearer token presented on the WebSocket handshake and
//! resolves it into the [`Identity`] a connection carries for its lifetime.
//!
//! Only the verification half of the token lifecycle lives here; tokens are
//! issued by the surrounding REST backend with the same shared secret.

mod error;
mod token;

pub use error::AuthError;
pub use token::{Claims, Identity, TokenValidator};

#[cfg(test)]
pub(crate) use token::issue_token;
