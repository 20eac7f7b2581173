//! Authentication error types.

use thiserror::Error;

/// Errors raised while verifying a credential.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token has expired")]
    TokenExpired,

    #[error("unknown dev user: {0}")]
    UnknownDevUser(String),

    #[error("credential verification timed out")]
    HandshakeTimeout,

    #[error("authentication error: {0}")]
    Internal(String),
}
