//! User-facing messages for hosted-auth failures.
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("E-mail ou senha incorretos.")]
    InvalidCredentials,
    #[error("Falha de conexão. Verifique sua internet e tente novamente.")]
    Network,
    #[error("Muitas tentativas. Aguarde alguns minutos e tente novamente.")]
    RateLimited,
    #[error("E-mail inválido.")]
    InvalidEmail,
    #[error("Não foi possível entrar ({0}).")]
    Other(String),
}

impl AuthError {
    /// Map an auth-service error code (`auth/wrong-password`, ...) to a message.
    pub fn from_code(code: &str) -> Self {
        match code.trim().trim_start_matches("auth/") {
            "invalid-credential" | "invalid-login-credentials" | "wrong-password"
            | "user-not-found" | "user-disabled" => AuthError::InvalidCredentials,
            "network-request-failed" | "timeout" => AuthError::Network,
            "too-many-requests" | "quota-exceeded" => AuthError::RateLimited,
            "invalid-email" | "missing-email" => AuthError::InvalidEmail,
            other => AuthError::Other(other.to_string()),
        }
    }
}

/// Syntax check done before calling the auth service.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if EMAIL.is_match(email.trim()) {
        Ok(())
    } else {
        Err(AuthError::InvalidEmail)
    }
}
