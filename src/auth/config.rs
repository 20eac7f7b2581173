//! Authentication configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default handshake verification timeout in seconds.
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable development mode (bypass JWT validation via X-Dev-User).
    pub dev_mode: bool,

    /// JWT secret for HS256.
    /// REQUIRED when dev_mode is false. Supports `env:VAR_NAME` syntax.
    pub jwt_secret: Option<String>,

    /// Development users (only used in dev mode).
    pub dev_users: Vec<DevUser>,

    /// Allowed CORS origins. If empty in production, CORS is disabled.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Upper bound for handshake-time credential verification, in seconds.
    /// A verifier that hangs past this closes the connection unregistered.
    pub handshake_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            // No default JWT secret - must be explicitly configured
            jwt_secret: None,
            dev_users: Vec::new(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT_SECS,
        }
    }
}

impl AuthConfig {
    /// Resolve the JWT secret, expanding `env:VAR_NAME` syntax.
    /// Returns the resolved secret or None if not configured.
    pub fn resolve_jwt_secret(&self) -> Result<Option<String>, ConfigValidationError> {
        match &self.jwt_secret {
            None => Ok(None),
            Some(value) => {
                if let Some(var_name) = value.strip_prefix("env:") {
                    match std::env::var(var_name) {
                        Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
                        Ok(_) => Err(ConfigValidationError::EnvVarEmpty(var_name.to_string())),
                        Err(_) => Err(ConfigValidationError::EnvVarNotFound(var_name.to_string())),
                    }
                } else {
                    Ok(Some(value.clone()))
                }
            }
        }
    }

    /// Validate the configuration.
    /// Returns an error if the configuration is invalid for the current mode.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.dev_mode {
            // In production mode, JWT secret is required
            let secret = self.resolve_jwt_secret()?;

            match secret {
                None => return Err(ConfigValidationError::MissingJwtSecret),
                Some(ref secret) if secret.len() < 32 => {
                    return Err(ConfigValidationError::JwtSecretTooShort);
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error(
        "JWT secret is required when dev_mode is false. Set jwt_secret in config or via env:VAR_NAME."
    )]
    MissingJwtSecret,
    #[error("JWT secret must be at least 32 characters long.")]
    JwtSecretTooShort,
    #[error("Environment variable '{0}' not found (referenced via env:{0} in config).")]
    EnvVarNotFound(String),
    #[error("Environment variable '{0}' is empty (referenced via env:{0} in config).")]
    EnvVarEmpty(String),
}

/// Development user configuration.
///
/// Dev users exist only to exercise the relay locally and from the test
/// suite; there is no password because there is no login endpoint here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevUser {
    /// User ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

#[cfg(test)]
#[allow(clippy::field_reassign_with_default)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_default() {
        let config = AuthConfig::default();
        assert!(!config.dev_mode);
        // No default JWT secret for security
        assert!(config.jwt_secret.is_none());
        assert!(config.dev_users.is_empty());
    }

    #[test]
    fn test_config_validation_dev_mode() {
        let mut config = AuthConfig::default();
        config.dev_mode = true;
        // Dev mode should be valid without JWT secret
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_production_mode_no_secret() {
        let mut config = AuthConfig::default();
        config.dev_mode = false;
        config.jwt_secret = None;

        assert_eq!(
            config.validate().unwrap_err(),
            ConfigValidationError::MissingJwtSecret
        );
    }

    #[test]
    fn test_config_validation_production_mode_short_secret() {
        let mut config = AuthConfig::default();
        config.dev_mode = false;
        config.jwt_secret = Some("tooshort".to_string());

        assert_eq!(
            config.validate().unwrap_err(),
            ConfigValidationError::JwtSecretTooShort
        );
    }

    #[test]
    fn test_config_validation_production_mode_valid() {
        let mut config = AuthConfig::default();
        config.dev_mode = false;
        config.jwt_secret =
            Some("a-very-long-and-secure-jwt-secret-that-is-at-least-32-chars".to_string());

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_jwt_secret_literal() {
        let mut config = AuthConfig::default();
        config.jwt_secret = Some("my-literal-secret".to_string());

        let resolved = config.resolve_jwt_secret().unwrap();
        assert_eq!(resolved, Some("my-literal-secret".to_string()));
    }

    #[test]
    fn test_resolve_jwt_secret_env_var_not_found() {
        let mut config = AuthConfig::default();
        config.jwt_secret = Some("env:NONEXISTENT_VAR_12345".to_string());

        let result = config.resolve_jwt_secret();
        assert_eq!(
            result.unwrap_err(),
            ConfigValidationError::EnvVarNotFound("NONEXISTENT_VAR_12345".to_string())
        );
    }

    #[test]
    fn test_resolve_jwt_secret_none() {
        let config = AuthConfig::default();
        let resolved = config.resolve_jwt_secret().unwrap();
        assert_eq!(resolved, None);
    }
}
