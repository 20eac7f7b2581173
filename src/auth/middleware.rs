//! JWT validation middleware and the authenticated-user extractor.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, Uri, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation, decode, encode};
use tracing::warn;

use super::claims::Claims;
use super::config::{AuthConfig, DevUser};
use super::error::AuthError;

/// Name of the cookie carrying the bearer token for browser clients.
const AUTH_COOKIE: &str = "auth_token";

/// Dev-mode bypass header.
const DEV_USER_HEADER: &str = "x-dev-user";

/// Lifetime of tokens minted for dev users.
const DEV_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Shared authentication state.
#[derive(Clone)]
pub struct AuthState {
    inner: Arc<AuthStateInner>,
}

struct AuthStateInner {
    config: AuthConfig,
    secret: Option<String>,
    dev_users: Vec<DevUser>,
}

impl AuthState {
    /// Create authentication state from validated configuration.
    pub fn new(config: AuthConfig) -> Self {
        let secret = config.resolve_jwt_secret().ok().flatten();

        // Fall back to built-in dev users so a fresh checkout can exercise
        // the relay without editing config first.
        let dev_users = if config.dev_users.is_empty() {
            vec![
                DevUser {
                    id: "dev".to_string(),
                    name: "Dev User".to_string(),
                    email: "dev@example.com".to_string(),
                },
                DevUser {
                    id: "demo".to_string(),
                    name: "Demo User".to_string(),
                    email: "demo@example.com".to_string(),
                },
            ]
        } else {
            config.dev_users.clone()
        };

        Self {
            inner: Arc::new(AuthStateInner {
                config,
                secret,
                dev_users,
            }),
        }
    }

    /// Whether dev bypass mode is enabled.
    pub fn is_dev_mode(&self) -> bool {
        self.inner.config.dev_mode
    }

    /// Configured CORS origins.
    pub fn allowed_origins(&self) -> &[String] {
        &self.inner.config.allowed_origins
    }

    /// Dev users admitted in dev mode.
    pub fn dev_users(&self) -> &[DevUser] {
        &self.inner.dev_users
    }

    /// Upper bound for handshake-time verification.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.inner.config.handshake_timeout_secs)
    }

    /// Verify a bearer token and return its claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let secret = self
            .inner
            .secret
            .as_deref()
            .ok_or_else(|| AuthError::Internal("JWT secret not configured".to_string()))?;

        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(err.to_string()),
        })
    }

    /// Mint a token for a dev user. Used by the test suite and local setups;
    /// real tokens come from the platform's identity subsystem.
    pub fn generate_dev_token(&self, user: &DevUser) -> Result<String, AuthError> {
        let secret = self
            .inner
            .secret
            .as_deref()
            .ok_or_else(|| AuthError::Internal("JWT secret not configured".to_string()))?;

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.clone(),
            exp: now + DEV_TOKEN_TTL_SECS,
            iat: Some(now),
            email: Some(user.email.clone()),
            name: Some(user.name.clone()),
            preferred_username: None,
        };

        encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|err| AuthError::Internal(err.to_string()))
    }
}

/// The authenticated caller, resolved by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    id: String,
    display_name: String,
}

impl CurrentUser {
    /// Stable user identifier from the verified credential.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name carried by the credential.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::MissingCredential)
    }
}

/// Authentication middleware for protected routes.
///
/// Verifies the credential once per request and stores the resolved
/// `CurrentUser` as a request extension.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = authenticate(&auth, &request)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn authenticate(auth: &AuthState, request: &Request) -> Result<CurrentUser, AuthError> {
    // Dev bypass: X-Dev-User names a configured dev user directly.
    if auth.is_dev_mode()
        && let Some(value) = request.headers().get(DEV_USER_HEADER)
    {
        let requested = value.to_str().unwrap_or_default();
        let user = auth
            .dev_users()
            .iter()
            .find(|u| u.id == requested)
            .ok_or_else(|| AuthError::UnknownDevUser(requested.to_string()))?;
        return Ok(CurrentUser {
            id: user.id.clone(),
            display_name: user.name.clone(),
        });
    }

    let token =
        extract_token(request.headers(), request.uri()).ok_or(AuthError::MissingCredential)?;
    let claims = auth.verify_token(&token)?;

    Ok(CurrentUser {
        display_name: claims.display_name().to_string(),
        id: claims.sub,
    })
}

/// Pull the bearer token from the Authorization header, the auth cookie,
/// or (for browser WebSocket clients, which cannot set headers on the
/// upgrade request) the `token` query parameter.
fn extract_token(headers: &header::HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION)
        && let Ok(value) = value.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    if let Some(value) = headers.get(header::COOKIE)
        && let Ok(value) = value.to_str()
    {
        for cookie in value.split(';') {
            if let Some(token) = cookie.trim().strip_prefix(AUTH_COOKIE)
                && let Some(token) = token.strip_prefix('=')
            {
                return Some(token.to_string());
            }
        }
    }

    if let Some(query) = uri.query() {
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=')
                && key == "token"
            {
                return Some(value.to_string());
            }
        }
    }

    None
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        warn!("Authentication failed: {}", self);
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": "UNAUTHORIZED",
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}
