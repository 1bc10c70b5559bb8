use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use url::Url;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SupabaseClaims {
    sub: String,
    email: Option<String>,
}

/// Resolve the authenticated Supabase user for this request.
///
/// Verification order matches the deployment options:
///   1. dev override header (non-production only, opt-in)
///   2. local HS256 verification when SUPABASE_JWT_SECRET is set
///   3. HTTP round-trip to the Supabase auth endpoint (slower fallback)
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<SupabaseUser, AppError> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(user_id) = header_value(headers, "x-user-id") {
            return Ok(SupabaseUser {
                id: user_id,
                email: None,
            });
        }
    }

    let token = bearer_token(headers).ok_or_else(|| {
        AppError::Unauthorized("Unauthorized: missing bearer token.".to_string())
    })?;

    if let Some(secret) = state.config.supabase_jwt_secret.as_deref() {
        return decode_supabase_jwt(secret, &token);
    }

    fetch_supabase_user(state, &token).await
}

pub async fn require_user_id(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    Ok(require_user(state, headers).await?.id)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ").or_else(|| raw.strip_prefix("bearer "))?;
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn decode_supabase_jwt(secret: &str, token: &str) -> Result<SupabaseUser, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&["authenticated"]);

    let data = jsonwebtoken::decode::<SupabaseClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|error| AppError::Unauthorized(format!("Unauthorized: invalid token ({error}).")))?;

    if data.claims.sub.trim().is_empty() {
        return Err(AppError::Unauthorized(
            "Unauthorized: token has no subject.".to_string(),
        ));
    }

    Ok(SupabaseUser {
        id: data.claims.sub,
        email: data.claims.email,
    })
}

async fn fetch_supabase_user(state: &AppState, token: &str) -> Result<SupabaseUser, AppError> {
    let base_url = state.config.supabase_url.as_deref().ok_or_else(|| {
        AppError::Dependency(
            "Supabase auth is not configured. Set SUPABASE_JWT_SECRET or SUPABASE_URL.".to_string(),
        )
    })?;
    let service_key = state
        .config
        .supabase_service_role_key
        .as_deref()
        .ok_or_else(|| {
            AppError::Dependency("SUPABASE_SERVICE_ROLE_KEY is not set.".to_string())
        })?;

    let endpoint = Url::parse(base_url)
        .and_then(|url| url.join("/auth/v1/user"))
        .map_err(|error| AppError::Dependency(format!("Invalid SUPABASE_URL: {error}")))?;

    let response = state
        .http_client
        .get(endpoint)
        .header("apikey", service_key)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|error| AppError::Dependency(format!("Supabase auth request failed: {error}")))?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
        return Err(AppError::Unauthorized(
            "Unauthorized: invalid or expired session.".to_string(),
        ));
    }
    if !response.status().is_success() {
        return Err(AppError::Dependency(format!(
            "Supabase auth returned {}.",
            response.status()
        )));
    }

    let user = response
        .json::<SupabaseUser>()
        .await
        .map_err(|error| AppError::Dependency(format!("Supabase auth response invalid: {error}")))?;

    if user.id.trim().is_empty() {
        return Err(AppError::Unauthorized(
            "Unauthorized: Supabase returned no user.".to_string(),
        ));
    }

    Ok(user)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};

    use super::bearer_token;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        assert!(bearer_token(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Token abc"),
        );
        assert!(bearer_token(&headers).is_none());

        let mut empty = HeaderMap::new();
        empty.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer   "),
        );
        assert!(bearer_token(&empty).is_none());
    }
}
