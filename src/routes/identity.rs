use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::require_user;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Resolve the signed-in user and mirror it into `app_users` so foreign
/// keys (audit logs) always have a row to point at.
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let pool = state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency(
            "Supabase database is not configured. Set SUPABASE_DB_URL or DATABASE_URL.".to_string(),
        )
    })?;

    let email = user.email.clone().unwrap_or_default();
    sqlx::query(
        "INSERT INTO app_users (id, email)
         VALUES ($1::uuid, $2)
         ON CONFLICT (id)
         DO UPDATE SET email = CASE WHEN EXCLUDED.email <> '' THEN EXCLUDED.email ELSE app_users.email END",
    )
    .bind(&user.id)
    .bind(&email)
    .execute(pool)
    .await
    .map_err(|error| AppError::Dependency(format!("Supabase request failed: {error}")))?;

    Ok(Json(json!({
        "id": user.id,
        "email": user.email,
    })))
}
