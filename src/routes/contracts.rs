use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, ContractPath, ContractsQuery,
        CreateContractInput, UpdateContractInput,
    },
    services::audit::write_audit_log,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/contracts",
            axum::routing::get(list_contracts).post(create_contract),
        )
        .route(
            "/contracts/{contract_id}",
            axum::routing::get(get_contract)
                .patch(update_contract)
                .delete(delete_contract),
        )
}

async fn list_contracts(
    State(state): State<AppState>,
    Query(query): Query<ContractsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let _user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(tenant_id) = non_empty_opt(query.tenant_id.as_deref()) {
        filters.insert("tenant_id".to_string(), Value::String(tenant_id));
    }
    if let Some(property_id) = non_empty_opt(query.property_id.as_deref()) {
        filters.insert("property_id".to_string(), Value::String(property_id));
    }

    let rows = list_rows(
        pool,
        "contracts",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn create_contract(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateContractInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    validate_term(&payload.contract_start_date, &payload.contract_end_date)?;

    get_row(pool, "tenants", &payload.tenant_id, "id")
        .await
        .map_err(|_| AppError::BadRequest("Invalid tenant_id.".to_string()))?;
    get_row(pool, "properties", &payload.property_id, "id")
        .await
        .map_err(|_| AppError::BadRequest("Invalid property_id.".to_string()))?;

    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, "contracts", &record).await?;
    let contract_id = value_str(&created, "id");

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "create",
        "contracts",
        Some(&contract_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_contract(
    State(state): State<AppState>,
    Path(path): Path<ContractPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let _user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "contracts", &path.contract_id, "id").await?;
    Ok(Json(record))
}

async fn update_contract(
    State(state): State<AppState>,
    Path(path): Path<ContractPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateContractInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "contracts", &path.contract_id, "id").await?;
    let patch = remove_nulls(serialize_to_map(&payload));
    if patch.is_empty() {
        return Ok(Json(record));
    }

    // Validate the term the row will have after the patch is applied.
    let merged_start = patch
        .get("contract_start_date")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| value_str(&record, "contract_start_date"));
    let merged_end = patch
        .get("contract_end_date")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| value_str(&record, "contract_end_date"));
    validate_term(&merged_start, &merged_end)?;

    let updated = update_row(pool, "contracts", &path.contract_id, &patch, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "update",
        "contracts",
        Some(&path.contract_id),
        Some(record),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_contract(
    State(state): State<AppState>,
    Path(path): Path<ContractPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let removed = delete_row(pool, "contracts", &path.contract_id, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "delete",
        "contracts",
        Some(&path.contract_id),
        Some(removed.clone()),
        None,
    )
    .await;

    Ok(Json(json!({ "deleted": removed })))
}

fn validate_term(starts_on: &str, ends_on: &str) -> AppResult<()> {
    let start = parse_date(starts_on).ok_or_else(|| {
        AppError::BadRequest("contract_start_date must be YYYY-MM-DD.".to_string())
    })?;
    let end = parse_date(ends_on).ok_or_else(|| {
        AppError::BadRequest("contract_end_date must be YYYY-MM-DD.".to_string())
    })?;
    if end < start {
        return Err(AppError::BadRequest(
            "contract_end_date must be on or after contract_start_date.".to_string(),
        ));
    }
    Ok(())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency(
            "Supabase database is not configured. Set SUPABASE_DB_URL or DATABASE_URL.".to_string(),
        )
    })
}

fn value_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::validate_term;

    #[test]
    fn accepts_ordered_terms_and_rejects_inverted_ones() {
        assert!(validate_term("2024-01-15", "2024-03-10").is_ok());
        assert!(validate_term("2024-06-01", "2024-06-01").is_ok());
        assert!(validate_term("2024-03-10", "2024-01-15").is_err());
        assert!(validate_term("15/01/2024", "2024-03-10").is_err());
        assert!(validate_term("", "2024-03-10").is_err());
    }
}
