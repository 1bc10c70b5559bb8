use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreateTenantInput,
        TenantPath, TenantsQuery, UpdateTenantInput,
    },
    services::audit::write_audit_log,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/tenants",
            axum::routing::get(list_tenants).post(create_tenant),
        )
        .route(
            "/tenants/{tenant_id}",
            axum::routing::get(get_tenant)
                .patch(update_tenant)
                .delete(delete_tenant),
        )
}

async fn list_tenants(
    State(state): State<AppState>,
    Query(query): Query<TenantsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let _user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        filters.insert("status".to_string(), Value::String(status));
    }
    if let Some(property_id) = non_empty_opt(query.property_id.as_deref()) {
        filters.insert("property_id".to_string(), Value::String(property_id));
    }

    let rows = list_rows(
        pool,
        "tenants",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "created_at",
        false,
    )
    .await?;

    let enriched = attach_property_names(pool, rows).await?;
    Ok(Json(json!({ "data": enriched })))
}

async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTenantInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    if let Some(property_id) = non_empty_opt(payload.property_id.as_deref()) {
        // Assigning a tenant takes the property off the vacant list.
        let property = get_row(pool, "properties", &property_id, "id")
            .await
            .map_err(|_| AppError::BadRequest("Invalid property_id.".to_string()))?;
        if value_str(&property, "status") == "occupied" {
            return Err(AppError::Conflict(
                "Property is already occupied.".to_string(),
            ));
        }
    }

    let record = remove_nulls(serialize_to_map(&payload));
    let created = create_row(pool, "tenants", &record).await?;
    let tenant_id = value_str(&created, "id");

    if let Some(property_id) = non_empty_opt(payload.property_id.as_deref()) {
        let mut patch = Map::new();
        patch.insert("status".to_string(), Value::String("occupied".to_string()));
        let _ = update_row(pool, "properties", &property_id, &patch, "id").await;
    }

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "create",
        "tenants",
        Some(&tenant_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let _user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut record = get_row(pool, "tenants", &path.tenant_id, "id").await?;

    let tenant_filter = json_map(&[("tenant_id", Value::String(path.tenant_id.clone()))]);
    let contracts = list_rows(
        pool,
        "contracts",
        Some(&tenant_filter),
        200,
        0,
        "contract_start_date",
        true,
    )
    .await?;
    let payments = list_rows(
        pool,
        "payments",
        Some(&tenant_filter),
        500,
        0,
        "due_date",
        false,
    )
    .await?;

    let property_id = value_str(&record, "property_id");
    let property = if property_id.is_empty() {
        None
    } else {
        get_row(pool, "properties", &property_id, "id").await.ok()
    };

    if let Some(obj) = record.as_object_mut() {
        obj.insert("property".to_string(), property.unwrap_or(Value::Null));
        obj.insert("contracts".to_string(), Value::Array(contracts));
        obj.insert("payments".to_string(), Value::Array(payments));
    }

    Ok(Json(record))
}

async fn update_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateTenantInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "tenants", &path.tenant_id, "id").await?;
    let patch = remove_nulls(serialize_to_map(&payload));
    if patch.is_empty() {
        return Ok(Json(record));
    }

    let updated = update_row(pool, "tenants", &path.tenant_id, &patch, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "update",
        "tenants",
        Some(&path.tenant_id),
        Some(record),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let removed = delete_row(pool, "tenants", &path.tenant_id, "id").await?;

    // Free the property the tenant occupied.
    let property_id = value_str(&removed, "property_id");
    if !property_id.is_empty() {
        let mut patch = Map::new();
        patch.insert("status".to_string(), Value::String("vacant".to_string()));
        let _ = update_row(pool, "properties", &property_id, &patch, "id").await;
    }

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "delete",
        "tenants",
        Some(&path.tenant_id),
        Some(removed.clone()),
        None,
    )
    .await;

    Ok(Json(json!({ "deleted": removed })))
}

async fn attach_property_names(pool: &sqlx::PgPool, rows: Vec<Value>) -> AppResult<Vec<Value>> {
    if rows.is_empty() {
        return Ok(rows);
    }

    let property_ids = rows
        .iter()
        .map(|row| value_str(row, "property_id"))
        .filter(|id| !id.is_empty())
        .collect::<HashSet<_>>();

    let mut property_names: HashMap<String, String> = HashMap::new();
    if !property_ids.is_empty() {
        let properties = list_rows(
            pool,
            "properties",
            Some(&json_map(&[(
                "id",
                Value::Array(property_ids.iter().cloned().map(Value::String).collect()),
            )])),
            std::cmp::max(200, property_ids.len() as i64),
            0,
            "created_at",
            false,
        )
        .await?;
        for property in properties {
            let id = value_str(&property, "id");
            let name = value_str(&property, "name");
            if !id.is_empty() && !name.is_empty() {
                property_names.insert(id, name);
            }
        }
    }

    let mut enriched = Vec::with_capacity(rows.len());
    for mut row in rows {
        if let Some(obj) = row.as_object_mut() {
            let property_id = obj
                .get("property_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            obj.insert(
                "property_name".to_string(),
                property_names
                    .get(&property_id)
                    .cloned()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
        }
        enriched.push(row);
    }

    Ok(enriched)
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

fn json_map(entries: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert((*key).to_string(), value.clone());
    }
    map
}
