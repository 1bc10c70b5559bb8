use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::{delete_row, get_row, list_rows, update_row},
    schemas::{clamp_limit_in_range, PaymentPath, PaymentsQuery, RecordPaymentInput},
    services::{audit::write_audit_log, billing::PaymentStatus, reporting::effective_status},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/payments", axum::routing::get(list_payments))
        .route(
            "/payments/{payment_id}",
            axum::routing::get(get_payment).delete(delete_payment),
        )
        .route(
            "/payments/{payment_id}/record-payment",
            axum::routing::post(record_payment),
        )
        .route(
            "/payments/{payment_id}/revert",
            axum::routing::post(revert_payment),
        )
}

async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let _user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(tenant_id) = non_empty_opt(query.tenant_id.as_deref()) {
        filters.insert("tenant_id".to_string(), Value::String(tenant_id));
    }

    let mut rows = list_rows(
        pool,
        "payments",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "due_date",
        false,
    )
    .await?;

    if let Some(due_from) = non_empty_opt(query.due_from.as_deref()) {
        rows.retain(|row| {
            row.as_object()
                .and_then(|obj| obj.get("due_date"))
                .and_then(Value::as_str)
                .is_some_and(|due_date| due_date >= due_from.as_str())
        });
    }
    if let Some(due_to) = non_empty_opt(query.due_to.as_deref()) {
        rows.retain(|row| {
            row.as_object()
                .and_then(|obj| obj.get("due_date"))
                .and_then(Value::as_str)
                .is_some_and(|due_date| due_date <= due_to.as_str())
        });
    }

    let today = Utc::now().date_naive();
    let mut enriched = attach_display_fields(pool, rows, today).await?;

    // Status filtering happens after the overdue label is derived, so
    // `status=overdue` matches what the client table shows.
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        enriched.retain(|row| value_str(row, "display_status") == status);
    }

    Ok(Json(json!({ "data": enriched })))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let _user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "payments", &path.payment_id, "id").await?;
    let today = Utc::now().date_naive();
    let mut enriched = attach_display_fields(pool, vec![record], today).await?;
    Ok(Json(
        enriched.pop().unwrap_or_else(|| Value::Object(Map::new())),
    ))
}

/// pending → paid. Amount and due date are fixed at creation and cannot
/// be edited here.
async fn record_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
    Json(payload): Json<RecordPaymentInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "payments", &path.payment_id, "id").await?;
    if stored_status(&record) == PaymentStatus::Paid {
        return Err(AppError::Conflict(
            "Payment is already recorded as paid.".to_string(),
        ));
    }

    let payment_method = payload.payment_method.trim().to_string();
    if payment_method.is_empty() {
        return Err(AppError::BadRequest(
            "payment_method is required.".to_string(),
        ));
    }
    let payment_date = match non_empty_opt(payload.payment_date.as_deref()) {
        Some(raw) => parse_date(&raw)
            .ok_or_else(|| AppError::BadRequest("payment_date must be YYYY-MM-DD.".to_string()))?,
        None => Utc::now().date_naive(),
    };

    let mut patch = Map::new();
    patch.insert(
        "status".to_string(),
        Value::String(PaymentStatus::Paid.as_str().to_string()),
    );
    patch.insert(
        "payment_date".to_string(),
        Value::String(payment_date.format("%Y-%m-%d").to_string()),
    );
    patch.insert("payment_method".to_string(), Value::String(payment_method));

    let updated = update_row(pool, "payments", &path.payment_id, &patch, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "record_payment",
        "payments",
        Some(&path.payment_id),
        Some(record),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

/// paid → pending. Clears the payment fields so the bill shows as
/// outstanding again.
async fn revert_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "payments", &path.payment_id, "id").await?;
    if stored_status(&record) != PaymentStatus::Paid {
        return Err(AppError::Conflict(
            "Only a paid payment can be reverted.".to_string(),
        ));
    }

    let mut patch = Map::new();
    patch.insert(
        "status".to_string(),
        Value::String(PaymentStatus::Pending.as_str().to_string()),
    );
    patch.insert("payment_date".to_string(), Value::Null);
    patch.insert("payment_method".to_string(), Value::Null);

    let updated = update_row(pool, "payments", &path.payment_id, &patch, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "revert_payment",
        "payments",
        Some(&path.payment_id),
        Some(record),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let removed = delete_row(pool, "payments", &path.payment_id, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "delete",
        "payments",
        Some(&path.payment_id),
        Some(removed.clone()),
        None,
    )
    .await;

    Ok(Json(json!({ "deleted": removed })))
}

/// Join tenant and property names and stamp the derived status the
/// admin table renders.
async fn attach_display_fields(
    pool: &sqlx::PgPool,
    rows: Vec<Value>,
    today: NaiveDate,
) -> AppResult<Vec<Value>> {
    if rows.is_empty() {
        return Ok(rows);
    }

    let tenant_ids = collect_ids(&rows, "tenant_id");
    let property_ids = collect_ids(&rows, "property_id");

    let tenants = fetch_by_ids(pool, "tenants", &tenant_ids).await?;
    let properties = fetch_by_ids(pool, "properties", &property_ids).await?;

    let tenant_names = tenants
        .iter()
        .filter_map(|row| {
            let id = value_str(row, "id");
            if id.is_empty() {
                return None;
            }
            let full_name = format!(
                "{} {}",
                value_str(row, "first_name"),
                value_str(row, "last_name")
            )
            .trim()
            .to_string();
            Some((id, full_name))
        })
        .collect::<HashMap<_, _>>();
    let property_names = properties
        .iter()
        .filter_map(|row| {
            let id = value_str(row, "id");
            let name = value_str(row, "name");
            if id.is_empty() || name.is_empty() {
                return None;
            }
            Some((id, name))
        })
        .collect::<HashMap<_, _>>();

    let mut enriched = Vec::with_capacity(rows.len());
    for mut row in rows {
        let display = effective_status(&row, today);
        if let Some(obj) = row.as_object_mut() {
            let tenant_id = obj
                .get("tenant_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let property_id = obj
                .get("property_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            obj.insert(
                "tenant_name".to_string(),
                tenant_names
                    .get(&tenant_id)
                    .cloned()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            obj.insert(
                "property_name".to_string(),
                property_names
                    .get(&property_id)
                    .cloned()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            obj.insert(
                "display_status".to_string(),
                Value::String(display.as_str().to_string()),
            );
        }
        enriched.push(row);
    }

    Ok(enriched)
}

async fn fetch_by_ids(
    pool: &sqlx::PgPool,
    table: &str,
    ids: &HashSet<String>,
) -> AppResult<Vec<Value>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    list_rows(
        pool,
        table,
        Some(&json_map(&[(
            "id",
            Value::Array(ids.iter().cloned().map(Value::String).collect()),
        )])),
        std::cmp::max(200, ids.len() as i64),
        0,
        "created_at",
        false,
    )
    .await
}

fn collect_ids(rows: &[Value], key: &str) -> HashSet<String> {
    rows.iter()
        .map(|row| value_str(row, key))
        .filter(|id| !id.is_empty())
        .collect()
}

fn stored_status(row: &Value) -> PaymentStatus {
    PaymentStatus::parse(&value_str(row, "status")).unwrap_or(PaymentStatus::Pending)
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

fn json_map(entries: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert((*key).to_string(), value.clone());
    }
    map
}
