use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};
use std::str::FromStr;

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::{create_row, get_row, list_rows},
    schemas::{CreateBillInput, TenantPath},
    services::{
        audit::write_audit_log,
        billing::{bill_draft, billed_months, unbilled_months, BillingMonth, ContractTerm},
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/billing/{tenant_id}/months",
            axum::routing::get(get_billable_months),
        )
        .route(
            "/billing/{tenant_id}/bills",
            axum::routing::post(create_bill),
        )
}

/// The months of the tenant's contract term, split into billed and open.
/// An empty `unbilled` list with a contract present means the term is
/// fully billed, which is not the same condition as the missing-contract
/// error below.
async fn get_billable_months(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let _user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let tenant = get_row(pool, "tenants", &path.tenant_id, "id").await?;
    let (contract, term) = primary_contract(pool, &path.tenant_id).await?;

    let payments = tenant_payments(pool, &path.tenant_id).await?;
    let all = term.months();
    let billed = billed_months(&payments);
    let open = unbilled_months(&all, &billed);

    Ok(Json(json!({
        "tenant_id": path.tenant_id,
        "rent_amount": value_f64(&tenant, "rent_amount"),
        "contract": {
            "id": value_str(&contract, "id"),
            "contract_start_date": value_str(&contract, "contract_start_date"),
            "contract_end_date": value_str(&contract, "contract_end_date"),
        },
        "months": render_months(&all),
        "unbilled": render_months(&open),
        "fully_billed": open.is_empty() && !all.is_empty(),
    })))
}

/// Create a pending payment for one unbilled month of the tenant's term.
async fn create_bill(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
    Json(payload): Json<CreateBillInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let month = BillingMonth::from_str(&payload.month)?;

    let tenant = get_row(pool, "tenants", &path.tenant_id, "id").await?;
    let property_id = value_str(&tenant, "property_id");
    if property_id.is_empty() {
        return Err(AppError::UnprocessableEntity(
            "Tenant has no assigned property to bill against.".to_string(),
        ));
    }

    let (_, term) = primary_contract(pool, &path.tenant_id).await?;

    let all = term.months();
    if !all.contains(&month) {
        return Err(AppError::BadRequest(format!(
            "Month {month} is outside the contract term."
        )));
    }

    let payments = tenant_payments(pool, &path.tenant_id).await?;
    let billed = billed_months(&payments);
    if billed.contains(&month) {
        return Err(AppError::Conflict(format!(
            "Month {month} has already been billed for this tenant."
        )));
    }

    let draft = bill_draft(
        &path.tenant_id,
        &property_id,
        value_f64(&tenant, "rent_amount"),
        month,
    );

    // The unique (tenant_id, due_date) index closes the race with a
    // concurrent emitter; the Conflict from the insert reads the same as
    // the pre-check above.
    let created = create_row(pool, "payments", &draft.into_payload())
        .await
        .map_err(|error| match error {
            AppError::Conflict(_) => AppError::Conflict(format!(
                "Month {month} has already been billed for this tenant."
            )),
            other => other,
        })?;
    let payment_id = value_str(&created, "id");

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "create_bill",
        "payments",
        Some(&payment_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

/// The tenant's primary contract: earliest start date on file. Tenants
/// without one cannot be billed, and the caller shows a dedicated empty
/// state for that, so it is its own error.
async fn primary_contract(
    pool: &sqlx::PgPool,
    tenant_id: &str,
) -> AppResult<(Value, ContractTerm)> {
    let contracts = list_rows(
        pool,
        "contracts",
        Some(&json_map(&[(
            "tenant_id",
            Value::String(tenant_id.to_string()),
        )])),
        50,
        0,
        "contract_start_date",
        true,
    )
    .await?;

    let contract = contracts.into_iter().next().ok_or_else(|| {
        AppError::NotFound("Tenant has no contract on file.".to_string())
    })?;

    let term = ContractTerm::from_row(&contract)?;
    Ok((contract, term))
}

async fn tenant_payments(pool: &sqlx::PgPool, tenant_id: &str) -> AppResult<Vec<Value>> {
    list_rows(
        pool,
        "payments",
        Some(&json_map(&[(
            "tenant_id",
            Value::String(tenant_id.to_string()),
        )])),
        1000,
        0,
        "due_date",
        true,
    )
    .await
}

fn render_months(months: &[BillingMonth]) -> Vec<String> {
    months.iter().map(ToString::to_string).collect()
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

fn value_f64(row: &Value, key: &str) -> f64 {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(|value| {
            value
                .as_f64()
                .or_else(|| value.as_str().and_then(|raw| raw.trim().parse().ok()))
        })
        .unwrap_or(0.0)
}

fn json_map(entries: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert((*key).to_string(), value.clone());
    }
    map
}
