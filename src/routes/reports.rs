use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde_json::{json, Map, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::{count_rows, list_rows},
    services::reporting::{
        monthly_revenue, occupancy_snapshot, overdue_value, payment_status_breakdown, revenue_in_window,
        round2,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/reports/summary", axum::routing::get(summary_report))
        .route(
            "/reports/revenue-by-month",
            axum::routing::get(revenue_by_month_report),
        )
        .route(
            "/reports/payment-status",
            axum::routing::get(payment_status_report),
        )
}

/// The dashboard stat cards: occupancy, revenue this month, overdue
/// value, active tenant count.
async fn summary_report(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let _user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let properties = list_rows(pool, "properties", None, 1000, 0, "created_at", false).await?;
    let payments = list_rows(pool, "payments", None, 1000, 0, "due_date", false).await?;
    let active_tenants = count_rows(
        pool,
        "tenants",
        Some(&json_map(&[(
            "status",
            Value::String("active".to_string()),
        )])),
    )
    .await?;

    let today = Utc::now().date_naive();
    let (month_start, month_end) = current_month_bounds(today);

    let occupancy = occupancy_snapshot(&properties);
    let revenue_this_month = revenue_in_window(&payments, month_start, month_end);
    let overdue = overdue_value(&payments, today);

    Ok(Json(json!({
        "occupancy": occupancy,
        "revenue_this_month": round2(revenue_this_month),
        "overdue_value": round2(overdue),
        "active_tenants": active_tenants,
    })))
}

/// Paid revenue grouped by payment month, oldest first. This is the
/// line-chart series on the reports page.
async fn revenue_by_month_report(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let _user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let payments = list_rows(pool, "payments", None, 1000, 0, "due_date", false).await?;
    let revenue = monthly_revenue(&payments);

    let data = revenue
        .into_iter()
        .map(|(month, total)| {
            json!({
                "month": month.to_string(),
                "revenue": round2(total),
            })
        })
        .collect::<Vec<_>>();

    Ok(Json(json!({ "data": data })))
}

/// Counts per display status, with pending-past-due rows reported as
/// overdue.
async fn payment_status_report(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let _user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let payments = list_rows(pool, "payments", None, 1000, 0, "due_date", false).await?;
    let today = Utc::now().date_naive();
    let breakdown = payment_status_breakdown(&payments, today);

    Ok(Json(json!({ "data": breakdown })))
}

fn current_month_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);
    let end = if today.month() == 12 {
        NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
    }
    .and_then(|first_of_next| first_of_next.pred_opt())
    .unwrap_or(today);
    (start, end)
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency(
            "Supabase database is not configured. Set SUPABASE_DB_URL or DATABASE_URL.".to_string(),
        )
    })
}

fn json_map(entries: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert((*key).to_string(), value.clone());
    }
    map
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::current_month_bounds;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid test date")
    }

    #[test]
    fn month_bounds_cover_first_to_last_day() {
        assert_eq!(
            current_month_bounds(date("2024-02-14")),
            (date("2024-02-01"), date("2024-02-29"))
        );
        assert_eq!(
            current_month_bounds(date("2024-12-31")),
            (date("2024-12-01"), date("2024-12-31"))
        );
    }
}
