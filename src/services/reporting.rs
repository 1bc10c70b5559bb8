use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use super::billing::{row_date, BillingMonth, PaymentStatus};

/// The status a payment row should display today. Stored rows only move
/// between `pending` and `paid`; a pending row past its due date is
/// labelled `overdue` here, at read time.
pub fn effective_status(row: &Value, today: NaiveDate) -> PaymentStatus {
    let stored = row_str(row, "status")
        .as_deref()
        .and_then(PaymentStatus::parse)
        .unwrap_or(PaymentStatus::Pending);

    match stored {
        PaymentStatus::Paid => PaymentStatus::Paid,
        PaymentStatus::Pending | PaymentStatus::Overdue => {
            if row_date(row, "due_date").is_some_and(|due| due < today) {
                PaymentStatus::Overdue
            } else {
                PaymentStatus::Pending
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct StatusBreakdown {
    pub paid: i64,
    pub pending: i64,
    pub overdue: i64,
}

pub fn payment_status_breakdown(payments: &[Value], today: NaiveDate) -> StatusBreakdown {
    let mut breakdown = StatusBreakdown::default();
    for payment in payments {
        match effective_status(payment, today) {
            PaymentStatus::Paid => breakdown.paid += 1,
            PaymentStatus::Pending => breakdown.pending += 1,
            PaymentStatus::Overdue => breakdown.overdue += 1,
        }
    }
    breakdown
}

/// Paid amounts grouped by the month the payment was made, chronological.
pub fn monthly_revenue(payments: &[Value]) -> BTreeMap<BillingMonth, f64> {
    let mut revenue = BTreeMap::new();
    for payment in payments {
        if effective_paid(payment) {
            if let Some(paid_on) = row_date(payment, "payment_date") {
                let entry = revenue
                    .entry(BillingMonth::from_date(paid_on))
                    .or_insert(0.0);
                *entry += row_amount(payment);
            }
        }
    }
    revenue
}

pub fn revenue_in_window(payments: &[Value], from: NaiveDate, to: NaiveDate) -> f64 {
    payments
        .iter()
        .filter(|payment| effective_paid(payment))
        .filter_map(|payment| row_date(payment, "payment_date").map(|paid_on| (payment, paid_on)))
        .filter(|(_, paid_on)| *paid_on >= from && *paid_on <= to)
        .map(|(payment, _)| row_amount(payment))
        .sum()
}

pub fn overdue_value(payments: &[Value], today: NaiveDate) -> f64 {
    payments
        .iter()
        .filter(|payment| effective_status(payment, today) == PaymentStatus::Overdue)
        .map(row_amount)
        .sum()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct OccupancySnapshot {
    pub total: i64,
    pub occupied: i64,
    pub vacant: i64,
    pub occupancy_rate: f64,
}

pub fn occupancy_snapshot(properties: &[Value]) -> OccupancySnapshot {
    let total = properties.len() as i64;
    let occupied = properties
        .iter()
        .filter(|property| row_str(property, "status").as_deref() == Some("occupied"))
        .count() as i64;

    let occupancy_rate = if total > 0 {
        round4(occupied as f64 / total as f64)
    } else {
        0.0
    };

    OccupancySnapshot {
        total,
        occupied,
        vacant: total - occupied,
        occupancy_rate,
    }
}

fn effective_paid(row: &Value) -> bool {
    row_str(row, "status")
        .as_deref()
        .and_then(PaymentStatus::parse)
        == Some(PaymentStatus::Paid)
}

fn row_str(row: &Value, key: &str) -> Option<String> {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn row_amount(row: &Value) -> f64 {
    row.as_object()
        .and_then(|obj| obj.get("amount"))
        .and_then(|value| {
            value
                .as_f64()
                .or_else(|| value.as_str().and_then(|raw| raw.trim().parse().ok()))
        })
        .unwrap_or(0.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{
        effective_status, monthly_revenue, occupancy_snapshot, overdue_value,
        payment_status_breakdown, revenue_in_window, StatusBreakdown,
    };
    use crate::services::billing::PaymentStatus;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid test date")
    }

    #[test]
    fn pending_past_due_reads_as_overdue() {
        let today = date("2024-03-15");
        let past_due = json!({"status": "pending", "due_date": "2024-02-01"});
        let current = json!({"status": "pending", "due_date": "2024-03-15"});
        let paid = json!({"status": "paid", "due_date": "2024-02-01"});

        assert_eq!(effective_status(&past_due, today), PaymentStatus::Overdue);
        assert_eq!(effective_status(&current, today), PaymentStatus::Pending);
        assert_eq!(effective_status(&paid, today), PaymentStatus::Paid);
    }

    #[test]
    fn stale_stored_overdue_recovers_when_not_past_due() {
        // A row written as "overdue" by an older client stays consistent
        // with the derived label.
        let today = date("2024-01-01");
        let row = json!({"status": "overdue", "due_date": "2024-06-01"});
        assert_eq!(effective_status(&row, today), PaymentStatus::Pending);
    }

    #[test]
    fn breaks_down_statuses_with_derived_overdue() {
        let today = date("2024-03-15");
        let payments = vec![
            json!({"status": "paid", "due_date": "2024-01-01", "amount": 100.0}),
            json!({"status": "pending", "due_date": "2024-02-01", "amount": 200.0}),
            json!({"status": "pending", "due_date": "2024-04-01", "amount": 300.0}),
        ];
        assert_eq!(
            payment_status_breakdown(&payments, today),
            StatusBreakdown {
                paid: 1,
                pending: 1,
                overdue: 1,
            }
        );
        assert_eq!(overdue_value(&payments, today), 200.0);
    }

    #[test]
    fn groups_paid_revenue_by_payment_month() {
        let payments = vec![
            json!({"status": "paid", "payment_date": "2024-01-10", "amount": 100.0}),
            json!({"status": "paid", "payment_date": "2024-01-25", "amount": 50.0}),
            json!({"status": "paid", "payment_date": "2024-02-05", "amount": 75.0}),
            json!({"status": "pending", "payment_date": "2024-02-06", "amount": 999.0}),
            json!({"status": "paid", "amount": 999.0}),
        ];
        let revenue = monthly_revenue(&payments);
        let rendered = revenue
            .iter()
            .map(|(month, total)| (month.to_string(), *total))
            .collect::<Vec<_>>();
        assert_eq!(
            rendered,
            vec![("2024-01".to_string(), 150.0), ("2024-02".to_string(), 75.0)]
        );
    }

    #[test]
    fn sums_revenue_inside_the_window_only() {
        let payments = vec![
            json!({"status": "paid", "payment_date": "2024-03-01", "amount": 100.0}),
            json!({"status": "paid", "payment_date": "2024-03-31", "amount": 40.0}),
            json!({"status": "paid", "payment_date": "2024-04-01", "amount": 999.0}),
        ];
        let total = revenue_in_window(&payments, date("2024-03-01"), date("2024-03-31"));
        assert_eq!(total, 140.0);
    }

    #[test]
    fn computes_occupancy_rate() {
        let properties = vec![
            json!({"status": "occupied"}),
            json!({"status": "vacant"}),
            json!({"status": "occupied"}),
            json!({"status": "vacant"}),
        ];
        let snapshot = occupancy_snapshot(&properties);
        assert_eq!(snapshot.total, 4);
        assert_eq!(snapshot.occupied, 2);
        assert_eq!(snapshot.vacant, 2);
        assert_eq!(snapshot.occupancy_rate, 0.5);

        assert_eq!(occupancy_snapshot(&[]).occupancy_rate, 0.0);
    }
}
