use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value};

use crate::error::AppError;

/// A calendar month. Ordering and equality use the (year, month) pair only,
/// so a contract ending mid-month still covers that month in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BillingMonth {
    year: i32,
    month: u32,
}

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::BadRequest(format!(
                "Invalid month '{month}'. Expected 1-12."
            )));
        }
        if !(1970..=9999).contains(&year) {
            return Err(AppError::BadRequest(format!(
                "Invalid year '{year}'. Expected 1970-9999."
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Due dates are always anchored to the first day of the billed month.
    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("validated year-month")
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for BillingMonth {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid =
            || AppError::BadRequest(format!("Invalid month '{raw}'. Expected YYYY-MM."));
        let (year_part, month_part) = raw.trim().split_once('-').ok_or_else(invalid)?;
        let year = year_part.parse::<i32>().map_err(|_| invalid())?;
        let month = month_part.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

/// A contract's billing window, parsed out of a raw contract row.
#[derive(Debug, Clone, Copy)]
pub struct ContractTerm {
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

impl ContractTerm {
    pub fn from_row(row: &Value) -> Result<Self, AppError> {
        let starts_on = row_date(row, "contract_start_date").ok_or_else(|| {
            AppError::UnprocessableEntity("Contract is missing a valid start date.".to_string())
        })?;
        let ends_on = row_date(row, "contract_end_date").ok_or_else(|| {
            AppError::UnprocessableEntity("Contract is missing a valid end date.".to_string())
        })?;
        Ok(Self { starts_on, ends_on })
    }

    pub fn months(&self) -> Vec<BillingMonth> {
        enumerate_months(self.starts_on, self.ends_on)
    }
}

/// Every calendar month touched by the inclusive date range, in order.
/// An inverted range is a caller mistake the UI recovers from, so it
/// yields an empty sequence rather than an error.
pub fn enumerate_months(starts_on: NaiveDate, ends_on: NaiveDate) -> Vec<BillingMonth> {
    let mut months = Vec::new();
    if starts_on > ends_on {
        return months;
    }

    let last = BillingMonth::from_date(ends_on);
    let mut current = BillingMonth::from_date(starts_on);
    while current <= last {
        months.push(current);
        current = current.next();
    }
    months
}

/// Order-preserving set difference: the months of `all` not yet billed,
/// without duplicates.
pub fn unbilled_months(
    all: &[BillingMonth],
    billed: &HashSet<BillingMonth>,
) -> Vec<BillingMonth> {
    let mut seen = HashSet::with_capacity(all.len());
    all.iter()
        .copied()
        .filter(|month| !billed.contains(month) && seen.insert(*month))
        .collect()
}

/// Project existing payment rows onto the months they bill. Rows with a
/// missing or unparseable due date are skipped; date components come from
/// a full parse, never from slicing the raw string.
pub fn billed_months(payments: &[Value]) -> HashSet<BillingMonth> {
    payments
        .iter()
        .filter_map(|row| row_date(row, "due_date"))
        .map(BillingMonth::from_date)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Overdue,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }
}

/// A payment-due record ready to persist. New bills always start pending;
/// amount and due date are fixed at creation.
#[derive(Debug, Clone)]
pub struct BillDraft {
    pub tenant_id: String,
    pub property_id: String,
    pub amount: f64,
    pub due_date: NaiveDate,
    pub status: PaymentStatus,
}

pub fn bill_draft(
    tenant_id: &str,
    property_id: &str,
    rent_amount: f64,
    month: BillingMonth,
) -> BillDraft {
    BillDraft {
        tenant_id: tenant_id.to_string(),
        property_id: property_id.to_string(),
        amount: rent_amount,
        due_date: month.first_day(),
        status: PaymentStatus::Pending,
    }
}

impl BillDraft {
    pub fn into_payload(self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("tenant_id".to_string(), Value::String(self.tenant_id));
        payload.insert("property_id".to_string(), Value::String(self.property_id));
        payload.insert("amount".to_string(), serde_json::json!(self.amount));
        payload.insert(
            "due_date".to_string(),
            Value::String(self.due_date.format("%Y-%m-%d").to_string()),
        );
        payload.insert(
            "status".to_string(),
            Value::String(self.status.as_str().to_string()),
        );
        payload
    }
}

pub fn row_date(row: &Value, key: &str) -> Option<NaiveDate> {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::str::FromStr;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::{
        bill_draft, billed_months, enumerate_months, unbilled_months, BillingMonth, ContractTerm,
        PaymentStatus,
    };

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid test date")
    }

    fn month(raw: &str) -> BillingMonth {
        BillingMonth::from_str(raw).expect("valid test month")
    }

    fn as_strings(months: &[BillingMonth]) -> Vec<String> {
        months.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn enumerates_whole_months_in_the_term() {
        let months = enumerate_months(date("2024-01-15"), date("2024-03-10"));
        assert_eq!(as_strings(&months), vec!["2024-01", "2024-02", "2024-03"]);
    }

    #[test]
    fn same_month_term_yields_one_element() {
        let months = enumerate_months(date("2024-06-03"), date("2024-06-28"));
        assert_eq!(as_strings(&months), vec!["2024-06"]);
    }

    #[test]
    fn handles_year_rollover() {
        let months = enumerate_months(date("2023-11-20"), date("2024-02-01"));
        assert_eq!(
            as_strings(&months),
            vec!["2023-11", "2023-12", "2024-01", "2024-02"]
        );
    }

    #[test]
    fn inverted_range_yields_empty_not_error() {
        assert!(enumerate_months(date("2024-03-01"), date("2024-01-01")).is_empty());
    }

    #[test]
    fn length_matches_inclusive_month_count_and_is_strictly_increasing() {
        let starts = date("2022-05-09");
        let ends = date("2024-08-17");
        let months = enumerate_months(starts, ends);

        let expected_len = (2024 - 2022) * 12 + (8 - 5) + 1;
        assert_eq!(months.len(), expected_len as usize);
        assert!(months.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn unbilled_is_disjoint_from_billed_and_a_subsequence() {
        let all = enumerate_months(date("2024-01-15"), date("2024-03-10"));
        let billed = HashSet::from([month("2024-01")]);
        let open = unbilled_months(&all, &billed);

        assert_eq!(as_strings(&open), vec!["2024-02", "2024-03"]);
        assert!(open.iter().all(|m| !billed.contains(m)));
    }

    #[test]
    fn nothing_billed_returns_everything() {
        let all = enumerate_months(date("2024-01-01"), date("2024-04-30"));
        assert_eq!(unbilled_months(&all, &HashSet::new()), all);
    }

    #[test]
    fn fully_billed_returns_nothing() {
        let all = enumerate_months(date("2024-01-01"), date("2024-04-30"));
        let billed = all.iter().copied().collect::<HashSet<_>>();
        assert!(unbilled_months(&all, &billed).is_empty());
    }

    #[test]
    fn duplicate_input_months_are_emitted_once() {
        let all = vec![month("2024-01"), month("2024-01"), month("2024-02")];
        let open = unbilled_months(&all, &HashSet::new());
        assert_eq!(as_strings(&open), vec!["2024-01", "2024-02"]);
    }

    #[test]
    fn projects_billed_months_from_payment_rows() {
        let payments = vec![
            json!({"due_date": "2024-01-01", "status": "paid"}),
            json!({"due_date": "2024-03-01", "status": "pending"}),
            json!({"due_date": "not-a-date"}),
            json!({"amount": 15000.0}),
        ];
        let billed = billed_months(&payments);
        assert_eq!(billed.len(), 2);
        assert!(billed.contains(&month("2024-01")));
        assert!(billed.contains(&month("2024-03")));
    }

    #[test]
    fn bill_draft_anchors_due_date_to_first_of_month() {
        let draft = bill_draft("tenant-1", "property-1", 15000.0, month("2024-02"));
        assert_eq!(draft.status, PaymentStatus::Pending);
        assert_eq!(draft.amount, 15000.0);
        assert_eq!(draft.due_date, date("2024-02-01"));

        let payload = draft.into_payload();
        assert_eq!(payload["tenant_id"], json!("tenant-1"));
        assert_eq!(payload["property_id"], json!("property-1"));
        assert_eq!(payload["amount"], json!(15000.0));
        assert_eq!(payload["due_date"], json!("2024-02-01"));
        assert_eq!(payload["status"], json!("pending"));
    }

    #[test]
    fn parses_and_formats_month_strings() {
        assert_eq!(month("2024-02").to_string(), "2024-02");
        assert_eq!(month(" 2024-12 ").to_string(), "2024-12");
        assert!(BillingMonth::from_str("2024-13").is_err());
        assert!(BillingMonth::from_str("2024").is_err());
        assert!(BillingMonth::from_str("02-2024x").is_err());
        assert!(BillingMonth::from_str("0100-01").is_err());
    }

    #[test]
    fn contract_term_parses_row_dates() {
        let row = json!({
            "contract_start_date": "2024-01-15",
            "contract_end_date": "2024-03-10"
        });
        let term = ContractTerm::from_row(&row).expect("valid term");
        assert_eq!(as_strings(&term.months()), vec!["2024-01", "2024-02", "2024-03"]);

        let missing = json!({"contract_start_date": "2024-01-15"});
        assert!(ContractTerm::from_row(&missing).is_err());
    }

    #[test]
    fn month_ordering_ignores_day_of_month() {
        assert!(month("2024-01") < month("2024-02"));
        assert!(month("2023-12") < month("2024-01"));
        assert_eq!(
            BillingMonth::from_date(date("2024-02-01")),
            BillingMonth::from_date(date("2024-02-29"))
        );
    }
}
