use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

fn default_tenant_status_active() -> String {
    "active".to_string()
}
fn default_property_status_vacant() -> String {
    "vacant".to_string()
}
fn default_limit_200() -> i64 {
    200
}
fn default_limit_300() -> i64 {
    300
}
fn default_limit_400() -> i64 {
    400
}

pub fn clamp_limit_in_range(limit: i64, minimum: i64, maximum: i64) -> i64 {
    limit.clamp(minimum, maximum)
}

pub fn serialize_to_map<T>(value: &T) -> serde_json::Map<String, serde_json::Value>
where
    T: serde::Serialize,
{
    let json = serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
    json.as_object().cloned().unwrap_or_default()
}

pub fn remove_nulls(
    mut map: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    map.retain(|_, value| !value.is_null());
    map
}

// ── Tenants ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateTenantInput {
    #[validate(length(min = 1, max = 255))]
    pub first_name: String,
    #[validate(length(min = 1, max = 255))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    pub property_id: Option<String>,
    #[serde(default)]
    pub rent_amount: f64,
    pub lease_start_date: Option<String>,
    #[serde(default = "default_tenant_status_active")]
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateTenantInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub property_id: Option<String>,
    pub rent_amount: Option<f64>,
    pub lease_start_date: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TenantsQuery {
    pub status: Option<String>,
    pub property_id: Option<String>,
    #[serde(default = "default_limit_300")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TenantPath {
    pub tenant_id: String,
}

// ── Properties ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreatePropertyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub address: Option<String>,
    #[serde(rename = "type")]
    pub property_type: Option<String>,
    #[serde(default)]
    pub monthly_rent: f64,
    pub floor_level: Option<String>,
    pub unit_number: Option<String>,
    pub room_details: Option<String>,
    #[serde(default = "default_property_status_vacant")]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdatePropertyInput {
    pub name: Option<String>,
    pub address: Option<String>,
    #[serde(rename = "type")]
    pub property_type: Option<String>,
    pub monthly_rent: Option<f64>,
    pub floor_level: Option<String>,
    pub unit_number: Option<String>,
    pub room_details: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PropertiesQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit_300")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PropertyPath {
    pub property_id: String,
}

// ── Contracts ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct CreateContractInput {
    pub tenant_id: String,
    pub property_id: String,
    pub contract_start_date: String,
    pub contract_end_date: String,
    pub document_url: Option<String>,
    pub document_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateContractInput {
    pub tenant_id: Option<String>,
    pub property_id: Option<String>,
    pub contract_start_date: Option<String>,
    pub contract_end_date: Option<String>,
    pub document_url: Option<String>,
    pub document_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ContractsQuery {
    pub tenant_id: Option<String>,
    pub property_id: Option<String>,
    #[serde(default = "default_limit_200")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ContractPath {
    pub contract_id: String,
}

// ── Payments & billing ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PaymentsQuery {
    pub status: Option<String>,
    pub tenant_id: Option<String>,
    pub due_from: Option<String>,
    pub due_to: Option<String>,
    #[serde(default = "default_limit_400")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PaymentPath {
    pub payment_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct RecordPaymentInput {
    /// Defaults to today when omitted.
    pub payment_date: Option<String>,
    pub payment_method: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct CreateBillInput {
    /// Calendar month to bill, formatted YYYY-MM.
    pub month: String,
}

#[cfg(test)]
mod tests {
    use super::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreateTenantInput,
        UpdateTenantInput,
    };

    #[test]
    fn clamps_limits() {
        assert_eq!(clamp_limit_in_range(0, 1, 500), 1);
        assert_eq!(clamp_limit_in_range(250, 1, 500), 250);
        assert_eq!(clamp_limit_in_range(9000, 1, 500), 500);
    }

    #[test]
    fn strips_nulls_from_patch_payloads() {
        let patch = UpdateTenantInput {
            first_name: Some("Maria".to_string()),
            last_name: None,
            email: None,
            phone: None,
            property_id: None,
            rent_amount: Some(12000.0),
            lease_start_date: None,
            status: None,
            notes: None,
        };
        let map = remove_nulls(serialize_to_map(&patch));
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("first_name"));
        assert!(map.contains_key("rent_amount"));
    }

    #[test]
    fn rejects_invalid_tenant_email() {
        let input = CreateTenantInput {
            first_name: "Maria".to_string(),
            last_name: "Santos".to_string(),
            email: "not-an-email".to_string(),
            phone: None,
            property_id: None,
            rent_amount: 0.0,
            lease_start_date: None,
            status: "active".to_string(),
            notes: None,
        };
        assert!(validate_input(&input).is_err());
    }
}
