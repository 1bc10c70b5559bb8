use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::repository::table_service::create_row;

/// Best-effort audit trail. A failed audit write is logged and swallowed
/// so it never fails the request it describes.
#[allow(clippy::too_many_arguments)]
pub async fn write_audit_log(
    pool: Option<&PgPool>,
    user_id: Option<&str>,
    action: &str,
    entity_table: &str,
    entity_id: Option<&str>,
    before_state: Option<Value>,
    after_state: Option<Value>,
) {
    let Some(pool) = pool else {
        return;
    };

    let mut record = Map::new();
    record.insert("action".to_string(), Value::String(action.to_string()));
    record.insert(
        "entity_table".to_string(),
        Value::String(entity_table.to_string()),
    );
    if let Some(user_id) = user_id {
        record.insert("user_id".to_string(), Value::String(user_id.to_string()));
    }
    if let Some(entity_id) = entity_id {
        record.insert(
            "entity_id".to_string(),
            Value::String(entity_id.to_string()),
        );
    }
    if let Some(before_state) = before_state {
        record.insert("before_state".to_string(), before_state);
    }
    if let Some(after_state) = after_state {
        record.insert("after_state".to_string(), after_state);
    }

    if let Err(error) = create_row(pool, "audit_logs", &record).await {
        tracing::warn!(action, entity_table, error = %error, "Audit log write failed");
    }
}
