use axum::{routing::get, Router};

use crate::state::AppState;

pub mod billing;
pub mod contracts;
pub mod health;
pub mod identity;
pub mod payments;
pub mod properties;
pub mod reports;
pub mod tenants;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/me", get(identity::me))
        .merge(tenants::router())
        .merge(properties::router())
        .merge(contracts::router())
        .merge(payments::router())
        .merge(billing::router())
        .merge(reports::router())
}
