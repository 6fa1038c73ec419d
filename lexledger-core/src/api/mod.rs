//! HTTP adapter over the ledger.
//!
//! Handlers only translate between JSON and ledger calls; the caller's firm
//! and user come from the bearer token via [`crate::auth::CurrentUser`].

pub mod billing_packs;
pub mod error;
pub mod invoices;
pub mod payments;
pub mod time_entries;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::Json,
    routing::get,
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::config::Config;
use crate::ledger::Ledger;

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub db: PgPool,

    pub ledger: Ledger,
    pub config: Arc<Config>,
}

/// Optional `start_date`/`end_date` query parameters of the stats endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct DateRange {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Health check endpoint.
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lexledger-core",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Database health check endpoint.
///
/// Verifies that the database connection is working by executing
/// a simple query.
async fn db_health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "database": "connected"
    })))
}

/// Creates the application router: public health routes plus the
/// authenticated ledger API under `/api`.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(invoices::router())
        .merge(payments::router())
        .merge(time_entries::router())
        .merge(billing_packs::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::jwt_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/health/db", get(db_health_check))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
