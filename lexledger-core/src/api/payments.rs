use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{AppState, DateRange};
use crate::auth::CurrentUser;
use crate::error::LedgerError;
use crate::models::payment::{PaymentStats, RecordPayment, UpdatePayment};
use crate::models::{Invoice, Payment};

/// A payment together with the invoice state it produced.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment: Payment,
    pub invoice: Invoice,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/invoices/:id/payments",
            get(list_payments).post(record_payment),
        )
        .route("/payments/recent", get(recent_payments))
        .route("/payments/stats", get(payment_stats))
        .route(
            "/payments/:id",
            get(get_payment).patch(update_payment).delete(delete_payment),
        )
}

async fn list_payments(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Vec<Payment>>, LedgerError> {
    let payments = state
        .ledger
        .payments
        .list_for_invoice(&user.actor(), invoice_id)
        .await?;
    Ok(Json(payments))
}

async fn record_payment(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(invoice_id): Path<Uuid>,
    Json(body): Json<RecordPayment>,
) -> Result<(StatusCode, Json<PaymentResponse>), LedgerError> {
    let (payment, invoice) = state
        .ledger
        .payments
        .record(&user.actor(), invoice_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(PaymentResponse { payment, invoice })))
}

async fn recent_payments(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<Payment>>, LedgerError> {
    let payments = state
        .ledger
        .payments
        .recent(&user.actor(), query.limit.unwrap_or(10))
        .await?;
    Ok(Json(payments))
}

async fn payment_stats(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(range): Query<DateRange>,
) -> Result<Json<PaymentStats>, LedgerError> {
    let stats = state
        .ledger
        .payments
        .stats(&user.actor(), range.start_date, range.end_date)
        .await?;
    Ok(Json(stats))
}

async fn get_payment(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, LedgerError> {
    Ok(Json(state.ledger.payments.get(&user.actor(), id).await?))
}

async fn update_payment(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdatePayment>,
) -> Result<Json<PaymentResponse>, LedgerError> {
    let (payment, invoice) = state.ledger.payments.update(&user.actor(), id, body).await?;
    Ok(Json(PaymentResponse { payment, invoice }))
}

async fn delete_payment(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, LedgerError> {
    state
        .ledger
        .payments
        .delete(&user.actor(), id)
        .await?
        .map(Json)
        .ok_or_else(|| LedgerError::not_found("invoice_payment", id))
}
