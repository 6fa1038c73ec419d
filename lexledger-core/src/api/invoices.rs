use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::CurrentUser;
use crate::error::LedgerError;
use crate::models::invoice::{
    CreateInvoice, CreateLineItem, InvoiceFilter, InvoiceResponse, InvoiceStats, UpdateInvoice,
    UpdateLineItem,
};
use crate::models::{Invoice, LineItem};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invoices", get(list_invoices).post(create_invoice))
        .route("/invoices/stats", get(invoice_stats))
        .route(
            "/invoices/:id",
            get(get_invoice).patch(update_invoice).delete(cancel_invoice),
        )
        .route("/invoices/:id/send", post(send_invoice))
        .route("/invoices/:id/view", post(mark_viewed))
        .route(
            "/invoices/:id/line-items",
            get(list_line_items).post(add_line_item),
        )
        .route(
            "/line-items/:id",
            patch(update_line_item).delete(delete_line_item),
        )
}

async fn list_invoices(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<InvoiceFilter>,
) -> Result<Json<Vec<Invoice>>, LedgerError> {
    let invoices = state.ledger.invoices.list(&user.actor(), &filter).await?;
    Ok(Json(invoices))
}

async fn create_invoice(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateInvoice>,
) -> Result<(StatusCode, Json<Invoice>), LedgerError> {
    let invoice = state.ledger.invoices.create(&user.actor(), body).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

async fn invoice_stats(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<InvoiceStats>, LedgerError> {
    Ok(Json(state.ledger.invoices.stats(&user.actor()).await?))
}

async fn get_invoice(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, LedgerError> {
    Ok(Json(state.ledger.invoices.get(&user.actor(), id).await?))
}

async fn update_invoice(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateInvoice>,
) -> Result<Json<Invoice>, LedgerError> {
    Ok(Json(state.ledger.invoices.update(&user.actor(), id, body).await?))
}

async fn cancel_invoice(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, LedgerError> {
    Ok(Json(state.ledger.invoices.delete(&user.actor(), id).await?))
}

async fn send_invoice(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, LedgerError> {
    Ok(Json(state.ledger.invoices.send(&user.actor(), id).await?))
}

async fn mark_viewed(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, LedgerError> {
    Ok(Json(state.ledger.invoices.mark_viewed(&user.actor(), id).await?))
}

async fn list_line_items(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LineItem>>, LedgerError> {
    Ok(Json(state.ledger.invoices.list_line_items(&user.actor(), id).await?))
}

async fn add_line_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<CreateLineItem>,
) -> Result<(StatusCode, Json<LineItem>), LedgerError> {
    let item = state.ledger.invoices.add_line_item(&user.actor(), id, body).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_line_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateLineItem>,
) -> Result<Json<LineItem>, LedgerError> {
    Ok(Json(state.ledger.invoices.update_line_item(&user.actor(), id, body).await?))
}

async fn delete_line_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, LedgerError> {
    // Deleting an absent line item is not an error.
    state.ledger.invoices.delete_line_item(&user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
