use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::CurrentUser;
use crate::error::LedgerError;
use crate::models::billing_pack::{
    BillingPackFilter, BillingPackStats, CreateBillingPack, PackApproval,
};
use crate::models::{BillingPack, TimeEntry};

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub create_invoice: bool,
}

#[derive(Debug, Deserialize)]
pub struct EntryIdsRequest {
    pub time_entry_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNotesRequest {
    pub notes: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/billing-packs", get(list_packs).post(create_pack))
        .route("/billing-packs/generate", post(generate_pack))
        .route("/billing-packs/stats", get(pack_stats))
        .route(
            "/billing-packs/:id",
            get(get_pack).patch(update_notes).delete(delete_pack),
        )
        .route(
            "/billing-packs/:id/entries",
            get(list_pack_entries).post(add_entries),
        )
        .route("/billing-packs/:id/entries/remove", post(remove_entries))
        .route("/billing-packs/:id/send", post(send_pack))
        .route("/billing-packs/:id/approve", post(approve_pack))
}

async fn list_packs(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<BillingPackFilter>,
) -> Result<Json<Vec<BillingPack>>, LedgerError> {
    Ok(Json(state.ledger.billing_packs.list(&user.actor(), &filter).await?))
}

async fn create_pack(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateBillingPack>,
) -> Result<(StatusCode, Json<BillingPack>), LedgerError> {
    let pack = state.ledger.billing_packs.create(&user.actor(), body).await?;
    Ok((StatusCode::CREATED, Json(pack)))
}

async fn generate_pack(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateBillingPack>,
) -> Result<(StatusCode, Json<BillingPack>), LedgerError> {
    let pack = state.ledger.billing_packs.generate(&user.actor(), body).await?;
    Ok((StatusCode::CREATED, Json(pack)))
}

async fn pack_stats(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<BillingPackStats>, LedgerError> {
    Ok(Json(state.ledger.billing_packs.stats(&user.actor()).await?))
}

async fn get_pack(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<BillingPack>, LedgerError> {
    Ok(Json(state.ledger.billing_packs.get(&user.actor(), id).await?))
}

async fn update_notes(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateNotesRequest>,
) -> Result<Json<BillingPack>, LedgerError> {
    let pack = state
        .ledger
        .billing_packs
        .update_notes(&user.actor(), id, body.notes)
        .await?;
    Ok(Json(pack))
}

async fn delete_pack(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, LedgerError> {
    state.ledger.billing_packs.delete(&user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_pack_entries(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TimeEntry>>, LedgerError> {
    Ok(Json(state.ledger.billing_packs.list_entries(&user.actor(), id).await?))
}

async fn add_entries(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<EntryIdsRequest>,
) -> Result<Json<BillingPack>, LedgerError> {
    let pack = state
        .ledger
        .billing_packs
        .add_entries(&user.actor(), id, &body.time_entry_ids)
        .await?;
    Ok(Json(pack))
}

async fn remove_entries(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<EntryIdsRequest>,
) -> Result<Json<BillingPack>, LedgerError> {
    let pack = state
        .ledger
        .billing_packs
        .remove_entries(&user.actor(), id, &body.time_entry_ids)
        .await?;
    Ok(Json(pack))
}

async fn send_pack(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<BillingPack>, LedgerError> {
    Ok(Json(state.ledger.billing_packs.send(&user.actor(), id).await?))
}

async fn approve_pack(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    body: Option<Json<ApproveRequest>>,
) -> Result<Json<PackApproval>, LedgerError> {
    let create_invoice = body.map(|Json(b)| b.create_invoice).unwrap_or(false);
    let approval = state
        .ledger
        .billing_packs
        .approve(&user.actor(), id, create_invoice)
        .await?;
    Ok(Json(approval))
}
