use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{AppState, DateRange};
use crate::auth::CurrentUser;
use crate::error::LedgerError;
use crate::models::time_entry::{CreateTimeEntry, TimeEntryFilter, TimeEntryStats, UpdateTimeEntry};
use crate::models::TimeEntry;

#[derive(Debug, Deserialize)]
pub struct BulkApproveRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BulkApproveResponse {
    pub approved: u64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/time-entries", get(list_entries).post(create_entry))
        .route("/time-entries/stats", get(entry_stats))
        .route("/time-entries/bulk-approve", post(bulk_approve))
        .route(
            "/time-entries/:id",
            get(get_entry).patch(update_entry).delete(delete_entry),
        )
        .route("/time-entries/:id/approve", post(approve_entry))
        .route("/time-entries/:id/unapprove", post(unapprove_entry))
}

async fn list_entries(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<TimeEntryFilter>,
) -> Result<Json<Vec<TimeEntry>>, LedgerError> {
    Ok(Json(state.ledger.time_entries.list(&user.actor(), &filter).await?))
}

async fn create_entry(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateTimeEntry>,
) -> Result<(StatusCode, Json<TimeEntry>), LedgerError> {
    let entry = state.ledger.time_entries.create(&user.actor(), body).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn entry_stats(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(range): Query<DateRange>,
) -> Result<Json<TimeEntryStats>, LedgerError> {
    let stats = state
        .ledger
        .time_entries
        .stats(&user.actor(), range.start_date, range.end_date)
        .await?;
    Ok(Json(stats))
}

async fn bulk_approve(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<BulkApproveRequest>,
) -> Result<Json<BulkApproveResponse>, LedgerError> {
    let approved = state
        .ledger
        .time_entries
        .bulk_approve(&user.actor(), &body.ids)
        .await?;
    Ok(Json(BulkApproveResponse { approved }))
}

async fn get_entry(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<TimeEntry>, LedgerError> {
    Ok(Json(state.ledger.time_entries.get(&user.actor(), id).await?))
}

async fn update_entry(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTimeEntry>,
) -> Result<Json<TimeEntry>, LedgerError> {
    Ok(Json(state.ledger.time_entries.update(&user.actor(), id, body).await?))
}

async fn delete_entry(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, LedgerError> {
    state.ledger.time_entries.delete(&user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn approve_entry(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<TimeEntry>, LedgerError> {
    Ok(Json(state.ledger.time_entries.approve(&user.actor(), id).await?))
}

async fn unapprove_entry(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<TimeEntry>, LedgerError> {
    Ok(Json(state.ledger.time_entries.unapprove(&user.actor(), id).await?))
}
