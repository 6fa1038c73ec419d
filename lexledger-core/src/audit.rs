use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::Actor;

/// Audit action recorded for a ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Send,
    View,
    Approve,
    Unapprove,
    BulkApprove,
    Generate,
    RecordPayment,
    UpdatePayment,
    DeletePayment,
    MarkOverdue,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Send => "SEND",
            AuditAction::View => "VIEW",
            AuditAction::Approve => "APPROVE",
            AuditAction::Unapprove => "UNAPPROVE",
            AuditAction::BulkApprove => "BULK_APPROVE",
            AuditAction::Generate => "GENERATE",
            AuditAction::RecordPayment => "RECORD_PAYMENT",
            AuditAction::UpdatePayment => "UPDATE_PAYMENT",
            AuditAction::DeletePayment => "DELETE_PAYMENT",
            AuditAction::MarkOverdue => "MARK_OVERDUE",
        };
        f.write_str(s)
    }
}

/// One audit trail record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub firm_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub entity_type: &'static str,
    pub entity_id: Option<Uuid>,
    pub changes: Option<Value>,
}

impl AuditRecord {
    pub fn new(actor: &Actor, action: AuditAction, entity_type: &'static str, entity_id: Uuid) -> Self {
        Self {
            firm_id: actor.firm_id,
            user_id: Some(actor.user_id),
            action,
            entity_type,
            entity_id: Some(entity_id),
            changes: None,
        }
    }

    pub fn with_changes(mut self, changes: Value) -> Self {
        self.changes = Some(changes);
        self
    }
}

/// Destination for audit records.
///
/// Recording is best-effort: implementations must not block the caller on
/// I/O and must not report failures back. A ledger operation has already
/// committed by the time its audit record is emitted.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Writes audit records to the `audit_logs` table from a detached task.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuditSink for PgAuditSink {
    fn record(&self, record: AuditRecord) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO audit_logs (firm_id, user_id, action, entity_type, entity_id, changes)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(record.firm_id)
            .bind(record.user_id)
            .bind(record.action.to_string())
            .bind(record.entity_type)
            .bind(record.entity_id)
            .bind(record.changes.as_ref())
            .execute(&pool)
            .await;

            if let Err(e) = result {
                warn!(
                    action = %record.action,
                    entity_type = record.entity_type,
                    entity_id = ?record.entity_id,
                    "Failed to write audit record: {}",
                    e
                );
            }
        });
    }
}

/// Emits audit records as tracing events only.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        info!(
            firm_id = %record.firm_id,
            user_id = ?record.user_id,
            action = %record.action,
            entity_type = record.entity_type,
            entity_id = ?record.entity_id,
            "audit"
        );
    }
}
