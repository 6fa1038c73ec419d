use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditRecord, AuditSink};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::billing_packs::recalculate_pack_totals;
use crate::ledger::page_window;
use crate::ledger::totals::{fits_scale, time_entry_amount, MONEY_SCALE};
use crate::models::time_entry::{
    CreateTimeEntry, TimeEntryFilter, TimeEntryStats, UpdateTimeEntry,
};
use crate::models::{Actor, TimeEntry};

const ENTITY: &str = "time_entry";

/// Column list for `time_entries` selected through the `te` alias.
pub(crate) const TIME_ENTRY_COLUMNS: &str = "te.id, te.firm_id, te.matter_id, te.user_id, \
     te.entry_date, te.duration_minutes, te.hourly_rate, te.amount, te.description, \
     te.billable, te.billed, te.approved_by, te.approved_at, te.created_at, te.updated_at";

/// Time entry store and its billing-state transitions.
#[derive(Clone)]
pub struct TimeEntryService {
    pool: PgPool,
    audit: Arc<dyn AuditSink>,
}

impl TimeEntryService {
    pub fn new(pool: PgPool, audit: Arc<dyn AuditSink>) -> Self {
        Self { pool, audit }
    }

    /// Records a new, unapproved entry for the acting user.
    #[instrument(skip(self, request), fields(firm_id = %actor.firm_id))]
    pub async fn create(&self, actor: &Actor, request: CreateTimeEntry) -> LedgerResult<TimeEntry> {
        validate_work(request.duration_minutes, request.hourly_rate, &request.description)?;

        let amount = time_entry_amount(request.duration_minutes, request.hourly_rate);
        let entry = sqlx::query_as::<_, TimeEntry>(
            r#"
            INSERT INTO time_entries AS te (
                id, firm_id, matter_id, user_id, entry_date, duration_minutes,
                hourly_rate, amount, description, billable
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING te.*
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.firm_id)
        .bind(request.matter_id)
        .bind(actor.user_id)
        .bind(request.entry_date)
        .bind(request.duration_minutes)
        .bind(request.hourly_rate)
        .bind(amount)
        .bind(request.description.trim())
        .bind(request.billable.unwrap_or(true))
        .fetch_one(&self.pool)
        .await?;

        info!(time_entry_id = %entry.id, amount = %entry.amount, "Time entry created");
        self.audit.record(AuditRecord::new(actor, AuditAction::Create, ENTITY, entry.id));

        Ok(entry)
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> LedgerResult<TimeEntry> {
        let sql = format!(
            "SELECT {} FROM time_entries te WHERE te.id = $1 AND te.firm_id = $2",
            TIME_ENTRY_COLUMNS
        );
        sqlx::query_as::<_, TimeEntry>(&sql)
            .bind(id)
            .bind(actor.firm_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LedgerError::not_found(ENTITY, id))
    }

    /// Newest first. `approved = Some(false)` lists entries pending approval.
    pub async fn list(&self, actor: &Actor, filter: &TimeEntryFilter) -> LedgerResult<Vec<TimeEntry>> {
        let (limit, offset) = page_window(filter.page, filter.limit, 50);

        let mut query = QueryBuilder::<Postgres>::new("SELECT ");
        query.push(TIME_ENTRY_COLUMNS);
        query.push(" FROM time_entries te WHERE te.firm_id = ");
        query.push_bind(actor.firm_id);

        if let Some(matter_id) = filter.matter_id {
            query.push(" AND te.matter_id = ").push_bind(matter_id);
        }
        if let Some(user_id) = filter.user_id {
            query.push(" AND te.user_id = ").push_bind(user_id);
        }
        if let Some(start) = filter.start_date {
            query.push(" AND te.entry_date >= ").push_bind(start);
        }
        if let Some(end) = filter.end_date {
            query.push(" AND te.entry_date <= ").push_bind(end);
        }
        if let Some(billable) = filter.billable {
            query.push(" AND te.billable = ").push_bind(billable);
        }
        if let Some(billed) = filter.billed {
            query.push(" AND te.billed = ").push_bind(billed);
        }
        match filter.approved {
            Some(true) => {
                query.push(" AND te.approved_by IS NOT NULL");
            }
            Some(false) => {
                query.push(" AND te.approved_by IS NULL");
            }
            None => {}
        }

        query.push(" ORDER BY te.entry_date DESC, te.created_at DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let entries = query
            .build_query_as::<TimeEntry>()
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// Edits an unapproved entry. The amount is always recomputed.
    #[instrument(skip(self, request), fields(firm_id = %actor.firm_id))]
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateTimeEntry,
    ) -> LedgerResult<TimeEntry> {
        let mut tx = self.pool.begin().await?;

        let current = lock_time_entry(&mut tx, actor.firm_id, id).await?;
        current.state().ensure_mutable()?;

        let duration_minutes = request.duration_minutes.unwrap_or(current.duration_minutes);
        let hourly_rate = request.hourly_rate.unwrap_or(current.hourly_rate);
        let description = request
            .description
            .as_deref()
            .unwrap_or(&current.description)
            .trim()
            .to_string();
        validate_work(duration_minutes, hourly_rate, &description)?;

        let updated = sqlx::query_as::<_, TimeEntry>(
            r#"
            UPDATE time_entries AS te
            SET matter_id = $3,
                entry_date = $4,
                duration_minutes = $5,
                hourly_rate = $6,
                amount = $7,
                description = $8,
                billable = $9,
                updated_at = NOW()
            WHERE te.id = $1 AND te.firm_id = $2
            RETURNING te.*
            "#,
        )
        .bind(id)
        .bind(actor.firm_id)
        .bind(request.matter_id.or(current.matter_id))
        .bind(request.entry_date.unwrap_or(current.entry_date))
        .bind(duration_minutes)
        .bind(hourly_rate)
        .bind(time_entry_amount(duration_minutes, hourly_rate))
        .bind(&description)
        .bind(request.billable.unwrap_or(current.billable))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.audit.record(
            AuditRecord::new(actor, AuditAction::Update, ENTITY, id).with_changes(json!({
                "before": { "duration_minutes": current.duration_minutes, "amount": current.amount },
                "after": { "duration_minutes": updated.duration_minutes, "amount": updated.amount },
            })),
        );

        Ok(updated)
    }

    #[instrument(skip(self), fields(firm_id = %actor.firm_id))]
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await?;

        let current = lock_time_entry(&mut tx, actor.firm_id, id).await?;
        current.state().ensure_mutable()?;

        sqlx::query("DELETE FROM time_entries WHERE id = $1 AND firm_id = $2")
            .bind(id)
            .bind(actor.firm_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(time_entry_id = %id, "Time entry deleted");
        self.audit.record(AuditRecord::new(actor, AuditAction::Delete, ENTITY, id));
        Ok(())
    }

    #[instrument(skip(self), fields(firm_id = %actor.firm_id))]
    pub async fn approve(&self, actor: &Actor, id: Uuid) -> LedgerResult<TimeEntry> {
        let mut tx = self.pool.begin().await?;

        let current = lock_time_entry(&mut tx, actor.firm_id, id).await?;
        current.state().approve()?;

        let approved = sqlx::query_as::<_, TimeEntry>(
            r#"
            UPDATE time_entries AS te
            SET approved_by = $3, approved_at = $4, updated_at = NOW()
            WHERE te.id = $1 AND te.firm_id = $2
            RETURNING te.*
            "#,
        )
        .bind(id)
        .bind(actor.firm_id)
        .bind(actor.user_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.audit.record(AuditRecord::new(actor, AuditAction::Approve, ENTITY, id));
        Ok(approved)
    }

    /// Withdraws approval from an unbilled entry.
    ///
    /// An approved entry may already sit in a pack that has not been approved
    /// yet. It is taken out of such packs and their totals are recomputed, so
    /// a pack never holds an unapproved entry.
    #[instrument(skip(self), fields(firm_id = %actor.firm_id))]
    pub async fn unapprove(&self, actor: &Actor, id: Uuid) -> LedgerResult<TimeEntry> {
        let mut tx = self.pool.begin().await?;

        // Packs are locked before entries everywhere else, so take them first.
        sqlx::query(
            r#"
            SELECT bp.id
            FROM billing_packs bp
            JOIN billing_pack_entries bpe ON bpe.billing_pack_id = bp.id
            WHERE bpe.time_entry_id = $1 AND bp.firm_id = $2
            ORDER BY bp.id
            FOR UPDATE OF bp
            "#,
        )
        .bind(id)
        .bind(actor.firm_id)
        .execute(&mut *tx)
        .await?;

        let current = lock_time_entry(&mut tx, actor.firm_id, id).await?;
        current.state().unapprove()?;

        // A pack may have picked the entry up between the two locks. With the
        // entry locked no further pack can, so detach from every open pack.

        let detached: Vec<Uuid> = sqlx::query_scalar(
            r#"
            DELETE FROM billing_pack_entries bpe
            USING billing_packs bp
            WHERE bpe.billing_pack_id = bp.id
              AND bpe.time_entry_id = $1
              AND bp.firm_id = $2
              AND bp.status <> 'approved'
            RETURNING bpe.billing_pack_id
            "#,
        )
        .bind(id)
        .bind(actor.firm_id)
        .fetch_all(&mut *tx)
        .await?;

        for pack_id in &detached {
            recalculate_pack_totals(&mut tx, *pack_id).await?;
        }

        let entry = sqlx::query_as::<_, TimeEntry>(
            r#"
            UPDATE time_entries AS te
            SET approved_by = NULL, approved_at = NULL, updated_at = NOW()
            WHERE te.id = $1 AND te.firm_id = $2
            RETURNING te.*
            "#,
        )
        .bind(id)
        .bind(actor.firm_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if !detached.is_empty() {
            info!(time_entry_id = %id, packs = detached.len(), "Unapproved entry removed from billing packs");
        }
        let mut record = AuditRecord::new(actor, AuditAction::Unapprove, ENTITY, id);
        if !detached.is_empty() {
            record = record.with_changes(json!({ "removed_from_packs": detached }));
        }
        self.audit.record(record);

        Ok(entry)
    }

    /// Approves every listed entry that is still unapproved and unbilled.
    /// Ids that are unknown, foreign or ineligible are skipped.
    #[instrument(skip(self, ids), fields(firm_id = %actor.firm_id, requested = ids.len()))]
    pub async fn bulk_approve(&self, actor: &Actor, ids: &[Uuid]) -> LedgerResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE time_entries
            SET approved_by = $1, approved_at = NOW(), updated_at = NOW()
            WHERE id = ANY($2) AND firm_id = $3 AND approved_by IS NULL AND billed = FALSE
            "#,
        )
        .bind(actor.user_id)
        .bind(ids)
        .bind(actor.firm_id)
        .execute(&self.pool)
        .await?;

        let approved = result.rows_affected();
        info!(approved, "Bulk approval completed");

        self.audit.record(AuditRecord {
            firm_id: actor.firm_id,
            user_id: Some(actor.user_id),
            action: AuditAction::BulkApprove,
            entity_type: ENTITY,
            entity_id: None,
            changes: Some(json!({ "ids": ids, "count": approved })),
        });

        Ok(approved)
    }

    pub async fn stats(
        &self,
        actor: &Actor,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<TimeEntryStats> {
        let stats = sqlx::query_as::<_, TimeEntryStats>(
            r#"
            SELECT
                COUNT(*) AS total_entries,
                COUNT(*) FILTER (WHERE approved_by IS NOT NULL) AS approved_entries,
                COUNT(*) FILTER (WHERE billed) AS billed_entries,
                COUNT(*) FILTER (WHERE billable AND NOT billed AND approved_by IS NOT NULL)
                    AS unbilled_entries,
                COALESCE(SUM(duration_minutes), 0)::BIGINT AS total_minutes,
                COALESCE(SUM(duration_minutes)
                    FILTER (WHERE billable AND NOT billed AND approved_by IS NOT NULL), 0)::BIGINT
                    AS unbilled_minutes,
                COALESCE(SUM(amount), 0) AS total_amount,
                COALESCE(SUM(amount) FILTER (WHERE billed), 0) AS billed_amount,
                COALESCE(SUM(amount)
                    FILTER (WHERE billable AND NOT billed AND approved_by IS NOT NULL), 0)
                    AS unbilled_amount
            FROM time_entries
            WHERE firm_id = $1
              AND ($2::DATE IS NULL OR entry_date >= $2)
              AND ($3::DATE IS NULL OR entry_date <= $3)
            "#,
        )
        .bind(actor.firm_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}

/// Reads one entry under a row lock, scoped to the firm.
pub(crate) async fn lock_time_entry(
    tx: &mut Transaction<'_, Postgres>,
    firm_id: Uuid,
    id: Uuid,
) -> LedgerResult<TimeEntry> {
    let sql = format!(
        "SELECT {} FROM time_entries te WHERE te.id = $1 AND te.firm_id = $2 FOR UPDATE",
        TIME_ENTRY_COLUMNS
    );
    sqlx::query_as::<_, TimeEntry>(&sql)
        .bind(id)
        .bind(firm_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| LedgerError::not_found(ENTITY, id))
}

fn validate_work(duration_minutes: i32, hourly_rate: Decimal, description: &str) -> LedgerResult<()> {
    if duration_minutes <= 0 {
        return Err(LedgerError::validation("duration_minutes must be positive"));
    }
    if hourly_rate < Decimal::ZERO {
        return Err(LedgerError::validation("hourly_rate cannot be negative"));
    }
    if !fits_scale(hourly_rate, MONEY_SCALE) {
        return Err(LedgerError::validation("hourly_rate cannot have more than two decimal places"));
    }
    if description.trim().is_empty() {
        return Err(LedgerError::validation("description is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_work_accepts_zero_rate() {
        assert!(validate_work(30, Decimal::ZERO, "Research").is_ok());
    }

    #[test]
    fn test_validate_work_rejects_bad_input() {
        assert!(matches!(
            validate_work(0, dec!(1500), "Drafting"),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            validate_work(60, dec!(-1), "Drafting"),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            validate_work(60, dec!(1500), "   "),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_work_rejects_sub_cent_rate() {
        assert!(matches!(
            validate_work(600, dec!(0.336), "Research"),
            Err(LedgerError::Validation(_))
        ));
        assert!(validate_work(600, dec!(0.340), "Research").is_ok());
    }
}
