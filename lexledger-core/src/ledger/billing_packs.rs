use chrono::{Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditRecord, AuditSink};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::invoices::InvoiceService;
use crate::ledger::page_window;
use crate::ledger::state_machine::{
    approve_pack_transition, ensure_pack_deletable, ensure_pack_editable, send_pack_transition,
};
use crate::ledger::time_entries::TIME_ENTRY_COLUMNS;
use crate::ledger::totals::PackTotals;
use crate::models::billing_pack::{
    BillingPackFilter, BillingPackStats, CreateBillingPack, PackApproval,
};
use crate::models::{Actor, BillingPack, BillingPackStatus, TimeEntry};

const ENTITY: &str = "billing_pack";

/// Client whose preferred billing day may fall on a given date.
#[derive(Debug, FromRow)]
struct ScheduledClient {
    id: Uuid,
    firm_id: Uuid,
    name: String,
    preferred_billing_date: i32,
}

/// Groups approved, unbilled time into billing packs and bills it on
/// approval.
///
/// An entry is eligible for a pack when its matter belongs to the pack's
/// client, its date is inside the period, it is billable, approved and not
/// billed, and no pack references it yet. A unique index on
/// `billing_pack_entries.time_entry_id` backs the last condition.
#[derive(Clone)]
pub struct BillingPackGenerator {
    pool: PgPool,
    audit: Arc<dyn AuditSink>,
    invoices: InvoiceService,
}

impl BillingPackGenerator {
    pub fn new(pool: PgPool, audit: Arc<dyn AuditSink>, invoices: InvoiceService) -> Self {
        Self {
            pool,
            audit,
            invoices,
        }
    }

    /// Creates an empty draft pack for entries to be added by hand.
    #[instrument(skip(self, request), fields(firm_id = %actor.firm_id, client_id = %request.client_id))]
    pub async fn create(&self, actor: &Actor, request: CreateBillingPack) -> LedgerResult<BillingPack> {
        validate_period(request.period_start, request.period_end)?;

        let pack = sqlx::query_as::<_, BillingPack>(
            r#"
            INSERT INTO billing_packs (id, firm_id, client_id, period_start, period_end, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.firm_id)
        .bind(request.client_id)
        .bind(request.period_start)
        .bind(request.period_end)
        .bind(BillingPackStatus::Draft.to_string())
        .bind(&request.notes)
        .fetch_one(&self.pool)
        .await?;

        self.audit.record(AuditRecord::new(actor, AuditAction::Create, ENTITY, pack.id));
        Ok(pack)
    }

    /// Creates a pack holding every eligible entry for the client and period.
    ///
    /// Runs as one transaction: the pack row, the locked entry selection,
    /// the join rows and the totals either all commit or none do. Entries
    /// already billed or already in another pack are left out, so generating
    /// twice for the same period yields an empty second pack.
    #[instrument(skip(self, request), fields(firm_id = %actor.firm_id, client_id = %request.client_id))]
    pub async fn generate(&self, actor: &Actor, request: CreateBillingPack) -> LedgerResult<BillingPack> {
        validate_period(request.period_start, request.period_end)?;

        let mut tx = self.pool.begin().await?;

        let pack_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO billing_packs (
                id, firm_id, client_id, period_start, period_end, status, notes,
                generated_by, generated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(pack_id)
        .bind(actor.firm_id)
        .bind(request.client_id)
        .bind(request.period_start)
        .bind(request.period_end)
        .bind(BillingPackStatus::Generated.to_string())
        .bind(&request.notes)
        .bind(actor.user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let entries = select_eligible_entries(
            &mut tx,
            actor.firm_id,
            request.client_id,
            request.period_start,
            request.period_end,
            None,
        )
        .await?;
        let ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
        let attached = attach_entries(&mut tx, pack_id, &ids).await?;
        let pack = recalculate_pack_totals(&mut tx, pack_id).await?;

        tx.commit().await?;

        info!(
            billing_pack_id = %pack.id,
            entries = attached,
            total_amount = %pack.total_amount,
            "Billing pack generated"
        );
        self.audit.record(
            AuditRecord::new(actor, AuditAction::Generate, ENTITY, pack.id).with_changes(json!({
                "client_id": pack.client_id,
                "period_start": pack.period_start,
                "period_end": pack.period_end,
                "time_entries_count": pack.total_time_entries,
                "total_amount": pack.total_amount,
            })),
        );

        Ok(pack)
    }

    /// Adds hand-picked entries to a draft or generated pack. Every id must
    /// be eligible for the pack's client and period.
    #[instrument(skip(self, entry_ids), fields(firm_id = %actor.firm_id, requested = entry_ids.len()))]
    pub async fn add_entries(
        &self,
        actor: &Actor,
        pack_id: Uuid,
        entry_ids: &[Uuid],
    ) -> LedgerResult<BillingPack> {
        let mut tx = self.pool.begin().await?;

        let pack = lock_pack(&mut tx, actor.firm_id, pack_id).await?;
        ensure_pack_editable(pack.status)?;
        if entry_ids.is_empty() {
            return Ok(pack);
        }

        let eligible = select_eligible_entries(
            &mut tx,
            actor.firm_id,
            pack.client_id,
            pack.period_start,
            pack.period_end,
            Some(entry_ids),
        )
        .await?;
        let rejected = ineligible_ids(entry_ids, &eligible);
        if !rejected.is_empty() {
            return Err(LedgerError::validation(format!(
                "time entries not eligible for this billing pack: {}",
                join_ids(&rejected)
            )));
        }

        let ids: Vec<Uuid> = eligible.iter().map(|e| e.id).collect();
        attach_entries(&mut tx, pack_id, &ids).await?;
        let updated = recalculate_pack_totals(&mut tx, pack_id).await?;

        tx.commit().await?;

        self.audit.record(
            AuditRecord::new(actor, AuditAction::Update, ENTITY, pack_id)
                .with_changes(json!({ "added_entries": ids })),
        );

        Ok(updated)
    }

    #[instrument(skip(self, entry_ids), fields(firm_id = %actor.firm_id, requested = entry_ids.len()))]
    pub async fn remove_entries(
        &self,
        actor: &Actor,
        pack_id: Uuid,
        entry_ids: &[Uuid],
    ) -> LedgerResult<BillingPack> {
        let mut tx = self.pool.begin().await?;

        let pack = lock_pack(&mut tx, actor.firm_id, pack_id).await?;
        ensure_pack_editable(pack.status)?;

        let removed = sqlx::query(
            "DELETE FROM billing_pack_entries WHERE billing_pack_id = $1 AND time_entry_id = ANY($2)",
        )
        .bind(pack_id)
        .bind(entry_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        let updated = recalculate_pack_totals(&mut tx, pack_id).await?;

        tx.commit().await?;

        if removed > 0 {
            self.audit.record(
                AuditRecord::new(actor, AuditAction::Update, ENTITY, pack_id)
                    .with_changes(json!({ "removed_entries": entry_ids, "removed": removed })),
            );
        }

        Ok(updated)
    }

    /// Draft or generated to sent. A sent pack is returned unchanged.
    #[instrument(skip(self), fields(firm_id = %actor.firm_id))]
    pub async fn send(&self, actor: &Actor, pack_id: Uuid) -> LedgerResult<BillingPack> {
        let mut tx = self.pool.begin().await?;

        let pack = lock_pack(&mut tx, actor.firm_id, pack_id).await?;
        let next = match send_pack_transition(pack.status)? {
            Some(next) => next,
            None => return Ok(pack),
        };

        let sent = sqlx::query_as::<_, BillingPack>(
            r#"
            UPDATE billing_packs
            SET status = $2, sent_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(pack_id)
        .bind(next.to_string())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.audit.record(AuditRecord::new(actor, AuditAction::Send, ENTITY, pack_id));
        Ok(sent)
    }

    /// Approves a pack and bills every entry in it.
    ///
    /// Each entry must still be approved and unbilled; one that is not fails
    /// the whole approval. With `create_invoice` a draft invoice is seeded
    /// from the entries in the same transaction. Approving an approved pack
    /// changes nothing.
    #[instrument(skip(self), fields(firm_id = %actor.firm_id))]
    pub async fn approve(
        &self,
        actor: &Actor,
        pack_id: Uuid,
        create_invoice: bool,
    ) -> LedgerResult<PackApproval> {
        let mut tx = self.pool.begin().await?;

        let pack = lock_pack(&mut tx, actor.firm_id, pack_id).await?;
        let next = match approve_pack_transition(pack.status) {
            Some(next) => next,
            None => {
                return Ok(PackApproval {
                    pack,
                    billed_entries: 0,
                    invoice_id: None,
                })
            }
        };

        let entries = lock_pack_entries(&mut tx, pack_id).await?;
        for entry in &entries {
            entry.state().bill(entry.id)?;
        }

        let ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
        let billed = sqlx::query(
            "UPDATE time_entries SET billed = TRUE, updated_at = NOW() WHERE id = ANY($1)",
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            UPDATE billing_packs
            SET status = $2, approved_by = $3, approved_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(pack_id)
        .bind(next.to_string())
        .bind(actor.user_id)
        .execute(&mut *tx)
        .await?;
        let approved = recalculate_pack_totals(&mut tx, pack_id).await?;

        let invoice = if create_invoice && !entries.is_empty() {
            Some(
                self.invoices
                    .create_from_billing_pack(&mut tx, actor, &approved, &entries)
                    .await?,
            )
        } else {
            None
        };

        tx.commit().await?;

        info!(
            billing_pack_id = %pack_id,
            billed_entries = billed,
            invoice_id = ?invoice.as_ref().map(|i| i.id),
            "Billing pack approved"
        );
        self.audit.record(
            AuditRecord::new(actor, AuditAction::Approve, ENTITY, pack_id).with_changes(json!({
                "create_invoice": create_invoice,
                "billed_entries": billed,
            })),
        );
        if let Some(invoice) = &invoice {
            self.audit.record(
                AuditRecord::new(actor, AuditAction::Create, "invoice", invoice.id).with_changes(
                    json!({
                        "invoice_number": invoice.invoice_number,
                        "billing_pack_id": pack_id,
                    }),
                ),
            );
        }

        Ok(PackApproval {
            pack: approved,
            billed_entries: billed,
            invoice_id: invoice.map(|i| i.id),
        })
    }

    /// Deletes a draft or generated pack; its entries become eligible again.
    #[instrument(skip(self), fields(firm_id = %actor.firm_id))]
    pub async fn delete(&self, actor: &Actor, pack_id: Uuid) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await?;

        let pack = lock_pack(&mut tx, actor.firm_id, pack_id).await?;
        ensure_pack_deletable(pack.status)?;

        sqlx::query("DELETE FROM billing_packs WHERE id = $1")
            .bind(pack_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.audit.record(
            AuditRecord::new(actor, AuditAction::Delete, ENTITY, pack_id)
                .with_changes(json!({ "time_entries_count": pack.total_time_entries })),
        );
        Ok(())
    }

    pub async fn update_notes(
        &self,
        actor: &Actor,
        pack_id: Uuid,
        notes: Option<String>,
    ) -> LedgerResult<BillingPack> {
        let pack = sqlx::query_as::<_, BillingPack>(
            r#"
            UPDATE billing_packs
            SET notes = $3, updated_at = NOW()
            WHERE id = $1 AND firm_id = $2
            RETURNING *
            "#,
        )
        .bind(pack_id)
        .bind(actor.firm_id)
        .bind(&notes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::not_found(ENTITY, pack_id))?;

        self.audit.record(AuditRecord::new(actor, AuditAction::Update, ENTITY, pack_id));
        Ok(pack)
    }

    pub async fn get(&self, actor: &Actor, pack_id: Uuid) -> LedgerResult<BillingPack> {
        sqlx::query_as::<_, BillingPack>("SELECT * FROM billing_packs WHERE id = $1 AND firm_id = $2")
            .bind(pack_id)
            .bind(actor.firm_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LedgerError::not_found(ENTITY, pack_id))
    }

    pub async fn list(&self, actor: &Actor, filter: &BillingPackFilter) -> LedgerResult<Vec<BillingPack>> {
        let (limit, offset) = page_window(filter.page, filter.limit, 20);

        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM billing_packs WHERE firm_id = ");
        query.push_bind(actor.firm_id);

        if let Some(client_id) = filter.client_id {
            query.push(" AND client_id = ").push_bind(client_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(start) = filter.start_date {
            query.push(" AND period_start >= ").push_bind(start);
        }
        if let Some(end) = filter.end_date {
            query.push(" AND period_end <= ").push_bind(end);
        }

        query.push(" ORDER BY period_end DESC, created_at DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let packs = query
            .build_query_as::<BillingPack>()
            .fetch_all(&self.pool)
            .await?;
        Ok(packs)
    }

    /// Entries referenced by a pack, oldest first.
    pub async fn list_entries(&self, actor: &Actor, pack_id: Uuid) -> LedgerResult<Vec<TimeEntry>> {
        self.get(actor, pack_id).await?;

        let sql = format!(
            r#"
            SELECT {}
            FROM time_entries te
            JOIN billing_pack_entries bpe ON bpe.time_entry_id = te.id
            WHERE bpe.billing_pack_id = $1
            ORDER BY te.entry_date, te.created_at
            "#,
            TIME_ENTRY_COLUMNS
        );
        let entries = sqlx::query_as::<_, TimeEntry>(&sql)
            .bind(pack_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// A pack already covering exactly this client and period, if any.
    pub async fn find_existing(
        &self,
        actor: &Actor,
        client_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> LedgerResult<Option<BillingPack>> {
        let pack = sqlx::query_as::<_, BillingPack>(
            r#"
            SELECT * FROM billing_packs
            WHERE firm_id = $1 AND client_id = $2 AND period_start = $3 AND period_end = $4
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(actor.firm_id)
        .bind(client_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pack)
    }

    pub async fn stats(&self, actor: &Actor) -> LedgerResult<BillingPackStats> {
        let stats = sqlx::query_as::<_, BillingPackStats>(
            r#"
            SELECT
                COUNT(*) AS total_packs,
                COUNT(*) FILTER (WHERE status = 'draft') AS draft_packs,
                COUNT(*) FILTER (WHERE status = 'generated') AS generated_packs,
                COUNT(*) FILTER (WHERE status = 'sent') AS sent_packs,
                COUNT(*) FILTER (WHERE status = 'approved') AS approved_packs,
                COALESCE(SUM(total_amount), 0) AS total_amount,
                COALESCE(SUM(total_amount) FILTER (WHERE status = 'approved'), 0) AS approved_amount,
                COALESCE(SUM(total_hours), 0) AS total_hours
            FROM billing_packs
            WHERE firm_id = $1
            "#,
        )
        .bind(actor.firm_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    /// Generates last month's pack for every active client whose preferred
    /// billing day is `today`, across all firms.
    ///
    /// Clients that already have a pack for the period are skipped. A failure
    /// for one client is logged and the run continues with the next.
    ///
    /// # Returns
    ///
    /// The number of packs generated.
    #[instrument(skip(self))]
    pub async fn auto_generate(&self, today: NaiveDate, system_user_id: Uuid) -> LedgerResult<usize> {
        let clients = sqlx::query_as::<_, ScheduledClient>(
            r#"
            SELECT id, firm_id, name, preferred_billing_date
            FROM clients
            WHERE is_active = TRUE
              AND preferred_billing_date IS NOT NULL
              AND preferred_billing_date >= $1
            "#,
        )
        .bind(today.day() as i32)
        .fetch_all(&self.pool)
        .await?;

        let (period_start, period_end) = previous_month(today);
        let mut generated = 0;

        for client in clients
            .iter()
            .filter(|c| billing_day_is_today(c.preferred_billing_date, today))
        {
            let actor = Actor::new(client.firm_id, system_user_id);

            match self
                .find_existing(&actor, client.id, period_start, period_end)
                .await
            {
                Ok(Some(existing)) => {
                    info!(
                        client = %client.name,
                        billing_pack_id = %existing.id,
                        "Billing pack already exists for period"
                    );
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(client = %client.name, "Failed to check existing billing packs: {}", e);
                    continue;
                }
            }

            let request = CreateBillingPack {
                client_id: client.id,
                period_start,
                period_end,
                notes: Some(format!("Auto-generated on {}", today)),
            };
            match self.generate(&actor, request).await {
                Ok(pack) => {
                    generated += 1;
                    if pack.total_time_entries == 0 {
                        warn!(client = %client.name, "Auto-generated billing pack is empty");
                    }
                }
                Err(e) => {
                    error!(client = %client.name, "Failed to auto-generate billing pack: {}", e);
                }
            }
        }

        Ok(generated)
    }
}

/// Reads one pack under a row lock, scoped to the firm.
pub(crate) async fn lock_pack(
    tx: &mut Transaction<'_, Postgres>,
    firm_id: Uuid,
    pack_id: Uuid,
) -> LedgerResult<BillingPack> {
    sqlx::query_as::<_, BillingPack>(
        "SELECT * FROM billing_packs WHERE id = $1 AND firm_id = $2 FOR UPDATE",
    )
    .bind(pack_id)
    .bind(firm_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| LedgerError::not_found(ENTITY, pack_id))
}

/// Re-derives a pack's entry count, hours and amount from its join rows.
pub(crate) async fn recalculate_pack_totals(
    tx: &mut Transaction<'_, Postgres>,
    pack_id: Uuid,
) -> LedgerResult<BillingPack> {
    let rows: Vec<(i32, Decimal)> = sqlx::query_as(
        r#"
        SELECT te.duration_minutes, te.amount
        FROM time_entries te
        JOIN billing_pack_entries bpe ON bpe.time_entry_id = te.id
        WHERE bpe.billing_pack_id = $1
        "#,
    )
    .bind(pack_id)
    .fetch_all(&mut **tx)
    .await?;

    let totals = PackTotals::from_entries(rows);
    let pack = sqlx::query_as::<_, BillingPack>(
        r#"
        UPDATE billing_packs
        SET total_time_entries = $2, total_hours = $3, total_amount = $4, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(pack_id)
    .bind(totals.total_time_entries)
    .bind(totals.total_hours)
    .bind(totals.total_amount)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| LedgerError::not_found(ENTITY, pack_id))?;

    Ok(pack)
}

/// Eligible entries for a client and period, row-locked.
///
/// With `only`, the selection is narrowed to those ids.
async fn select_eligible_entries(
    tx: &mut Transaction<'_, Postgres>,
    firm_id: Uuid,
    client_id: Uuid,
    period_start: NaiveDate,
    period_end: NaiveDate,
    only: Option<&[Uuid]>,
) -> LedgerResult<Vec<TimeEntry>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM time_entries te
        JOIN matters m ON m.id = te.matter_id
        WHERE te.firm_id = $1
          AND m.client_id = $2
          AND te.entry_date BETWEEN $3 AND $4
          AND te.billable = TRUE
          AND te.billed = FALSE
          AND te.approved_by IS NOT NULL
          AND NOT EXISTS (
              SELECT 1 FROM billing_pack_entries bpe WHERE bpe.time_entry_id = te.id
          )
          AND ($5::UUID[] IS NULL OR te.id = ANY($5))
        ORDER BY te.entry_date, te.id
        FOR UPDATE OF te
        "#,
        TIME_ENTRY_COLUMNS
    );

    let entries = sqlx::query_as::<_, TimeEntry>(&sql)
        .bind(firm_id)
        .bind(client_id)
        .bind(period_start)
        .bind(period_end)
        .bind(only.map(|ids| ids.to_vec()))
        .fetch_all(&mut **tx)
        .await?;
    Ok(entries)
}

/// Entries of a pack, row-locked in id order.
async fn lock_pack_entries(
    tx: &mut Transaction<'_, Postgres>,
    pack_id: Uuid,
) -> LedgerResult<Vec<TimeEntry>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM time_entries te
        JOIN billing_pack_entries bpe ON bpe.time_entry_id = te.id
        WHERE bpe.billing_pack_id = $1
        ORDER BY te.entry_date, te.id
        FOR UPDATE OF te
        "#,
        TIME_ENTRY_COLUMNS
    );
    let entries = sqlx::query_as::<_, TimeEntry>(&sql)
        .bind(pack_id)
        .fetch_all(&mut **tx)
        .await?;
    Ok(entries)
}

/// Inserts join rows. An entry already claimed by another pack is skipped,
/// which covers two generations racing for the same entries.
async fn attach_entries(
    tx: &mut Transaction<'_, Postgres>,
    pack_id: Uuid,
    entry_ids: &[Uuid],
) -> LedgerResult<u64> {
    if entry_ids.is_empty() {
        return Ok(0);
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO billing_pack_entries (billing_pack_id, time_entry_id)
        SELECT $1, UNNEST($2::UUID[])
        ON CONFLICT (time_entry_id) DO NOTHING
        "#,
    )
    .bind(pack_id)
    .bind(entry_ids)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    Ok(inserted)
}

fn validate_period(period_start: NaiveDate, period_end: NaiveDate) -> LedgerResult<()> {
    if period_start > period_end {
        return Err(LedgerError::validation("period_start must not be after period_end"));
    }
    Ok(())
}

fn ineligible_ids(requested: &[Uuid], eligible: &[TimeEntry]) -> Vec<Uuid> {
    requested
        .iter()
        .filter(|id| !eligible.iter().any(|e| e.id == **id))
        .copied()
        .collect()
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ")
}

/// First and last day of the calendar month before `today`.
pub fn previous_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first_of_this_month = today - Duration::days(i64::from(today.day0()));
    let period_end = first_of_this_month - Duration::days(1);
    let period_start = period_end - Duration::days(i64::from(period_end.day0()));
    (period_start, period_end)
}

/// Whether a client billed on day `preferred` of the month is due `today`.
///
/// Preferred days past the end of a short month fall on its last day.
pub fn billing_day_is_today(preferred: i32, today: NaiveDate) -> bool {
    let day = today.day() as i32;
    if preferred == day {
        return true;
    }
    let is_last_day = (today + Duration::days(1)).month() != today.month();
    is_last_day && preferred > day
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_previous_month_mid_year() {
        assert_eq!(
            previous_month(date(2026, 4, 5)),
            (date(2026, 3, 1), date(2026, 3, 31))
        );
    }

    #[test]
    fn test_previous_month_wraps_year() {
        assert_eq!(
            previous_month(date(2026, 1, 1)),
            (date(2025, 12, 1), date(2025, 12, 31))
        );
    }

    #[test]
    fn test_previous_month_leap_february() {
        assert_eq!(
            previous_month(date(2028, 3, 15)),
            (date(2028, 2, 1), date(2028, 2, 29))
        );
    }

    #[test]
    fn test_billing_day_matches_day_of_month() {
        assert!(billing_day_is_today(5, date(2026, 4, 5)));
        assert!(!billing_day_is_today(6, date(2026, 4, 5)));
        assert!(!billing_day_is_today(4, date(2026, 4, 5)));
    }

    #[test]
    fn test_billing_day_past_month_end_falls_on_last_day() {
        assert!(billing_day_is_today(31, date(2026, 4, 30)));
        assert!(billing_day_is_today(30, date(2026, 2, 28)));
        assert!(!billing_day_is_today(31, date(2026, 4, 29)));
        assert!(!billing_day_is_today(30, date(2026, 3, 31)));
    }

    #[test]
    fn test_period_validation() {
        assert!(validate_period(date(2026, 3, 1), date(2026, 3, 1)).is_ok());
        assert!(validate_period(date(2026, 3, 2), date(2026, 3, 1)).is_err());
    }

    #[test]
    fn test_ineligible_ids_lists_missing_entries() {
        let requested = [Uuid::new_v4(), Uuid::new_v4()];
        assert_eq!(ineligible_ids(&requested, &[]), requested.to_vec());
        assert_eq!(join_ids(&[Uuid::nil()]), Uuid::nil().to_string());
    }
}
