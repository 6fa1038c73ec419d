use chrono::{Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditRecord, AuditSink};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::invoice_number::next_invoice_number;
use crate::ledger::state_machine::{
    ensure_invoice_editable, send_invoice_transition, view_invoice_transition,
};
use crate::ledger::totals::{
    fits_scale, line_amount, minutes_to_hours, InvoiceTotals, MONEY_SCALE, RATE_SCALE,
};
use crate::ledger::{page_window, LedgerSettings};
use crate::models::invoice::{
    CreateInvoice, CreateLineItem, InvoiceFilter, InvoiceResponse, InvoiceStats, UpdateInvoice,
    UpdateLineItem,
};
use crate::models::{Actor, BillingPack, Invoice, InvoiceStatus, LineItem, TimeEntry};

const ENTITY: &str = "invoice";
const LINE_ITEM: &str = "invoice_line_item";

/// Invoice aggregate: the header row plus its line items.
///
/// Header totals are never taken from callers. Every line-item write is
/// followed by [`recalculate_invoice_totals`] in the same transaction, with
/// the invoice row locked first.
#[derive(Clone)]
pub struct InvoiceService {
    pool: PgPool,
    audit: Arc<dyn AuditSink>,
    settings: LedgerSettings,
}

/// Header values for a new draft.
struct DraftInvoice<'a> {
    client_id: Uuid,
    matter_id: Option<Uuid>,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    vat_rate: Decimal,
    notes: Option<&'a str>,
    terms: Option<&'a str>,
}

impl InvoiceService {
    pub fn new(pool: PgPool, audit: Arc<dyn AuditSink>, settings: LedgerSettings) -> Self {
        Self {
            pool,
            audit,
            settings,
        }
    }

    /// Creates an empty draft with the next invoice number for the firm.
    ///
    /// # Arguments
    ///
    /// * `actor` - Firm and user creating the invoice
    /// * `request` - Header fields; issue date defaults to today, due date to
    ///   issue date plus the configured payment terms, VAT rate to the
    ///   configured default
    #[instrument(skip(self, request), fields(firm_id = %actor.firm_id))]
    pub async fn create(&self, actor: &Actor, request: CreateInvoice) -> LedgerResult<Invoice> {
        let issue_date = request.issue_date.unwrap_or_else(|| Utc::now().date_naive());
        let draft = DraftInvoice {
            client_id: request.client_id,
            matter_id: request.matter_id,
            issue_date,
            due_date: match request.due_date {
                Some(due_date) => due_date,
                None => default_due_date(issue_date, self.settings.payment_terms_days)?,
            },
            vat_rate: request.vat_rate.unwrap_or(self.settings.default_vat_rate),
            notes: request.notes.as_deref(),
            terms: request.terms.as_deref(),
        };
        validate_header(draft.issue_date, draft.due_date, draft.vat_rate)?;

        let mut tx = self.pool.begin().await?;
        let invoice = insert_draft(&mut tx, actor, &draft).await?;
        tx.commit().await?;

        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            "Invoice created"
        );
        self.audit.record(
            AuditRecord::new(actor, AuditAction::Create, ENTITY, invoice.id)
                .with_changes(json!({ "invoice_number": invoice.invoice_number })),
        );

        Ok(invoice)
    }

    /// Invoice header with its line items in display order.
    pub async fn get(&self, actor: &Actor, id: Uuid) -> LedgerResult<InvoiceResponse> {
        let invoice = self.get_header(actor, id).await?;
        let line_items = fetch_line_items(&self.pool, id).await?;
        Ok(InvoiceResponse {
            invoice,
            line_items,
        })
    }

    pub async fn get_header(&self, actor: &Actor, id: Uuid) -> LedgerResult<Invoice> {
        sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 AND firm_id = $2")
            .bind(id)
            .bind(actor.firm_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LedgerError::not_found(ENTITY, id))
    }

    pub async fn list(&self, actor: &Actor, filter: &InvoiceFilter) -> LedgerResult<Vec<Invoice>> {
        let (limit, offset) = page_window(filter.page, filter.limit, 50);

        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM invoices WHERE firm_id = ");
        query.push_bind(actor.firm_id);

        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(client_id) = filter.client_id {
            query.push(" AND client_id = ").push_bind(client_id);
        }
        if let Some(start) = filter.start_date {
            query.push(" AND issue_date >= ").push_bind(start);
        }
        if let Some(end) = filter.end_date {
            query.push(" AND issue_date <= ").push_bind(end);
        }

        query.push(" ORDER BY issue_date DESC, invoice_number DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let invoices = query
            .build_query_as::<Invoice>()
            .fetch_all(&self.pool)
            .await?;
        Ok(invoices)
    }

    /// Edits header fields of a draft. A VAT rate change recomputes totals.
    #[instrument(skip(self, request), fields(firm_id = %actor.firm_id))]
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateInvoice,
    ) -> LedgerResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let current = lock_invoice(&mut tx, actor.firm_id, id).await?;
        ensure_invoice_editable(current.status)?;

        let issue_date = request.issue_date.unwrap_or(current.issue_date);
        let due_date = request.due_date.unwrap_or(current.due_date);
        let vat_rate = request.vat_rate.unwrap_or(current.vat_rate);
        validate_header(issue_date, due_date, vat_rate)?;

        sqlx::query(
            r#"
            UPDATE invoices
            SET client_id = $2,
                matter_id = $3,
                issue_date = $4,
                due_date = $5,
                vat_rate = $6,
                notes = $7,
                terms = $8,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(request.client_id.unwrap_or(current.client_id))
        .bind(request.matter_id.or(current.matter_id))
        .bind(issue_date)
        .bind(due_date)
        .bind(vat_rate)
        .bind(request.notes.as_ref().or(current.notes.as_ref()))
        .bind(request.terms.as_ref().or(current.terms.as_ref()))
        .execute(&mut *tx)
        .await?;

        let updated = recalculate_invoice_totals(&mut tx, id).await?;
        tx.commit().await?;

        self.audit.record(
            AuditRecord::new(actor, AuditAction::Update, ENTITY, id).with_changes(json!({
                "vat_rate": { "before": current.vat_rate, "after": updated.vat_rate },
                "total": { "before": current.total, "after": updated.total },
            })),
        );

        Ok(updated)
    }

    /// Appends a line item at the next position and recomputes the header.
    #[instrument(skip(self, request), fields(firm_id = %actor.firm_id))]
    pub async fn add_line_item(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        request: CreateLineItem,
    ) -> LedgerResult<LineItem> {
        validate_line(&request.description, request.quantity, request.unit_price)?;

        let mut tx = self.pool.begin().await?;

        let invoice = lock_invoice(&mut tx, actor.firm_id, invoice_id).await?;
        ensure_invoice_editable(invoice.status)?;

        let item = insert_line_item(
            &mut tx,
            invoice_id,
            request.description.trim(),
            request.quantity,
            request.unit_price,
            None,
        )
        .await?;
        let updated = recalculate_invoice_totals(&mut tx, invoice_id).await?;

        tx.commit().await?;

        self.audit.record(
            AuditRecord::new(actor, AuditAction::Create, LINE_ITEM, item.id).with_changes(json!({
                "invoice_id": invoice_id,
                "amount": item.amount,
                "subtotal": updated.subtotal,
            })),
        );

        Ok(item)
    }

    #[instrument(skip(self, request), fields(firm_id = %actor.firm_id))]
    pub async fn update_line_item(
        &self,
        actor: &Actor,
        line_item_id: Uuid,
        request: UpdateLineItem,
    ) -> LedgerResult<LineItem> {
        let mut tx = self.pool.begin().await?;

        let invoice_id = line_item_invoice(&mut tx, actor.firm_id, line_item_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(LINE_ITEM, line_item_id))?;
        let invoice = lock_invoice(&mut tx, actor.firm_id, invoice_id).await?;
        ensure_invoice_editable(invoice.status)?;

        let current = sqlx::query_as::<_, LineItem>(
            "SELECT * FROM invoice_line_items WHERE id = $1 AND invoice_id = $2 FOR UPDATE",
        )
        .bind(line_item_id)
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| LedgerError::not_found(LINE_ITEM, line_item_id))?;

        let description = request
            .description
            .as_deref()
            .unwrap_or(&current.description)
            .trim()
            .to_string();
        let quantity = request.quantity.unwrap_or(current.quantity);
        let unit_price = request.unit_price.unwrap_or(current.unit_price);
        validate_line(&description, quantity, unit_price)?;

        let item = sqlx::query_as::<_, LineItem>(
            r#"
            UPDATE invoice_line_items
            SET description = $2, quantity = $3, unit_price = $4, amount = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(line_item_id)
        .bind(&description)
        .bind(quantity)
        .bind(unit_price)
        .bind(line_amount(quantity, unit_price))
        .fetch_one(&mut *tx)
        .await?;

        recalculate_invoice_totals(&mut tx, invoice_id).await?;
        tx.commit().await?;

        self.audit.record(
            AuditRecord::new(actor, AuditAction::Update, LINE_ITEM, line_item_id).with_changes(
                json!({
                    "amount": { "before": current.amount, "after": item.amount },
                }),
            ),
        );

        Ok(item)
    }

    /// Removes a line item. `Ok(false)` when it does not exist.
    #[instrument(skip(self), fields(firm_id = %actor.firm_id))]
    pub async fn delete_line_item(&self, actor: &Actor, line_item_id: Uuid) -> LedgerResult<bool> {
        let mut tx = self.pool.begin().await?;

        let invoice_id = match line_item_invoice(&mut tx, actor.firm_id, line_item_id).await? {
            Some(invoice_id) => invoice_id,
            None => return Ok(false),
        };
        let invoice = lock_invoice(&mut tx, actor.firm_id, invoice_id).await?;
        ensure_invoice_editable(invoice.status)?;

        let deleted = sqlx::query("DELETE FROM invoice_line_items WHERE id = $1 AND invoice_id = $2")
            .bind(line_item_id)
            .bind(invoice_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Ok(false);
        }

        recalculate_invoice_totals(&mut tx, invoice_id).await?;
        tx.commit().await?;

        self.audit.record(
            AuditRecord::new(actor, AuditAction::Delete, LINE_ITEM, line_item_id)
                .with_changes(json!({ "invoice_id": invoice_id })),
        );

        Ok(true)
    }

    pub async fn list_line_items(&self, actor: &Actor, invoice_id: Uuid) -> LedgerResult<Vec<LineItem>> {
        // Scope check before reading children.
        self.get_header(actor, invoice_id).await?;
        fetch_line_items(&self.pool, invoice_id).await
    }

    /// Draft to sent. Any other status is returned unchanged.
    #[instrument(skip(self), fields(firm_id = %actor.firm_id))]
    pub async fn send(&self, actor: &Actor, id: Uuid) -> LedgerResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let current = lock_invoice(&mut tx, actor.firm_id, id).await?;
        let next = match send_invoice_transition(current.status) {
            Some(next) => next,
            None => return Ok(current),
        };

        let sent = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = $2, sent_date = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(invoice_id = %id, invoice_number = %sent.invoice_number, "Invoice sent");
        self.audit.record(AuditRecord::new(actor, AuditAction::Send, ENTITY, id));

        Ok(sent)
    }

    /// Sent to viewed. Any other status is returned unchanged.
    pub async fn mark_viewed(&self, actor: &Actor, id: Uuid) -> LedgerResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let current = lock_invoice(&mut tx, actor.firm_id, id).await?;
        let next = match view_invoice_transition(current.status) {
            Some(next) => next,
            None => return Ok(current),
        };

        let viewed = sqlx::query_as::<_, Invoice>(
            "UPDATE invoices SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.audit.record(AuditRecord::new(actor, AuditAction::View, ENTITY, id));
        Ok(viewed)
    }

    /// Soft delete: the invoice becomes cancelled whatever its status.
    #[instrument(skip(self), fields(firm_id = %actor.firm_id))]
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> LedgerResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let current = lock_invoice(&mut tx, actor.firm_id, id).await?;
        let cancelled = sqlx::query_as::<_, Invoice>(
            "UPDATE invoices SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(InvoiceStatus::Cancelled.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if current.amount_paid > Decimal::ZERO {
            warn!(
                invoice_id = %id,
                amount_paid = %current.amount_paid,
                "Cancelled an invoice that has payments recorded"
            );
        }
        self.audit.record(
            AuditRecord::new(actor, AuditAction::Delete, ENTITY, id)
                .with_changes(json!({ "previous_status": current.status })),
        );

        Ok(cancelled)
    }

    pub async fn stats(&self, actor: &Actor) -> LedgerResult<InvoiceStats> {
        let stats = sqlx::query_as::<_, InvoiceStats>(
            r#"
            SELECT
                COUNT(*) AS total_invoices,
                COUNT(*) FILTER (WHERE status = 'draft') AS draft_count,
                COUNT(*) FILTER (WHERE status IN ('sent', 'viewed')) AS sent_count,
                COUNT(*) FILTER (WHERE status = 'paid') AS paid_count,
                COUNT(*) FILTER (
                    WHERE status = 'overdue'
                       OR (status IN ('sent', 'viewed') AND due_date < CURRENT_DATE)
                ) AS overdue_count,
                COALESCE(SUM(total) FILTER (WHERE status <> 'cancelled'), 0) AS total_value,
                COALESCE(SUM(amount_paid) FILTER (WHERE status <> 'cancelled'), 0) AS total_paid,
                COALESCE(SUM(balance_due) FILTER (WHERE status <> 'cancelled'), 0)
                    AS total_outstanding
            FROM invoices
            WHERE firm_id = $1
            "#,
        )
        .bind(actor.firm_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    /// Moves every sent or viewed invoice due before `today` to overdue,
    /// across all firms. Used by the background worker.
    #[instrument(skip(self))]
    pub async fn mark_overdue(&self, today: NaiveDate) -> LedgerResult<Vec<Invoice>> {
        let overdue = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = 'overdue', updated_at = NOW()
            WHERE status IN ('sent', 'viewed') AND due_date < $1
            RETURNING *
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        for invoice in &overdue {
            self.audit.record(AuditRecord {
                firm_id: invoice.firm_id,
                user_id: None,
                action: AuditAction::MarkOverdue,
                entity_type: ENTITY,
                entity_id: Some(invoice.id),
                changes: Some(json!({ "due_date": invoice.due_date })),
            });
        }

        Ok(overdue)
    }

    /// Seeds a draft invoice from an approved billing pack inside the
    /// caller's transaction: one line per entry, quantity 1 at the entry
    /// amount, linked back to the entry.
    pub(crate) async fn create_from_billing_pack(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        actor: &Actor,
        pack: &BillingPack,
        entries: &[TimeEntry],
    ) -> LedgerResult<Invoice> {
        let issue_date = Utc::now().date_naive();
        let period = format!("Billing period {} to {}", pack.period_start, pack.period_end);
        let draft = DraftInvoice {
            client_id: pack.client_id,
            matter_id: single_matter(entries),
            issue_date,
            due_date: default_due_date(issue_date, self.settings.payment_terms_days)?,
            vat_rate: self.settings.default_vat_rate,
            notes: Some(pack.notes.as_deref().unwrap_or(&period)),
            terms: None,
        };

        let invoice = insert_draft(tx, actor, &draft).await?;
        for entry in entries {
            insert_line_item(
                tx,
                invoice.id,
                &pack_line_description(entry),
                Decimal::ONE,
                entry.amount,
                Some(entry.id),
            )
            .await?;
        }

        recalculate_invoice_totals(tx, invoice.id).await
    }
}

/// Issue date plus the payment terms.
fn default_due_date(issue_date: NaiveDate, payment_terms_days: i64) -> LedgerResult<NaiveDate> {
    Duration::try_days(payment_terms_days)
        .and_then(|terms| issue_date.checked_add_signed(terms))
        .ok_or_else(|| {
            LedgerError::validation(format!(
                "payment terms of {} days put the due date out of range",
                payment_terms_days
            ))
        })
}

/// Reads one invoice under a row lock, scoped to the firm.
pub(crate) async fn lock_invoice(
    tx: &mut Transaction<'_, Postgres>,
    firm_id: Uuid,
    id: Uuid,
) -> LedgerResult<Invoice> {
    sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 AND firm_id = $2 FOR UPDATE")
        .bind(id)
        .bind(firm_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| LedgerError::not_found(ENTITY, id))
}

/// Re-derives subtotal, VAT, total and balance from the current line items.
///
/// The caller must hold the invoice row lock.
pub(crate) async fn recalculate_invoice_totals(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: Uuid,
) -> LedgerResult<Invoice> {
    let amounts: Vec<Decimal> =
        sqlx::query_scalar("SELECT amount FROM invoice_line_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .fetch_all(&mut **tx)
            .await?;

    let (vat_rate, amount_paid): (Decimal, Decimal) =
        sqlx::query_as("SELECT vat_rate, amount_paid FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| LedgerError::not_found(ENTITY, invoice_id))?;

    let totals = InvoiceTotals::from_line_amounts(amounts, vat_rate, amount_paid);
    if totals.balance_due < Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "invoice total {} would fall below the {} already paid",
            totals.total, totals.amount_paid
        )));
    }

    let invoice = sqlx::query_as::<_, Invoice>(
        r#"
        UPDATE invoices
        SET subtotal = $2, vat_amount = $3, total = $4, balance_due = $5, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(invoice_id)
    .bind(totals.subtotal)
    .bind(totals.vat_amount)
    .bind(totals.total)
    .bind(totals.balance_due)
    .fetch_one(&mut **tx)
    .await?;

    Ok(invoice)
}

/// Inserts a line item at `max(line_order) + 1`. Does not recompute totals.
pub(crate) async fn insert_line_item(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: Uuid,
    description: &str,
    quantity: Decimal,
    unit_price: Decimal,
    time_entry_id: Option<Uuid>,
) -> LedgerResult<LineItem> {
    let item = sqlx::query_as::<_, LineItem>(
        r#"
        INSERT INTO invoice_line_items (
            id, invoice_id, description, quantity, unit_price, amount, line_order, time_entry_id
        )
        SELECT $1, $2, $3, $4, $5, $6,
               COALESCE(MAX(line_order), 0) + 1, $7
        FROM invoice_line_items
        WHERE invoice_id = $2
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(invoice_id)
    .bind(description)
    .bind(quantity)
    .bind(unit_price)
    .bind(line_amount(quantity, unit_price))
    .bind(time_entry_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(item)
}

async fn insert_draft(
    tx: &mut Transaction<'_, Postgres>,
    actor: &Actor,
    draft: &DraftInvoice<'_>,
) -> LedgerResult<Invoice> {
    let invoice_number =
        next_invoice_number(tx, actor.firm_id, draft.issue_date.year()).await?;

    let invoice = sqlx::query_as::<_, Invoice>(
        r#"
        INSERT INTO invoices (
            id, firm_id, invoice_number, client_id, matter_id, status,
            issue_date, due_date, vat_rate, notes, terms, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(actor.firm_id)
    .bind(&invoice_number)
    .bind(draft.client_id)
    .bind(draft.matter_id)
    .bind(InvoiceStatus::Draft.as_str())
    .bind(draft.issue_date)
    .bind(draft.due_date)
    .bind(draft.vat_rate)
    .bind(draft.notes)
    .bind(draft.terms)
    .bind(actor.user_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(invoice)
}

/// Invoice id of a line item, if it exists within the firm.
async fn line_item_invoice(
    tx: &mut Transaction<'_, Postgres>,
    firm_id: Uuid,
    line_item_id: Uuid,
) -> LedgerResult<Option<Uuid>> {
    let invoice_id = sqlx::query_scalar(
        r#"
        SELECT li.invoice_id
        FROM invoice_line_items li
        JOIN invoices i ON i.id = li.invoice_id
        WHERE li.id = $1 AND i.firm_id = $2
        "#,
    )
    .bind(line_item_id)
    .bind(firm_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(invoice_id)
}

async fn fetch_line_items(pool: &PgPool, invoice_id: Uuid) -> LedgerResult<Vec<LineItem>> {
    let items = sqlx::query_as::<_, LineItem>(
        "SELECT * FROM invoice_line_items WHERE invoice_id = $1 ORDER BY line_order, created_at",
    )
    .bind(invoice_id)
    .fetch_all(pool)
    .await?;
    Ok(items)
}

fn validate_header(issue_date: NaiveDate, due_date: NaiveDate, vat_rate: Decimal) -> LedgerResult<()> {
    if due_date < issue_date {
        return Err(LedgerError::validation("due_date cannot be before issue_date"));
    }
    if vat_rate < Decimal::ZERO || vat_rate > Decimal::ONE {
        return Err(LedgerError::validation("vat_rate must be a fraction between 0 and 1"));
    }
    if !fits_scale(vat_rate, RATE_SCALE) {
        return Err(LedgerError::validation("vat_rate cannot have more than four decimal places"));
    }
    Ok(())
}

fn validate_line(description: &str, quantity: Decimal, unit_price: Decimal) -> LedgerResult<()> {
    if description.trim().is_empty() {
        return Err(LedgerError::validation("description is required"));
    }
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::validation("quantity must be positive"));
    }
    if unit_price < Decimal::ZERO {
        return Err(LedgerError::validation("unit_price cannot be negative"));
    }
    if !fits_scale(quantity, MONEY_SCALE) || !fits_scale(unit_price, MONEY_SCALE) {
        return Err(LedgerError::validation(
            "quantity and unit_price cannot have more than two decimal places",
        ));
    }
    Ok(())
}

/// `Drafting heads of argument (1.50 h @ 1500/h on 2026-03-04)`
fn pack_line_description(entry: &TimeEntry) -> String {
    format!(
        "{} ({} h @ {}/h on {})",
        entry.description,
        minutes_to_hours(i64::from(entry.duration_minutes)),
        entry.hourly_rate,
        entry.entry_date
    )
}

/// The matter shared by every entry, if there is exactly one.
fn single_matter(entries: &[TimeEntry]) -> Option<Uuid> {
    let first = entries.first()?.matter_id?;
    entries
        .iter()
        .all(|e| e.matter_id == Some(first))
        .then_some(first)
}
