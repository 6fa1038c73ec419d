use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditRecord, AuditSink};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::invoices::lock_invoice;
use crate::ledger::state_machine::{ensure_invoice_payable, settle_invoice_status, PaidDateAction};
use crate::ledger::totals::{fits_scale, InvoiceTotals, MONEY_SCALE};
use crate::models::payment::{PaymentStats, RecordPayment, UpdatePayment};
use crate::models::{Actor, Invoice, Payment};

const ENTITY: &str = "invoice_payment";

/// Applies payments against invoices.
///
/// Each operation locks the invoice row first and the payment row second,
/// moves `amount_paid` by the payment delta, re-derives the balance and
/// re-evaluates the invoice status, all in one transaction.
#[derive(Clone)]
pub struct PaymentLedger {
    pool: PgPool,
    audit: Arc<dyn AuditSink>,
}

impl PaymentLedger {
    pub fn new(pool: PgPool, audit: Arc<dyn AuditSink>) -> Self {
        Self { pool, audit }
    }

    /// Records a payment against an issued invoice.
    ///
    /// # Arguments
    ///
    /// * `actor` - Firm and user capturing the payment
    /// * `invoice_id` - Invoice being paid
    /// * `request` - Amount (positive, at most the balance due), date and references
    ///
    /// # Returns
    ///
    /// The stored payment and the invoice as it stands after the payment.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the invoice does not exist in the firm
    /// - `InvalidState` if the invoice is draft or cancelled
    /// - `Validation` if the amount is not positive or exceeds the balance due
    #[instrument(skip(self, request), fields(firm_id = %actor.firm_id, amount = %request.amount))]
    pub async fn record(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        request: RecordPayment,
    ) -> LedgerResult<(Payment, Invoice)> {
        validate_amount(request.amount)?;

        let mut tx = self.pool.begin().await?;

        let invoice = lock_invoice(&mut tx, actor.firm_id, invoice_id).await?;
        ensure_invoice_payable(invoice.status)?;
        if request.amount > invoice.balance_due {
            return Err(LedgerError::validation(format!(
                "payment of {} exceeds balance due of {}",
                request.amount, invoice.balance_due
            )));
        }

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO invoice_payments (
                id, invoice_id, amount, payment_date, payment_method, reference, notes, recorded_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(request.amount)
        .bind(request.payment_date)
        .bind(&request.payment_method)
        .bind(&request.reference)
        .bind(&request.notes)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        let updated =
            apply_payment_delta(&mut tx, &invoice, request.amount, request.payment_date).await?;

        tx.commit().await?;

        info!(
            invoice_id = %invoice_id,
            payment_id = %payment.id,
            status = %updated.status,
            balance_due = %updated.balance_due,
            "Payment recorded"
        );
        self.audit.record(
            AuditRecord::new(actor, AuditAction::RecordPayment, ENTITY, payment.id).with_changes(
                json!({
                    "invoice_id": invoice_id,
                    "amount": payment.amount,
                    "status": { "before": invoice.status, "after": updated.status },
                }),
            ),
        );

        Ok((payment, updated))
    }

    /// Edits a payment. An amount change is applied to the invoice as a
    /// delta and may settle or reopen it.
    #[instrument(skip(self, request), fields(firm_id = %actor.firm_id))]
    pub async fn update(
        &self,
        actor: &Actor,
        payment_id: Uuid,
        request: UpdatePayment,
    ) -> LedgerResult<(Payment, Invoice)> {
        if let Some(amount) = request.amount {
            validate_amount(amount)?;
        }

        let mut tx = self.pool.begin().await?;

        let invoice_id = payment_invoice(&mut tx, actor.firm_id, payment_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(ENTITY, payment_id))?;
        let invoice = lock_invoice(&mut tx, actor.firm_id, invoice_id).await?;
        let current = lock_payment(&mut tx, invoice_id, payment_id).await?;

        if request.is_empty() {
            return Ok((current, invoice));
        }
        // Raising a payment takes money like a new one; lowering it is a refund.
        if request.amount.is_some_and(|amount| amount > current.amount) {
            ensure_invoice_payable(invoice.status)?;
        }

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE invoice_payments
            SET amount = $2,
                payment_date = $3,
                payment_method = $4,
                reference = $5,
                notes = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(request.amount.unwrap_or(current.amount))
        .bind(request.payment_date.unwrap_or(current.payment_date))
        .bind(request.payment_method.as_ref().or(current.payment_method.as_ref()))
        .bind(request.reference.as_ref().or(current.reference.as_ref()))
        .bind(request.notes.as_ref().or(current.notes.as_ref()))
        .fetch_one(&mut *tx)
        .await?;

        let delta = payment.amount - current.amount;
        let updated = if delta.is_zero() {
            invoice.clone()
        } else {
            apply_payment_delta(&mut tx, &invoice, delta, payment.payment_date).await?
        };

        tx.commit().await?;

        self.audit.record(
            AuditRecord::new(actor, AuditAction::UpdatePayment, ENTITY, payment_id).with_changes(
                json!({
                    "invoice_id": invoice_id,
                    "amount": { "before": current.amount, "after": payment.amount },
                    "status": { "before": invoice.status, "after": updated.status },
                }),
            ),
        );

        Ok((payment, updated))
    }

    /// Reverses and removes a payment. Returns the invoice afterwards, or
    /// `None` when the payment does not exist.
    #[instrument(skip(self), fields(firm_id = %actor.firm_id))]
    pub async fn delete(&self, actor: &Actor, payment_id: Uuid) -> LedgerResult<Option<Invoice>> {
        let mut tx = self.pool.begin().await?;

        let invoice_id = match payment_invoice(&mut tx, actor.firm_id, payment_id).await? {
            Some(invoice_id) => invoice_id,
            None => return Ok(None),
        };
        let invoice = lock_invoice(&mut tx, actor.firm_id, invoice_id).await?;
        let payment = match lock_payment(&mut tx, invoice_id, payment_id).await {
            Ok(payment) => payment,
            Err(LedgerError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        sqlx::query("DELETE FROM invoice_payments WHERE id = $1")
            .bind(payment_id)
            .execute(&mut *tx)
            .await?;

        let updated =
            apply_payment_delta(&mut tx, &invoice, -payment.amount, payment.payment_date).await?;

        tx.commit().await?;

        info!(
            invoice_id = %invoice_id,
            payment_id = %payment_id,
            status = %updated.status,
            "Payment reversed"
        );
        self.audit.record(
            AuditRecord::new(actor, AuditAction::DeletePayment, ENTITY, payment_id).with_changes(
                json!({
                    "invoice_id": invoice_id,
                    "amount": payment.amount,
                    "status": { "before": invoice.status, "after": updated.status },
                }),
            ),
        );

        Ok(Some(updated))
    }

    pub async fn get(&self, actor: &Actor, payment_id: Uuid) -> LedgerResult<Payment> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT p.*
            FROM invoice_payments p
            JOIN invoices i ON i.id = p.invoice_id
            WHERE p.id = $1 AND i.firm_id = $2
            "#,
        )
        .bind(payment_id)
        .bind(actor.firm_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::not_found(ENTITY, payment_id))
    }

    /// Payments of one invoice, most recent first.
    pub async fn list_for_invoice(&self, actor: &Actor, invoice_id: Uuid) -> LedgerResult<Vec<Payment>> {
        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM invoices WHERE id = $1 AND firm_id = $2")
                .bind(invoice_id)
                .bind(actor.firm_id)
                .fetch_optional(&self.pool)
                .await?;
        if exists.is_none() {
            return Err(LedgerError::not_found("invoice", invoice_id));
        }

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM invoice_payments
            WHERE invoice_id = $1
            ORDER BY payment_date DESC, created_at DESC
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Latest payments across the firm.
    pub async fn recent(&self, actor: &Actor, limit: i64) -> LedgerResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT p.*
            FROM invoice_payments p
            JOIN invoices i ON i.id = p.invoice_id
            WHERE i.firm_id = $1
            ORDER BY p.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(actor.firm_id)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    pub async fn stats(
        &self,
        actor: &Actor,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<PaymentStats> {
        let stats = sqlx::query_as::<_, PaymentStats>(
            r#"
            SELECT
                COUNT(*) AS total_payments,
                COALESCE(SUM(p.amount), 0) AS total_amount,
                COUNT(DISTINCT p.invoice_id) AS invoices_with_payments,
                COUNT(DISTINCT p.payment_date) AS payment_days
            FROM invoice_payments p
            JOIN invoices i ON i.id = p.invoice_id
            WHERE i.firm_id = $1
              AND ($2::DATE IS NULL OR p.payment_date >= $2)
              AND ($3::DATE IS NULL OR p.payment_date <= $3)
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

/// Moves `amount_paid` by `delta` on a locked invoice and re-evaluates its
/// status. `paid_on` becomes the paid date if the invoice settles.
async fn apply_payment_delta(
    tx: &mut Transaction<'_, Postgres>,
    invoice: &Invoice,
    delta: Decimal,
    paid_on: NaiveDate,
) -> LedgerResult<Invoice> {
    let totals = InvoiceTotals {
        subtotal: invoice.subtotal,
        vat_amount: invoice.vat_amount,
        total: invoice.total,
        amount_paid: invoice.amount_paid,
        balance_due: invoice.balance_due,
    }
    .with_payment_delta(delta);
    check_amount_paid(&totals)?;

    let (status, paid_date_action) = settle_invoice_status(invoice.status, totals.balance_due);
    let paid_date = match paid_date_action {
        PaidDateAction::Set => Some(paid_on),
        PaidDateAction::Clear => None,
        PaidDateAction::Keep => invoice.paid_date,
    };

    let updated = sqlx::query_as::<_, Invoice>(
        r#"
        UPDATE invoices
        SET amount_paid = $2, balance_due = $3, status = $4, paid_date = $5, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(invoice.id)
    .bind(totals.amount_paid)
    .bind(totals.balance_due)
    .bind(status.as_str())
    .bind(paid_date)
    .fetch_one(&mut **tx)
    .await?;

    Ok(updated)
}

/// Payments never push an invoice past its total or below zero paid.
fn check_amount_paid(totals: &InvoiceTotals) -> LedgerResult<()> {
    if totals.amount_paid > totals.total {
        return Err(LedgerError::validation(format!(
            "payments of {} would exceed invoice total of {}",
            totals.amount_paid, totals.total
        )));
    }
    if totals.amount_paid < Decimal::ZERO {
        return Err(LedgerError::validation("amount paid cannot become negative"));
    }
    Ok(())
}

fn validate_amount(amount: Decimal) -> LedgerResult<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::validation("payment amount must be positive"));
    }
    if !fits_scale(amount, MONEY_SCALE) {
        return Err(LedgerError::validation("payment amount cannot have more than two decimal places"));
    }
    Ok(())
}

async fn payment_invoice(
    tx: &mut Transaction<'_, Postgres>,
    firm_id: Uuid,
    payment_id: Uuid,
) -> LedgerResult<Option<Uuid>> {
    let invoice_id = sqlx::query_scalar(
        r#"
        SELECT p.invoice_id
        FROM invoice_payments p
        JOIN invoices i ON i.id = p.invoice_id
        WHERE p.id = $1 AND i.firm_id = $2
        "#,
    )
    .bind(payment_id)
    .bind(firm_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(invoice_id)
}

async fn lock_payment(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: Uuid,
    payment_id: Uuid,
) -> LedgerResult<Payment> {
    sqlx::query_as::<_, Payment>(
        "SELECT * FROM invoice_payments WHERE id = $1 AND invoice_id = $2 FOR UPDATE",
    )
    .bind(payment_id)
    .bind(invoice_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| LedgerError::not_found(ENTITY, payment_id))
}
