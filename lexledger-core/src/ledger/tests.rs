//! Ledger flows against a real Postgres database.
//!
//! Run with `DATABASE_URL` pointing at a scratch database and `--ignored`.
//! Every test works inside its own freshly generated firm.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::TracingAuditSink;
use crate::error::{LedgerError, TransitionError};
use crate::ledger::{Ledger, LedgerSettings};
use crate::models::billing_pack::CreateBillingPack;
use crate::models::invoice::{CreateInvoice, CreateLineItem};
use crate::models::payment::{RecordPayment, UpdatePayment};
use crate::models::time_entry::{CreateTimeEntry, UpdateTimeEntry};
use crate::models::{Actor, BillingPackStatus, Invoice, InvoiceStatus};

/// Test helper to create a migrated test database pool.
async fn create_test_pool() -> Result<PgPool, anyhow::Error> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL not set for tests"))?;

    let pool = PgPool::connect(&database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

struct Fixture {
    pool: PgPool,
    ledger: Ledger,
    actor: Actor,
    client_id: Uuid,
    matter_id: Uuid,
}

async fn fixture() -> Fixture {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    let actor = Actor::new(Uuid::new_v4(), Uuid::new_v4());

    let client_id: Uuid = sqlx::query_scalar(
        "INSERT INTO clients (firm_id, name) VALUES ($1, 'Acme Holdings') RETURNING id",
    )
    .bind(actor.firm_id)
    .fetch_one(&pool)
    .await
    .expect("Failed to insert client");

    let matter_id: Uuid = sqlx::query_scalar(
        "INSERT INTO matters (firm_id, client_id, title) VALUES ($1, $2, 'Acme v Beta') RETURNING id",
    )
    .bind(actor.firm_id)
    .bind(client_id)
    .fetch_one(&pool)
    .await
    .expect("Failed to insert matter");

    let ledger = Ledger::new(
        pool.clone(),
        Arc::new(TracingAuditSink),
        LedgerSettings::default(),
    );

    Fixture {
        pool,
        ledger,
        actor,
        client_id,
        matter_id,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn line(description: &str, quantity: Decimal, unit_price: Decimal) -> CreateLineItem {
    CreateLineItem {
        description: description.to_string(),
        quantity,
        unit_price,
    }
}

fn payment(amount: Decimal) -> RecordPayment {
    RecordPayment {
        amount,
        payment_date: date(2026, 3, 20),
        payment_method: Some("EFT".to_string()),
        reference: None,
        notes: None,
    }
}

/// Draft invoice with 5 x 200 and 3 x 150 at 15% VAT.
async fn scenario_a_invoice(f: &Fixture) -> Invoice {
    let invoice = f
        .ledger
        .invoices
        .create(
            &f.actor,
            CreateInvoice {
                client_id: f.client_id,
                matter_id: Some(f.matter_id),
                issue_date: Some(date(2026, 3, 1)),
                due_date: None,
                vat_rate: Some(dec!(0.15)),
                notes: None,
                terms: None,
            },
        )
        .await
        .expect("create invoice");

    f.ledger
        .invoices
        .add_line_item(&f.actor, invoice.id, line("Consultation", dec!(5), dec!(200)))
        .await
        .expect("first line");
    f.ledger
        .invoices
        .add_line_item(&f.actor, invoice.id, line("Drafting", dec!(3), dec!(150)))
        .await
        .expect("second line");

    f.ledger
        .invoices
        .get_header(&f.actor, invoice.id)
        .await
        .expect("reload invoice")
}

async fn approved_entry(f: &Fixture, entry_date: NaiveDate, minutes: i32) -> Uuid {
    let entry = f
        .ledger
        .time_entries
        .create(
            &f.actor,
            CreateTimeEntry {
                matter_id: Some(f.matter_id),
                entry_date,
                duration_minutes: minutes,
                hourly_rate: dec!(1500),
                description: "Drafting heads of argument".to_string(),
                billable: None,
            },
        )
        .await
        .expect("create entry");
    f.ledger
        .time_entries
        .approve(&f.actor, entry.id)
        .await
        .expect("approve entry");
    entry.id
}

fn march_pack(f: &Fixture) -> CreateBillingPack {
    CreateBillingPack {
        client_id: f.client_id,
        period_start: date(2026, 3, 1),
        period_end: date(2026, 3, 31),
        notes: None,
    }
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_line_items_drive_invoice_totals() {
    let f = fixture().await;
    let invoice = scenario_a_invoice(&f).await;

    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.subtotal, dec!(1450));
    assert_eq!(invoice.vat_amount, dec!(217.50));
    assert_eq!(invoice.total, dec!(1667.50));
    assert_eq!(invoice.balance_due, dec!(1667.50));
    assert_eq!(invoice.due_date, date(2026, 3, 31));

    let response = f.ledger.invoices.get(&f.actor, invoice.id).await.unwrap();
    let orders: Vec<i32> = response.line_items.iter().map(|l| l.line_order).collect();
    assert_eq!(orders, vec![1, 2]);

    let first = response.line_items[0].id;
    assert!(f.ledger.invoices.delete_line_item(&f.actor, first).await.unwrap());
    assert!(!f.ledger.invoices.delete_line_item(&f.actor, first).await.unwrap());

    let after = f.ledger.invoices.get_header(&f.actor, invoice.id).await.unwrap();
    assert_eq!(after.subtotal, dec!(450));
    assert_eq!(after.total, dec!(517.50));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_pay_then_refund_restores_invoice() {
    let f = fixture().await;
    let invoice = scenario_a_invoice(&f).await;
    let sent = f.ledger.invoices.send(&f.actor, invoice.id).await.unwrap();
    assert_eq!(sent.status, InvoiceStatus::Sent);
    assert!(sent.sent_date.is_some());

    let (recorded, paid) = f
        .ledger
        .payments
        .record(&f.actor, invoice.id, payment(dec!(1667.50)))
        .await
        .unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert_eq!(paid.paid_date, Some(date(2026, 3, 20)));
    assert_eq!(paid.balance_due, Decimal::ZERO);

    let reopened = f
        .ledger
        .payments
        .delete(&f.actor, recorded.id)
        .await
        .unwrap()
        .expect("payment existed");
    assert_eq!(reopened.status, InvoiceStatus::Sent);
    assert_eq!(reopened.paid_date, None);
    assert_eq!(reopened.amount_paid, Decimal::ZERO);
    assert_eq!(reopened.balance_due, dec!(1667.50));

    assert!(f.ledger.payments.delete(&f.actor, recorded.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_payment_on_draft_is_rejected() {
    let f = fixture().await;
    let invoice = scenario_a_invoice(&f).await;

    let result = f
        .ledger
        .payments
        .record(&f.actor, invoice.id, payment(dec!(100)))
        .await;
    assert!(matches!(
        result,
        Err(LedgerError::InvalidState(TransitionError::InvoiceNotPayable(
            InvoiceStatus::Draft
        )))
    ));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_overpayment_leaves_invoice_untouched() {
    let f = fixture().await;
    let invoice = scenario_a_invoice(&f).await;
    f.ledger.invoices.send(&f.actor, invoice.id).await.unwrap();

    let result = f
        .ledger
        .payments
        .record(&f.actor, invoice.id, payment(dec!(1667.51)))
        .await;
    assert!(matches!(result, Err(LedgerError::Validation(_))));

    let after = f.ledger.invoices.get_header(&f.actor, invoice.id).await.unwrap();
    assert_eq!(after.status, InvoiceStatus::Sent);
    assert_eq!(after.amount_paid, Decimal::ZERO);
    assert_eq!(after.balance_due, dec!(1667.50));
    assert!(f
        .ledger
        .payments
        .list_for_invoice(&f.actor, invoice.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_payment_update_settles_and_reopens() {
    let f = fixture().await;
    let invoice = scenario_a_invoice(&f).await;
    f.ledger.invoices.send(&f.actor, invoice.id).await.unwrap();
    f.ledger.invoices.mark_viewed(&f.actor, invoice.id).await.unwrap();

    let (partial, viewed) = f
        .ledger
        .payments
        .record(&f.actor, invoice.id, payment(dec!(1000)))
        .await
        .unwrap();
    assert_eq!(viewed.status, InvoiceStatus::Viewed);
    assert_eq!(viewed.balance_due, dec!(667.50));

    let raise = UpdatePayment {
        amount: Some(dec!(1667.50)),
        ..Default::default()
    };
    let (_, paid) = f.ledger.payments.update(&f.actor, partial.id, raise).await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert!(paid.paid_date.is_some());

    let lower = UpdatePayment {
        amount: Some(dec!(500)),
        ..Default::default()
    };
    let (_, reopened) = f.ledger.payments.update(&f.actor, partial.id, lower).await.unwrap();
    assert_eq!(reopened.status, InvoiceStatus::Sent);
    assert_eq!(reopened.paid_date, None);
    assert_eq!(reopened.balance_due, dec!(1167.50));

    let too_much = UpdatePayment {
        amount: Some(dec!(2000)),
        ..Default::default()
    };
    assert!(matches!(
        f.ledger.payments.update(&f.actor, partial.id, too_much).await,
        Err(LedgerError::Validation(_))
    ));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_sent_invoice_is_locked_and_send_is_idempotent() {
    let f = fixture().await;
    let invoice = scenario_a_invoice(&f).await;
    let sent = f.ledger.invoices.send(&f.actor, invoice.id).await.unwrap();
    let again = f.ledger.invoices.send(&f.actor, invoice.id).await.unwrap();
    assert_eq!(again.status, InvoiceStatus::Sent);
    assert_eq!(again.sent_date, sent.sent_date);

    let result = f
        .ledger
        .invoices
        .add_line_item(&f.actor, invoice.id, line("Late addition", dec!(1), dec!(10)))
        .await;
    assert!(matches!(
        result,
        Err(LedgerError::InvalidState(TransitionError::InvoiceNotEditable(
            InvoiceStatus::Sent
        )))
    ));

    let cancelled = f.ledger.invoices.delete(&f.actor, invoice.id).await.unwrap();
    assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_invoice_numbers_increase_per_firm() {
    let f = fixture().await;
    let first = scenario_a_invoice(&f).await;
    let second = scenario_a_invoice(&f).await;

    assert_eq!(first.invoice_number, "INV-2026-0001");
    assert_eq!(second.invoice_number, "INV-2026-0002");
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_billing_pack_generation_and_approval() {
    let f = fixture().await;
    let mut ids = Vec::new();
    for (day, minutes) in [(3, 90), (10, 120), (24, 210)] {
        ids.push(approved_entry(&f, date(2026, 3, day), minutes).await);
    }

    let pack = f.ledger.billing_packs.generate(&f.actor, march_pack(&f)).await.unwrap();
    assert_eq!(pack.status, BillingPackStatus::Generated);
    assert_eq!(pack.total_time_entries, 3);
    assert_eq!(pack.total_hours, dec!(7.00));
    assert_eq!(pack.total_amount, dec!(10500.00));

    let sent = f.ledger.billing_packs.send(&f.actor, pack.id).await.unwrap();
    assert_eq!(sent.status, BillingPackStatus::Sent);

    let approval = f.ledger.billing_packs.approve(&f.actor, pack.id, true).await.unwrap();
    assert_eq!(approval.pack.status, BillingPackStatus::Approved);
    assert_eq!(approval.billed_entries, 3);

    for id in &ids {
        let entry = f.ledger.time_entries.get(&f.actor, *id).await.unwrap();
        assert!(entry.billed);
        assert!(entry.approved_by.is_some());
    }

    let invoice_id = approval.invoice_id.expect("invoice seeded");
    let invoice = f.ledger.invoices.get(&f.actor, invoice_id).await.unwrap();
    assert_eq!(invoice.invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.invoice.subtotal, dec!(10500.00));
    assert_eq!(invoice.line_items.len(), 3);
    assert!(invoice.line_items.iter().all(|l| l.time_entry_id.is_some()));

    let repeat = f.ledger.billing_packs.approve(&f.actor, pack.id, true).await.unwrap();
    assert_eq!(repeat.billed_entries, 0);
    assert_eq!(repeat.invoice_id, None);

    let second = f.ledger.billing_packs.generate(&f.actor, march_pack(&f)).await.unwrap();
    assert_eq!(second.total_time_entries, 0);
    assert_eq!(second.total_amount, Decimal::ZERO);

    assert!(matches!(
        f.ledger.time_entries.unapprove(&f.actor, ids[0]).await,
        Err(LedgerError::InvalidState(TransitionError::CannotUnapproveBilled))
    ));
    assert!(matches!(
        f.ledger.billing_packs.delete(&f.actor, pack.id).await,
        Err(LedgerError::InvalidState(TransitionError::PackNotDeletable(
            BillingPackStatus::Approved
        )))
    ));

    let orphans: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM time_entries WHERE firm_id = $1 AND billed AND approved_by IS NULL",
    )
    .bind(f.actor.firm_id)
    .fetch_one(&f.pool)
    .await
    .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_unapproved_and_foreign_entries_are_not_packed() {
    let f = fixture().await;
    let eligible = approved_entry(&f, date(2026, 3, 5), 60).await;
    approved_entry(&f, date(2026, 4, 2), 60).await;
    let pending = f
        .ledger
        .time_entries
        .create(
            &f.actor,
            CreateTimeEntry {
                matter_id: Some(f.matter_id),
                entry_date: date(2026, 3, 6),
                duration_minutes: 30,
                hourly_rate: dec!(1500),
                description: "Call with client".to_string(),
                billable: Some(true),
            },
        )
        .await
        .unwrap();

    let pack = f.ledger.billing_packs.create(&f.actor, march_pack(&f)).await.unwrap();
    assert_eq!(pack.status, BillingPackStatus::Draft);

    let rejected = f
        .ledger
        .billing_packs
        .add_entries(&f.actor, pack.id, &[eligible, pending.id])
        .await;
    assert!(matches!(rejected, Err(LedgerError::Validation(_))));

    let pack = f
        .ledger
        .billing_packs
        .add_entries(&f.actor, pack.id, &[eligible])
        .await
        .unwrap();
    assert_eq!(pack.total_time_entries, 1);
    assert_eq!(pack.total_amount, dec!(1500.00));

    let entries = f.ledger.billing_packs.list_entries(&f.actor, pack.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, eligible);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_unapprove_detaches_entry_from_open_pack() {
    let f = fixture().await;
    let first = approved_entry(&f, date(2026, 3, 5), 60).await;
    approved_entry(&f, date(2026, 3, 6), 30).await;

    let pack = f.ledger.billing_packs.generate(&f.actor, march_pack(&f)).await.unwrap();
    assert_eq!(pack.total_time_entries, 2);

    let entry = f.ledger.time_entries.unapprove(&f.actor, first).await.unwrap();
    assert!(entry.approved_by.is_none());

    let pack = f.ledger.billing_packs.get(&f.actor, pack.id).await.unwrap();
    assert_eq!(pack.total_time_entries, 1);
    assert_eq!(pack.total_hours, dec!(0.50));
    assert_eq!(pack.total_amount, dec!(750.00));

    let edited = f
        .ledger
        .time_entries
        .update(
            &f.actor,
            first,
            UpdateTimeEntry {
                duration_minutes: Some(45),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.amount, dec!(1125.00));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_approved_entry_cannot_be_modified() {
    let f = fixture().await;
    let id = approved_entry(&f, date(2026, 3, 5), 60).await;

    let update = f
        .ledger
        .time_entries
        .update(
            &f.actor,
            id,
            UpdateTimeEntry {
                duration_minutes: Some(90),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(
        update,
        Err(LedgerError::InvalidState(TransitionError::CannotModifyApproved))
    ));
    assert!(matches!(
        f.ledger.time_entries.delete(&f.actor, id).await,
        Err(LedgerError::InvalidState(TransitionError::CannotModifyApproved))
    ));
    assert!(matches!(
        f.ledger.time_entries.approve(&f.actor, id).await,
        Err(LedgerError::InvalidState(TransitionError::AlreadyApproved))
    ));

    let other_firm = Actor::new(Uuid::new_v4(), f.actor.user_id);
    assert!(matches!(
        f.ledger.time_entries.get(&other_firm, id).await,
        Err(LedgerError::NotFound { .. })
    ));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_sub_cent_money_inputs_are_rejected() {
    let f = fixture().await;
    let invoice = scenario_a_invoice(&f).await;

    for bad in [line("Copies", dec!(3), dec!(0.334)), line("Copies", dec!(0.001), dec!(100))] {
        assert!(matches!(
            f.ledger.invoices.add_line_item(&f.actor, invoice.id, bad).await,
            Err(LedgerError::Validation(_))
        ));
    }

    f.ledger.invoices.send(&f.actor, invoice.id).await.unwrap();
    assert!(matches!(
        f.ledger
            .payments
            .record(&f.actor, invoice.id, payment(dec!(1667.495)))
            .await,
        Err(LedgerError::Validation(_))
    ));

    let after = f.ledger.invoices.get_header(&f.actor, invoice.id).await.unwrap();
    assert_eq!(after.total, dec!(1667.50));
    assert_eq!(after.amount_paid, Decimal::ZERO);
    assert_eq!(after.balance_due, after.total - after.amount_paid);

    let entry = f
        .ledger
        .time_entries
        .create(
            &f.actor,
            CreateTimeEntry {
                matter_id: Some(f.matter_id),
                entry_date: date(2026, 3, 5),
                duration_minutes: 600,
                hourly_rate: dec!(0.336),
                description: "Research".to_string(),
                billable: None,
            },
        )
        .await;
    assert!(matches!(entry, Err(LedgerError::Validation(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires database setup
async fn test_concurrent_payments_never_exceed_total() {
    let f = fixture().await;
    let invoice = scenario_a_invoice(&f).await;
    f.ledger.invoices.send(&f.actor, invoice.id).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = f.ledger.clone();
            let actor = f.actor;
            tokio::spawn(async move {
                ledger
                    .payments
                    .record(&actor, invoice.id, payment(dec!(1000)))
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(LedgerError::Validation(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(accepted, 1);

    let payments = f
        .ledger
        .payments
        .list_for_invoice(&f.actor, invoice.id)
        .await
        .unwrap();
    let paid: Decimal = payments.iter().map(|p| p.amount).sum();
    let after = f.ledger.invoices.get_header(&f.actor, invoice.id).await.unwrap();
    assert!(paid <= after.total);
    assert_eq!(after.amount_paid, paid);
    assert_eq!(after.balance_due, dec!(667.50));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore] // Requires database setup
async fn test_unapprove_detaches_entry_packed_while_waiting() {
    let f = fixture().await;
    let id = approved_entry(&f, date(2026, 3, 5), 60).await;
    let pack = f.ledger.billing_packs.create(&f.actor, march_pack(&f)).await.unwrap();

    // Hold the entry so unapprove waits on it after reading pack membership.
    let mut holder = f.pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM time_entries WHERE id = $1 FOR UPDATE")
        .bind(id)
        .execute(&mut *holder)
        .await
        .unwrap();

    let ledger = f.ledger.clone();
    let actor = f.actor;
    let unapprove = tokio::spawn(async move { ledger.time_entries.unapprove(&actor, id).await });
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    sqlx::query("INSERT INTO billing_pack_entries (billing_pack_id, time_entry_id) VALUES ($1, $2)")
        .bind(pack.id)
        .bind(id)
        .execute(&mut *holder)
        .await
        .unwrap();
    holder.commit().await.unwrap();

    let entry = unapprove.await.unwrap().unwrap();
    assert!(entry.approved_by.is_none());
    assert!(f
        .ledger
        .billing_packs
        .list_entries(&f.actor, pack.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        f.ledger.billing_packs.get(&f.actor, pack.id).await.unwrap().total_time_entries,
        0
    );
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_payment_on_cancelled_invoice_cannot_be_raised() {
    let f = fixture().await;
    let invoice = scenario_a_invoice(&f).await;
    f.ledger.invoices.send(&f.actor, invoice.id).await.unwrap();
    let (recorded, _) = f
        .ledger
        .payments
        .record(&f.actor, invoice.id, payment(dec!(500)))
        .await
        .unwrap();
    f.ledger.invoices.delete(&f.actor, invoice.id).await.unwrap();

    let raise = UpdatePayment {
        amount: Some(dec!(600)),
        ..Default::default()
    };
    assert!(matches!(
        f.ledger.payments.update(&f.actor, recorded.id, raise).await,
        Err(LedgerError::InvalidState(TransitionError::InvoiceNotPayable(
            InvoiceStatus::Cancelled
        )))
    ));

    let lower = UpdatePayment {
        amount: Some(dec!(400)),
        ..Default::default()
    };
    let (_, cancelled) = f.ledger.payments.update(&f.actor, recorded.id, lower).await.unwrap();
    assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
    assert_eq!(cancelled.amount_paid, dec!(400));
}
