use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::LedgerResult;

const PREFIX: &str = "INV";

/// `INV-2026-0001`. Sequences above 9999 keep growing in width.
pub fn format_invoice_number(year: i32, sequence: u32) -> String {
    format!("{}-{}-{:04}", PREFIX, year, sequence)
}

/// Sequence part of a number issued in `year`, if it has the expected shape.
pub fn parse_sequence(invoice_number: &str, year: i32) -> Option<u32> {
    let mut parts = invoice_number.splitn(3, '-');
    if parts.next()? != PREFIX {
        return None;
    }
    if parts.next()?.parse::<i32>().ok()? != year {
        return None;
    }
    let sequence = parts.next()?;
    if sequence.len() < 4 || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    sequence.parse().ok()
}

pub fn is_valid_invoice_number(invoice_number: &str) -> bool {
    let year = match invoice_number.get(4..8).and_then(|y| y.parse::<i32>().ok()) {
        Some(year) => year,
        None => return false,
    };
    parse_sequence(invoice_number, year).is_some()
}

/// Allocates the next number for `firm_id` in `year`.
///
/// Takes a transaction-scoped advisory lock keyed on firm and year, so two
/// concurrent invoice creations for the same firm serialize here and the
/// second one sees the first one's number once it commits.
pub(crate) async fn next_invoice_number(
    tx: &mut Transaction<'_, Postgres>,
    firm_id: Uuid,
    year: i32,
) -> LedgerResult<String> {
    let lock_key = format!("invoice_number:{}:{}", firm_id, year);
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(&lock_key)
        .execute(&mut **tx)
        .await?;

    let numbers: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT invoice_number
        FROM invoices
        WHERE firm_id = $1 AND invoice_number LIKE $2
        "#,
    )
    .bind(firm_id)
    .bind(format!("{}-{}-%", PREFIX, year))
    .fetch_all(&mut **tx)
    .await?;

    let last = numbers
        .iter()
        .filter_map(|n| parse_sequence(n, year))
        .max()
        .unwrap_or(0);

    Ok(format_invoice_number(year, last + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pads_to_four_digits() {
        assert_eq!(format_invoice_number(2026, 1), "INV-2026-0001");
        assert_eq!(format_invoice_number(2026, 123), "INV-2026-0123");
        assert_eq!(format_invoice_number(2026, 12345), "INV-2026-12345");
    }

    #[test]
    fn test_parse_sequence() {
        assert_eq!(parse_sequence("INV-2026-0123", 2026), Some(123));
        assert_eq!(parse_sequence("INV-2026-12345", 2026), Some(12345));
        assert_eq!(parse_sequence("INV-2025-0123", 2026), None);
        assert_eq!(parse_sequence("INV-2026-12", 2026), None);
        assert_eq!(parse_sequence("QUO-2026-0001", 2026), None);
        assert_eq!(parse_sequence("INV-2026-00a1", 2026), None);
    }

    #[test]
    fn test_validation() {
        assert!(is_valid_invoice_number("INV-2026-0001"));
        assert!(!is_valid_invoice_number("INV-26-0001"));
        assert!(!is_valid_invoice_number("garbage"));
    }

    #[test]
    fn test_numbers_sort_numerically_past_9999() {
        let issued = ["INV-2026-9999", "INV-2026-10000", "INV-2026-0002"];
        let last = issued.iter().filter_map(|n| parse_sequence(n, 2026)).max();
        assert_eq!(last, Some(10000));
    }
}
