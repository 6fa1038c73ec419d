//! Derived money figures.
//!
//! Everything here is a pure function of stored inputs. The ledger services
//! call these inside the mutating transaction and persist the results, which
//! replaces the recompute triggers of a trigger-based schema.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places of money, quantity and hourly-rate columns.
pub const MONEY_SCALE: u32 = 2;

/// Decimal places of the VAT rate column.
pub const RATE_SCALE: u32 = 4;

/// Whether a column with `scale` decimal places stores `value` unchanged.
///
/// Inputs that would be rounded on write are rejected up front, otherwise
/// derived amounts computed here drift from the stored operands.
pub fn fits_scale(value: Decimal, scale: u32) -> bool {
    value.normalize().scale() <= scale
}

/// Rounds a money amount to cents, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `round2(quantity * unit_price)`
pub fn line_amount(quantity: Decimal, unit_price: Decimal) -> Decimal {
    round2(quantity * unit_price)
}

/// `round2(duration_minutes / 60 * hourly_rate)`.
///
/// Multiplies before dividing so that rates which do not split evenly into
/// minutes keep full precision until the final rounding.
pub fn time_entry_amount(duration_minutes: i32, hourly_rate: Decimal) -> Decimal {
    round2(Decimal::from(duration_minutes) * hourly_rate / Decimal::from(60))
}

/// Minutes expressed as hours, rounded to two places.
pub fn minutes_to_hours(minutes: i64) -> Decimal {
    round2(Decimal::from(minutes) / Decimal::from(60))
}

/// The derived columns of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
}

impl InvoiceTotals {
    /// Derives VAT, total and balance from a subtotal.
    pub fn derive(subtotal: Decimal, vat_rate: Decimal, amount_paid: Decimal) -> Self {
        let vat_amount = round2(subtotal * vat_rate);
        let total = subtotal + vat_amount;
        Self {
            subtotal,
            vat_amount,
            total,
            amount_paid,
            balance_due: total - amount_paid,
        }
    }

    /// Derives every column starting from the current line-item amounts.
    pub fn from_line_amounts<I>(amounts: I, vat_rate: Decimal, amount_paid: Decimal) -> Self
    where
        I: IntoIterator<Item = Decimal>,
    {
        let subtotal = amounts.into_iter().fold(Decimal::ZERO, |acc, a| acc + a);
        Self::derive(subtotal, vat_rate, amount_paid)
    }

    /// Same invoice with `delta` applied to `amount_paid`.
    pub fn with_payment_delta(&self, delta: Decimal) -> Self {
        let amount_paid = self.amount_paid + delta;
        Self {
            amount_paid,
            balance_due: self.total - amount_paid,
            ..*self
        }
    }
}

/// The derived columns of a billing pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackTotals {
    pub total_time_entries: i32,
    pub total_hours: Decimal,
    pub total_amount: Decimal,
}

impl PackTotals {
    /// Sums `(duration_minutes, amount)` pairs of the entries in a pack.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i32, Decimal)>,
    {
        let mut count = 0i32;
        let mut minutes = 0i64;
        let mut amount = Decimal::ZERO;
        for (duration_minutes, entry_amount) in entries {
            count += 1;
            minutes += i64::from(duration_minutes);
            amount += entry_amount;
        }
        Self {
            total_time_entries: count,
            total_hours: minutes_to_hours(minutes),
            total_amount: amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fits_scale_ignores_trailing_zeros() {
        assert!(fits_scale(dec!(1667.50), MONEY_SCALE));
        assert!(fits_scale(dec!(1667.5000), MONEY_SCALE));
        assert!(fits_scale(dec!(1500), MONEY_SCALE));
        assert!(!fits_scale(dec!(1667.495), MONEY_SCALE));
        assert!(fits_scale(dec!(0.1575), RATE_SCALE));
        assert!(!fits_scale(dec!(0.15755), RATE_SCALE));
    }

    #[test]
    fn test_two_line_invoice_with_vat() {
        let lines = [line_amount(dec!(5), dec!(200)), line_amount(dec!(3), dec!(150))];
        let totals = InvoiceTotals::from_line_amounts(lines, dec!(0.15), Decimal::ZERO);

        assert_eq!(totals.subtotal, dec!(1450));
        assert_eq!(totals.vat_amount, dec!(217.50));
        assert_eq!(totals.total, dec!(1667.50));
        assert_eq!(totals.balance_due, dec!(1667.50));
    }

    #[test]
    fn test_empty_invoice_is_zero() {
        let totals = InvoiceTotals::from_line_amounts(Vec::new(), dec!(0.15), Decimal::ZERO);
        assert_eq!(totals.subtotal, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::ZERO);
        assert_eq!(totals.balance_due, Decimal::ZERO);
    }

    #[test]
    fn test_vat_is_rounded_to_cents() {
        let totals = InvoiceTotals::derive(dec!(10.05), dec!(0.15), Decimal::ZERO);
        // 1.5075 rounds to 1.51
        assert_eq!(totals.vat_amount, dec!(1.51));
        assert_eq!(totals.total, dec!(11.56));
    }

    #[test]
    fn test_payment_delta_moves_balance() {
        let totals = InvoiceTotals::derive(dec!(1450), dec!(0.15), Decimal::ZERO);
        let paid = totals.with_payment_delta(dec!(1667.50));
        assert_eq!(paid.amount_paid, dec!(1667.50));
        assert_eq!(paid.balance_due, Decimal::ZERO);

        let refunded = paid.with_payment_delta(dec!(-1667.50));
        assert_eq!(refunded, totals);
    }

    #[test]
    fn test_time_entry_amount() {
        assert_eq!(time_entry_amount(90, dec!(1500)), dec!(2250.00));
        assert_eq!(time_entry_amount(120, dec!(1500)), dec!(3000.00));
        assert_eq!(time_entry_amount(210, dec!(1500)), dec!(5250.00));
        // 10 minutes at 1000/h = 166.666..
        assert_eq!(time_entry_amount(10, dec!(1000)), dec!(166.67));
    }

    #[test]
    fn test_pack_totals_from_entries() {
        let entries = [90, 120, 210]
            .into_iter()
            .map(|m| (m, time_entry_amount(m, dec!(1500))));
        let totals = PackTotals::from_entries(entries);

        assert_eq!(totals.total_time_entries, 3);
        assert_eq!(totals.total_hours, dec!(7.00));
        assert_eq!(totals.total_amount, dec!(10500.00));
    }

    #[test]
    fn test_empty_pack_totals() {
        let totals = PackTotals::from_entries(Vec::new());
        assert_eq!(totals.total_time_entries, 0);
        assert_eq!(totals.total_hours, Decimal::ZERO);
        assert_eq!(totals.total_amount, Decimal::ZERO);
    }
}
