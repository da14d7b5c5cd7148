//! Currency helpers and the cross-client financial rollup.

use crate::{InvoiceStatus, Profile};

/// Format a dollar amount as `$1,234.50`.
pub fn format_amount(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!(
        "{}${}.{:02}",
        if negative { "-" } else { "" },
        grouped,
        cents % 100
    )
}

/// Parse a currency-formatted amount. Tolerates `$`, thousands separators and
/// surrounding whitespace; anything else yields `None`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Paid vs pending totals across a set of profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FinancialSummary {
    pub paid_total: f64,
    pub pending_total: f64,
    pub paid_count: usize,
    pub pending_count: usize,
}

impl FinancialSummary {
    /// Invoices whose amount does not parse are counted but contribute zero.
    pub fn from_profiles(profiles: &[Profile]) -> Self {
        let mut summary = FinancialSummary::default();
        for invoice in profiles.iter().flat_map(|p| p.invoices.iter()) {
            let amount = parse_amount(&invoice.amount).unwrap_or(0.0);
            match invoice.status {
                InvoiceStatus::Paid => {
                    summary.paid_total += amount;
                    summary.paid_count += 1;
                }
                InvoiceStatus::Pending => {
                    summary.pending_total += amount;
                    summary.pending_count += 1;
                }
            }
        }
        summary
    }

    pub fn total(&self) -> f64 {
        self.paid_total + self.pending_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Invoice;

    fn invoice(amount: &str, status: InvoiceStatus) -> Invoice {
        Invoice {
            id: "INV-1000".into(),
            desc: "Work".into(),
            amount: amount.into(),
            date: "2024-01-01".into(),
            status,
        }
    }

    #[test]
    fn format_groups_thousands() {
        assert_eq!(format_amount(0.0), "$0.00");
        assert_eq!(format_amount(999.5), "$999.50");
        assert_eq!(format_amount(1200.0), "$1,200.00");
        assert_eq!(format_amount(1234567.891), "$1,234,567.89");
        assert_eq!(format_amount(-50.0), "-$50.00");
    }

    #[test]
    fn parse_tolerates_formatting() {
        assert_eq!(parse_amount("$1,200.00"), Some(1200.0));
        assert_eq!(parse_amount(" 45 "), Some(45.0));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn rollup_across_profiles() {
        let a = Profile {
            invoices: vec![
                invoice("$1,000.00", InvoiceStatus::Paid),
                invoice("$250.00", InvoiceStatus::Pending),
            ],
            ..Default::default()
        };
        let b = Profile {
            invoices: vec![
                invoice("$500.00", InvoiceStatus::Paid),
                invoice("n/a", InvoiceStatus::Pending),
            ],
            ..Default::default()
        };

        let summary = FinancialSummary::from_profiles(&[a, b]);
        assert_eq!(summary.paid_total, 1500.0);
        assert_eq!(summary.pending_total, 250.0);
        assert_eq!(summary.paid_count, 2);
        assert_eq!(summary.pending_count, 2);
        assert_eq!(summary.total(), 1750.0);
    }
}
