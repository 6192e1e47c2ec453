//! Confirmation message shown after a successful extraction.
//!
//! Pure string building: no I/O, no model calls. The text lists only the
//! fields that were found and asks the user to confirm before any mortgage
//! numbers are run on them.

use crate::salary::{MonthlyIncome, SalaryExtraction};
use std::fmt::Write as _;

/// Closing line appended to every confirmation.
pub const CONFIRMATION_PROMPT: &str =
    "Please confirm these figures are correct before I use them for your mortgage calculations.";

/// Format `amount` as `"AED 15,000"` or `"AED 15,000.50"`.
///
/// Whole amounts drop the decimals; anything else is rounded to two places.
pub fn format_amount(currency: &str, amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if frac == 0 {
        format!("{currency} {sign}{grouped}")
    } else {
        format!("{currency} {sign}{grouped}.{frac:02}")
    }
}

/// Build the confirmation text for `salary`.
pub fn format_confirmation(salary: &SalaryExtraction, income: Option<&MonthlyIncome>) -> String {
    let currency = salary.currency.as_str();
    let mut out = String::from("Here's what I found in your salary document:\n");

    let fields = [
        ("Basic salary", salary.basic_salary),
        ("Housing allowance", salary.housing_allowance),
        ("Transportation allowance", salary.transportation_allowance),
    ];
    for (label, value) in fields {
        if let Some(v) = value {
            let _ = writeln!(out, "- {label}: {}", format_amount(currency, v));
        }
    }
    for allowance in &salary.other_allowances {
        let _ = writeln!(
            out,
            "- {}: {}",
            allowance.name,
            format_amount(currency, allowance.amount)
        );
    }

    let totals = [
        ("Total gross salary", salary.total_gross_salary),
        ("Deductions", salary.deductions),
        ("Net salary", salary.net_salary),
    ];
    for (label, value) in totals {
        if let Some(v) = value {
            let _ = writeln!(out, "- {label}: {}", format_amount(currency, v));
        }
    }

    match income {
        Some(income) => {
            let _ = writeln!(
                out,
                "\nI'll use your {} of {} per month as your income.",
                income.source,
                format_amount(currency, income.amount)
            );
        }
        None => {
            out.push_str(
                "\nI couldn't find a basic, gross or net salary figure, so please tell me your monthly income.\n",
            );
        }
    }

    out.push('\n');
    out.push_str(CONFIRMATION_PROMPT);
    out
}
