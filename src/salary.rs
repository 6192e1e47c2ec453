//! Structured salary data and the monthly-income policy.
//!
//! [`SalaryExtraction`] is the only thing the reasoning model is allowed to
//! hand back to the advisor. Every amount is optional: an absent field is
//! omitted, never coerced to zero, because a zero housing allowance and an
//! unknown housing allowance mean very different things to an underwriter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency assumed when the document does not state one.
pub const DEFAULT_CURRENCY: &str = "AED";

/// One named allowance outside the standard basic / housing / transport split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allowance {
    pub name: String,
    pub amount: f64,
}

/// Salary figures parsed from a payslip or salary certificate.
///
/// All amounts are monthly and non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryExtraction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_salary: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub housing_allowance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transportation_allowance: Option<f64>,
    #[serde(default)]
    pub other_allowances: Vec<Allowance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_gross_salary: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deductions: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_salary: Option<f64>,
    pub currency: String,
}

impl Default for SalaryExtraction {
    fn default() -> Self {
        Self {
            basic_salary: None,
            housing_allowance: None,
            transportation_allowance: None,
            other_allowances: Vec::new(),
            total_gross_salary: None,
            deductions: None,
            net_salary: None,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

impl SalaryExtraction {
    /// True when not a single amount was found.
    pub fn is_empty(&self) -> bool {
        self.basic_salary.is_none()
            && self.housing_allowance.is_none()
            && self.transportation_allowance.is_none()
            && self.other_allowances.is_empty()
            && self.total_gross_salary.is_none()
            && self.deductions.is_none()
            && self.net_salary.is_none()
    }
}

/// Which field the monthly income figure was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeSource {
    NetSalary,
    TotalGrossSalary,
    BasicSalary,
}

impl IncomeSource {
    pub fn label(self) -> &'static str {
        match self {
            IncomeSource::NetSalary => "net salary",
            IncomeSource::TotalGrossSalary => "total gross salary",
            IncomeSource::BasicSalary => "basic salary",
        }
    }
}

impl fmt::Display for IncomeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The single income scalar fed to the mortgage calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyIncome {
    pub amount: f64,
    pub source: IncomeSource,
}

/// Pick the monthly income: net salary, else total gross, else basic.
///
/// Returns `None` when none of the three is present. Allowances alone are
/// never summed into an income figure.
pub fn monthly_income(salary: &SalaryExtraction) -> Option<MonthlyIncome> {
    [
        (salary.net_salary, IncomeSource::NetSalary),
        (salary.total_gross_salary, IncomeSource::TotalGrossSalary),
        (salary.basic_salary, IncomeSource::BasicSalary),
    ]
    .into_iter()
    .find_map(|(amount, source)| amount.map(|amount| MonthlyIncome { amount, source }))
}
