//! Deterministic mortgage arithmetic.
//!
//! The language model never does maths. Every figure the advisor quotes comes
//! from one of these closed-form functions, exposed to the CLI and to the
//! HTTP tool endpoints.
//!
//! UAE rules encoded here:
//!
//! | Rule | Value |
//! |------|-------|
//! | Maximum loan-to-value | 80 % (minimum 20 % down payment) |
//! | Upfront costs (DLD fee, agency, registration) | ≈ 7 % of price |
//! | Maximum tenure | 25 years |
//! | Default annual rate | 4.5 % |

use crate::error::AdvisorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum loan-to-value ratio.
pub const MAX_LTV: f64 = 0.80;

/// Upfront buying costs as a share of the property price.
pub const UPFRONT_COST_RATE: f64 = 0.07;

/// Longest mortgage term in years.
pub const MAX_TENURE_YEARS: u32 = 25;

/// Annual interest rate used when none (or a non-positive one) is given.
pub const DEFAULT_ANNUAL_RATE: f64 = 0.045;

/// Yearly maintenance as a share of the property price.
pub const ANNUAL_MAINTENANCE_RATE: f64 = 0.01;

/// Below this many years of stay, renting always wins.
pub const RENT_BELOW_YEARS: f64 = 3.0;

/// Above this many years of stay, buying always wins.
pub const BUY_ABOVE_YEARS: f64 = 5.0;

// ── LTV ──────────────────────────────────────────────────────────────────────

/// Adjustment made while enforcing the LTV cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LtvIssue {
    DownPaymentAdjustedToMeetLtv,
}

/// Result of [`enforce_ltv`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtvAssessment {
    pub loan_amount: f64,
    /// The down payment actually used, after any adjustment.
    pub down_payment: f64,
    pub issues: Vec<LtvIssue>,
    pub upfront_cost_estimate: f64,
}

/// Apply the 80 % LTV cap to a purchase.
///
/// A down payment below 20 % of the price is raised to exactly 20 % and
/// [`LtvIssue::DownPaymentAdjustedToMeetLtv`] is reported.
pub fn enforce_ltv(price: f64, down_payment: f64) -> Result<LtvAssessment, AdvisorError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(AdvisorError::invalid("property price must be positive"));
    }
    if !down_payment.is_finite() || down_payment < 0.0 {
        return Err(AdvisorError::invalid("down payment must not be negative"));
    }

    let minimum_down = price * (1.0 - MAX_LTV);
    let mut issues = Vec::new();
    let down_payment = if down_payment < minimum_down {
        issues.push(LtvIssue::DownPaymentAdjustedToMeetLtv);
        minimum_down
    } else {
        down_payment
    };

    Ok(LtvAssessment {
        loan_amount: (price - down_payment).max(0.0),
        down_payment,
        issues,
        upfront_cost_estimate: price * UPFRONT_COST_RATE,
    })
}

// ── EMI ──────────────────────────────────────────────────────────────────────

/// Result of [`calculate_emi`]. Interest and principal are for the first month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmiBreakdown {
    pub monthly_emi: f64,
    pub monthly_interest_portion: f64,
    pub monthly_principal_portion: f64,
    /// Tenure actually used, after clamping.
    pub tenure_years: u32,
    /// Annual rate actually used, after defaulting.
    pub annual_rate: f64,
}

/// Standard amortising monthly payment.
///
/// `tenure_years` is clamped to [`MAX_TENURE_YEARS`]; a missing or
/// non-positive `annual_rate` becomes [`DEFAULT_ANNUAL_RATE`].
pub fn calculate_emi(
    loan_amount: f64,
    annual_rate: Option<f64>,
    tenure_years: u32,
) -> Result<EmiBreakdown, AdvisorError> {
    if !loan_amount.is_finite() || loan_amount < 0.0 {
        return Err(AdvisorError::invalid("loan amount must not be negative"));
    }
    if tenure_years == 0 {
        return Err(AdvisorError::invalid("tenure must be at least one year"));
    }

    let tenure_years = tenure_years.min(MAX_TENURE_YEARS);
    let annual_rate = effective_rate(annual_rate);
    let r = annual_rate / 12.0;
    let n = f64::from(tenure_years * 12);

    let growth = (1.0 + r).powf(n);
    let monthly_emi = loan_amount * r * growth / (growth - 1.0);
    let monthly_interest_portion = loan_amount * r;

    Ok(EmiBreakdown {
        monthly_emi,
        monthly_interest_portion,
        monthly_principal_portion: monthly_emi - monthly_interest_portion,
        tenure_years,
        annual_rate,
    })
}

fn effective_rate(rate: Option<f64>) -> f64 {
    match rate {
        Some(r) if r.is_finite() && r > 0.0 => r,
        _ => DEFAULT_ANNUAL_RATE,
    }
}

// ── Buy vs rent ──────────────────────────────────────────────────────────────

/// Inputs to [`buy_vs_rent_recommendation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyVsRentInput {
    pub stay_years: f64,
    #[serde(default)]
    pub monthly_rent: f64,
    #[serde(default)]
    pub property_price: f64,
    /// Defaults to the 20 % minimum.
    #[serde(default)]
    pub down_payment: Option<f64>,
    #[serde(default)]
    pub annual_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Buy,
    Rent,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Recommendation::Buy => "buy",
            Recommendation::Rent => "rent",
        })
    }
}

/// Result of [`buy_vs_rent_recommendation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyVsRentResult {
    pub recommendation: Recommendation,
    pub reason: String,
    /// First-month interest plus maintenance; only computed for 3–5 year stays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_ownership_cost: Option<f64>,
}

/// Recommend buying or renting.
///
/// Under 3 years of stay always rents, over 5 years always buys. In between,
/// the first month's interest on the LTV-capped loan plus maintenance
/// (1 % of price per year) is compared with the rent.
pub fn buy_vs_rent_recommendation(input: &BuyVsRentInput) -> Result<BuyVsRentResult, AdvisorError> {
    let stay = input.stay_years;
    if !stay.is_finite() || stay < 0.0 {
        return Err(AdvisorError::invalid("stay duration must not be negative"));
    }

    if stay < RENT_BELOW_YEARS {
        return Ok(BuyVsRentResult {
            recommendation: Recommendation::Rent,
            reason: format!(
                "Staying under {RENT_BELOW_YEARS} years rarely recovers the ~7% upfront buying costs."
            ),
            monthly_ownership_cost: None,
        });
    }
    if stay > BUY_ABOVE_YEARS {
        return Ok(BuyVsRentResult {
            recommendation: Recommendation::Buy,
            reason: format!(
                "Over {BUY_ABOVE_YEARS} years, building equity usually beats paying rent."
            ),
            monthly_ownership_cost: None,
        });
    }

    if !input.monthly_rent.is_finite() || input.monthly_rent < 0.0 {
        return Err(AdvisorError::invalid("monthly rent must not be negative"));
    }
    let price = input.property_price;
    let down = input.down_payment.unwrap_or(price * (1.0 - MAX_LTV));
    let ltv = enforce_ltv(price, down)?;

    let interest = ltv.loan_amount * effective_rate(input.annual_rate) / 12.0;
    let maintenance = price * ANNUAL_MAINTENANCE_RATE / 12.0;
    let ownership = interest + maintenance;

    let (recommendation, reason) = if ownership < input.monthly_rent {
        (
            Recommendation::Buy,
            "Monthly interest plus maintenance is below your rent.".to_string(),
        )
    } else {
        (
            Recommendation::Rent,
            "Monthly interest plus maintenance is at or above your rent.".to_string(),
        )
    };

    Ok(BuyVsRentResult {
        recommendation,
        reason,
        monthly_ownership_cost: Some(ownership),
    })
}
