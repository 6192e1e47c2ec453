//! Stage 4: structured extraction and response parsing.
//!
//! [`SalaryExtractor::extract`] takes a [`VerifiedText`], which only the
//! validation gate can produce. The reasoning model is therefore unreachable
//! with text that has not passed the gate; no runtime check is needed for it.
//!
//! Parsing is deliberately forgiving about the envelope (models like to wrap
//! JSON in prose or code fences) and strict about the content (negative
//! amounts or non-numeric values are a broken contract).

use crate::error::{FailureReason, StageError};
use crate::pipeline::gate::VerifiedText;
use crate::pipeline::llm::{ChatTurn, LlmBackend};
use crate::prompts::{extraction_user_message, EXTRACTION_SYSTEM_PROMPT};
use crate::salary::{Allowance, SalaryExtraction, DEFAULT_CURRENCY};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Sends gate-approved text to a reasoning model and returns its raw answer.
#[async_trait]
pub trait SalaryExtractor: Send + Sync {
    async fn extract(&self, text: &VerifiedText) -> Result<String, StageError>;

    fn is_configured(&self) -> bool {
        true
    }
}

/// [`SalaryExtractor`] backed by a chat model.
#[derive(Debug, Clone)]
pub struct LlmSalaryExtractor {
    backend: LlmBackend,
}

impl LlmSalaryExtractor {
    pub fn new(backend: LlmBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SalaryExtractor for LlmSalaryExtractor {
    async fn extract(&self, text: &VerifiedText) -> Result<String, StageError> {
        let turns = [
            ChatTurn::system(EXTRACTION_SYSTEM_PROMPT),
            ChatTurn::user(extraction_user_message(text.as_str())),
        ];
        self.backend.call_turns(&turns).await
    }

    fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }
}

/// What the model said about the document.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedExtraction {
    Salary(SalaryExtraction),
    NotSalaryDocument,
}

/// End index (exclusive) of the balanced `{...}` starting at `start`.
///
/// Braces inside JSON strings, including escaped quotes, are ignored.
fn balanced_object_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Locate the first balanced substring that parses as a JSON object.
///
/// Surrounding prose and Markdown fences are skipped. A balanced `{...}`
/// that is not valid JSON (e.g. `{placeholder}` in prose) is passed over.
pub fn find_first_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'{')
        .find_map(|(start, _)| {
            let end = balanced_object_end(bytes, start)?;
            let candidate = &text[start..end];
            match serde_json::from_str::<Value>(candidate) {
                Ok(Value::Object(_)) => Some(candidate),
                _ => None,
            }
        })
}

// "AED 15,000.00", "15000", "Dhs. 1,250.5", "$ 900", "12,000 AED"
static AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:[A-Za-z]{1,4}\.?|[$€£])?\s*(-?[0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:[A-Za-z]{1,4}\.?)?\s*$",
    )
    .expect("amount pattern must compile")
});

/// Read one amount: a JSON number or a numeric string. Must be non-negative.
fn parse_amount(value: &Value) -> Result<Option<f64>, FailureReason> {
    let amount = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64().ok_or(FailureReason::MalformedModelOutput)?,
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => {
            let caps = AMOUNT
                .captures(s)
                .ok_or(FailureReason::MalformedModelOutput)?;
            caps[1]
                .replace(',', "")
                .parse::<f64>()
                .map_err(|_| FailureReason::MalformedModelOutput)?
        }
        _ => return Err(FailureReason::MalformedModelOutput),
    };

    if !amount.is_finite() || amount < 0.0 {
        return Err(FailureReason::MalformedModelOutput);
    }
    Ok(Some(amount))
}

fn field(obj: &Map<String, Value>, key: &str) -> Result<Option<f64>, FailureReason> {
    obj.get(key).map_or(Ok(None), parse_amount)
}

fn parse_allowances(value: Option<&Value>) -> Result<Vec<Allowance>, FailureReason> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(FailureReason::MalformedModelOutput),
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let obj = item.as_object().ok_or(FailureReason::MalformedModelOutput)?;
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(FailureReason::MalformedModelOutput)?;
        // An allowance the model could not price carries no information.
        if let Some(amount) = field(obj, "amount")? {
            out.push(Allowance {
                name: name.to_string(),
                amount,
            });
        }
    }
    Ok(out)
}

fn is_not_salary_marker(obj: &Map<String, Value>) -> bool {
    obj.get("isSalaryDocument") == Some(&Value::Bool(false))
        || obj.get("notASalaryDocument") == Some(&Value::Bool(true))
}

/// Map the model's currency label to a three-letter ISO code.
///
/// Local dirham spellings become `AED`; anything else that is not already a
/// three-letter code falls back to [`DEFAULT_CURRENCY`].
fn normalize_currency(raw: Option<&str>) -> String {
    let code = raw
        .unwrap_or_default()
        .trim()
        .trim_end_matches('.')
        .to_ascii_uppercase();
    let is_iso = code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase());
    if is_iso && code != "DHS" {
        code
    } else {
        DEFAULT_CURRENCY.to_string()
    }
}

/// Parse the reasoning model's answer.
///
/// Fails with [`FailureReason::MalformedModelOutput`] when no JSON object is
/// present or a field breaks the schema.
pub fn parse_extraction(response: &str) -> Result<ParsedExtraction, FailureReason> {
    let json = find_first_json_object(response).ok_or(FailureReason::MalformedModelOutput)?;
    let value: Value =
        serde_json::from_str(json).map_err(|_| FailureReason::MalformedModelOutput)?;
    let obj = value
        .as_object()
        .ok_or(FailureReason::MalformedModelOutput)?;

    if is_not_salary_marker(obj) {
        return Ok(ParsedExtraction::NotSalaryDocument);
    }

    let currency = normalize_currency(obj.get("currency").and_then(Value::as_str));

    Ok(ParsedExtraction::Salary(SalaryExtraction {
        basic_salary: field(obj, "basicSalary")?,
        housing_allowance: field(obj, "housingAllowance")?,
        transportation_allowance: field(obj, "transportationAllowance")?,
        other_allowances: parse_allowances(obj.get("otherAllowances"))?,
        total_gross_salary: field(obj, "totalGrossSalary")?,
        deductions: field(obj, "deductions")?,
        net_salary: field(obj, "netSalary")?,
        currency,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salary(response: &str) -> SalaryExtraction {
        match parse_extraction(response) {
            Ok(ParsedExtraction::Salary(s)) => s,
            other => panic!("expected salary, got {other:?}"),
        }
    }

    #[test]
    fn finds_object_inside_prose() {
        let text = "Sure! Here is the data:\n```json\n{\"basicSalary\": 15000}\n```\nHope it helps.";
        assert_eq!(find_first_json_object(text), Some("{\"basicSalary\": 15000}"));
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let text = r#"{"note": "a } brace and \"quote {", "n": 1} trailing"#;
        assert_eq!(
            find_first_json_object(text),
            Some(r#"{"note": "a } brace and \"quote {", "n": 1}"#)
        );
    }

    #[test]
    fn nested_objects_are_kept_whole() {
        let text = r#"x {"a": {"b": {}}, "c": [1, {"d": 2}]} y"#;
        assert_eq!(
            find_first_json_object(text),
            Some(r#"{"a": {"b": {}}, "c": [1, {"d": 2}]}"#)
        );
    }

    #[test]
    fn skips_non_json_braces() {
        let text = r#"Replace {name} first. {"netSalary": 9000}"#;
        assert_eq!(find_first_json_object(text), Some(r#"{"netSalary": 9000}"#));
    }

    #[test]
    fn no_object_is_malformed() {
        assert_eq!(
            parse_extraction("I could not read the document."),
            Err(FailureReason::MalformedModelOutput)
        );
        assert_eq!(
            parse_extraction("{\"basicSalary\": 1"),
            Err(FailureReason::MalformedModelOutput)
        );
    }

    #[test]
    fn parses_full_schema() {
        let s = salary(
            r#"{
                "basicSalary": 15000,
                "housingAllowance": 5000,
                "transportationAllowance": 1500,
                "otherAllowances": [{"name": "Phone", "amount": 300}],
                "totalGrossSalary": 21800,
                "deductions": 800,
                "netSalary": 21000,
                "currency": "aed"
            }"#,
        );
        assert_eq!(s.basic_salary, Some(15_000.0));
        assert_eq!(s.other_allowances.len(), 1);
        assert_eq!(s.other_allowances[0].name, "Phone");
        assert_eq!(s.net_salary, Some(21_000.0));
        assert_eq!(s.currency, "AED");
    }

    #[test]
    fn absent_fields_stay_absent() {
        let s = salary(r#"{"basicSalary": 12000, "housingAllowance": null}"#);
        assert_eq!(s.basic_salary, Some(12_000.0));
        assert_eq!(s.housing_allowance, None);
        assert_eq!(s.deductions, None);
        assert_eq!(s.currency, DEFAULT_CURRENCY);
    }

    #[test]
    fn currency_is_always_a_three_letter_code() {
        for (label, expected) in [
            ("Dhs.", "AED"),
            ("DH", "AED"),
            ("Dirhams", "AED"),
            ("AED.", "AED"),
            ("usd", "USD"),
            (" gbp ", "GBP"),
            ("US Dollars", "AED"),
            ("", "AED"),
        ] {
            let json = serde_json::json!({"netSalary": 15000, "currency": label}).to_string();
            assert_eq!(salary(&json).currency, expected, "label: {label:?}");
        }
    }

    #[test]
    fn zero_is_preserved() {
        let s = salary(r#"{"deductions": 0, "basicSalary": 5000}"#);
        assert_eq!(s.deductions, Some(0.0));
    }

    #[test]
    fn lenient_string_amounts() {
        let s = salary(
            r#"{"basicSalary": "AED 15,000.00", "netSalary": "12,500 AED", "deductions": "Dhs. 250"}"#,
        );
        assert_eq!(s.basic_salary, Some(15_000.0));
        assert_eq!(s.net_salary, Some(12_500.0));
        assert_eq!(s.deductions, Some(250.0));
    }

    #[test]
    fn negative_or_garbage_amounts_are_malformed() {
        for bad in [
            r#"{"basicSalary": -100}"#,
            r#"{"netSalary": "-5,000"}"#,
            r#"{"netSalary": "about fifteen thousand"}"#,
            r#"{"netSalary": true}"#,
            r#"{"otherAllowances": "none"}"#,
            r#"{"otherAllowances": [{"amount": 100}]}"#,
        ] {
            assert_eq!(
                parse_extraction(bad),
                Err(FailureReason::MalformedModelOutput),
                "input: {bad}"
            );
        }
    }

    #[test]
    fn not_salary_markers() {
        assert_eq!(
            parse_extraction(r#"{"isSalaryDocument": false}"#),
            Ok(ParsedExtraction::NotSalaryDocument)
        );
        assert_eq!(
            parse_extraction(r#"This is a utility bill. {"notASalaryDocument": true}"#),
            Ok(ParsedExtraction::NotSalaryDocument)
        );
        // true marker on a real payslip is not a rejection
        let s = salary(r#"{"isSalaryDocument": true, "basicSalary": 7000}"#);
        assert_eq!(s.basic_salary, Some(7_000.0));
    }
}
