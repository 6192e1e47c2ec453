//! Validation gate: the last local check before text leaves the process.
//!
//! The gate does not trust the scrubber's own account of what it removed. It
//! re-detects the high-confidence PII shapes (IBAN, Emirates ID, UAE mobile,
//! email) with its own, structurally different patterns. A scrubber regression
//! (a mis-ordered rule, a pattern that stopped matching) therefore shows up as
//! a gate block instead of a leak.
//!
//! Only [`admit`] can produce a [`VerifiedText`], and the extraction stage
//! accepts nothing else. Ungated text cannot reach the reasoning model because
//! there is no value of the right type to hand it.

use crate::pipeline::scrub::{PiiKind, RedactedText};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

// Structurally different from the scrubber: IBANs either compact or in
// strict groups of four, any single separator inside an Emirates ID, mobiles
// delimited by any non-digit rather than a word boundary, and any non-space
// email local part.
static GATE_RULES: Lazy<Vec<(PiiKind, Regex)>> = Lazy::new(|| {
    [
        (PiiKind::Iban, r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b"),
        (
            PiiKind::Iban,
            r"\b[A-Z]{2}\d{2}(?:[ \-][A-Z0-9]{4}){2,7}(?:[ \-][A-Z0-9]{1,4})?\b",
        ),
        (PiiKind::NationalId, r"784\D?\d{4}\D?\d{7}\D?\d"),
        (
            PiiKind::Phone,
            r"(?:^|\D)(?:\+?971|0)?[\s\-]?5\d(?:[\s\-]?\d){7}(?:$|\D)",
        ),
        (
            PiiKind::Email,
            r"[^\s@\[\]<>()]+@[^\s@\[\]<>()]+\.[A-Za-z]{2,}",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| {
        (
            kind,
            Regex::new(pattern).expect("built-in gate pattern must compile"),
        )
    })
    .collect()
});

/// Every real BBAN carries at least this many digits; upper-case words
/// after a short code do not.
const MIN_IBAN_BBAN_DIGITS: usize = 10;

fn fires(kind: PiiKind, re: &Regex, text: &str) -> bool {
    match kind {
        PiiKind::Iban => re.find_iter(text).any(|m| {
            m.as_str()
                .bytes()
                .skip(4)
                .filter(u8::is_ascii_digit)
                .count()
                >= MIN_IBAN_BBAN_DIGITS
        }),
        _ => re.is_match(text),
    }
}

/// The gate's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    /// Kinds that triggered a block, in gate order, without duplicates.
    /// Empty when `passed`.
    pub triggered: Vec<PiiKind>,
}

impl ValidationResult {
    pub fn is_blocked(&self) -> bool {
        !self.passed
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            return f.write_str("pass");
        }
        let kinds: Vec<&str> = self.triggered.iter().map(|k| k.label()).collect();
        write!(f, "block ({})", kinds.join(", "))
    }
}

/// Redacted text that has passed the gate.
///
/// The constructor is private to this module: [`admit`] is the only way in.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifiedText(String);

impl VerifiedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for VerifiedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifiedText({} bytes)", self.0.len())
    }
}

/// Pure predicate: does any high-confidence PII shape remain in `text`?
///
/// Idempotent and side-effect free; the same text always gets the same
/// verdict.
pub fn validate(text: &str) -> ValidationResult {
    let mut triggered: Vec<PiiKind> = GATE_RULES
        .iter()
        .filter(|(kind, re)| fires(*kind, re, text))
        .map(|(kind, _)| *kind)
        .collect();
    triggered.dedup();

    ValidationResult {
        passed: triggered.is_empty(),
        triggered,
    }
}

/// Run the gate and, on pass, promote the text to [`VerifiedText`].
pub fn admit(text: RedactedText) -> Result<VerifiedText, ValidationResult> {
    let verdict = validate(text.as_str());
    if verdict.passed {
        Ok(VerifiedText(text.into_string()))
    } else {
        Err(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked_by(text: &str) -> Vec<PiiKind> {
        validate(text).triggered
    }

    #[test]
    fn placeholders_pass() {
        let text = "Name: [REDACTED_NAME], IBAN: [REDACTED_IBAN], salary AED 15,000\n\
                    Emirates ID [REDACTED_EMIRATES_ID] Mobile [REDACTED_PHONE] \
                    Email [REDACTED_EMAIL] Passport [REDACTED_PASSPORT]";
        let verdict = validate(text);
        assert!(verdict.passed, "got: {verdict}");
        assert!(verdict.triggered.is_empty());
    }

    #[test]
    fn empty_text_passes() {
        assert!(validate("").passed);
    }

    #[test]
    fn plain_salary_lines_pass() {
        let text = "Basic Salary: AED 15,000.00\nHousing: 5,000\nTotal: 20,000\nDate 25/06/2024";
        assert!(validate(text).passed);
    }

    #[test]
    fn blocks_iban() {
        assert_eq!(blocked_by("AE070331234567890123456"), vec![PiiKind::Iban]);
        assert_eq!(
            blocked_by("acct AE07-0331-2345-6789-0123-456"),
            vec![PiiKind::Iban]
        );
    }

    #[test]
    fn blocks_grouped_iban_with_trailing_digits() {
        assert_eq!(
            blocked_by("Pay to AE07 0331 2345 6789 0123 456 monthly"),
            vec![PiiKind::Iban]
        );
    }

    #[test]
    fn short_codes_before_capitalised_words_pass() {
        for line in [
            "GRADE PG12 SENIOR SOFTWARE ENGINEER",
            "FY24 SALARY CERTIFICATE",
            "DEPT HR01 HUMAN RESOURCES DIVISION",
        ] {
            let verdict = validate(line);
            assert!(verdict.passed, "{line}: {verdict}");
        }
    }

    #[test]
    fn blocks_national_id() {
        assert_eq!(blocked_by("784-1990-1234567-1"), vec![PiiKind::NationalId]);
        assert_eq!(blocked_by("id 784199012345671"), vec![PiiKind::NationalId]);
        assert_eq!(blocked_by("784/1990/1234567/1"), vec![PiiKind::NationalId]);
    }

    #[test]
    fn blocks_mobile() {
        for phone in ["0501234567", "+971 50 123 4567", "971-55-123-4567", "56 123 4567"] {
            assert_eq!(
                blocked_by(&format!("call {phone} today")),
                vec![PiiKind::Phone],
                "input: {phone}"
            );
        }
    }

    #[test]
    fn blocks_email() {
        assert_eq!(blocked_by("hr@company.ae"), vec![PiiKind::Email]);
    }

    #[test]
    fn reports_every_kind_in_order() {
        let verdict = validate("x@y.com 0501234567 AE070331234567890123456");
        assert!(verdict.is_blocked());
        assert_eq!(
            verdict.triggered,
            vec![PiiKind::Iban, PiiKind::Phone, PiiKind::Email]
        );
        assert_eq!(verdict.to_string(), "block (iban, phone, email)");
    }

    #[test]
    fn verdict_is_idempotent() {
        let text = "IBAN AE070331234567890123456";
        assert_eq!(validate(text), validate(text));
    }
}
