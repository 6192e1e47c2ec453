//! PII scrubbing: deterministic redaction of OCR text before any model sees it.
//!
//! OCR output is untrusted. A salary certificate routinely carries the
//! employee's name, IBAN, Emirates ID, passport number, phone and email. None
//! of that is needed to read salary figures, so this module replaces each of
//! them with a typed placeholder such as `[REDACTED_IBAN]`.
//!
//! Everything here is local and pure: regexes compiled once into a static
//! table, no network, no randomness, no hidden state. Same input, same output.
//!
//! ## Rule Order
//!
//! Rules run in a fixed order and each pass sees the previous pass's output,
//! so a span that has been replaced can never be re-matched by a later,
//! broader rule:
//!
//! 1. IBAN: labeled `IBAN:` codes, then country-code-prefixed digit groups
//! 2. Passport-shaped tokens (1–2 capitals + 6–9 digits)
//! 3. Emirates ID (`784-YYYY-NNNNNNN-C`)
//! 4. Email addresses
//! 5. Phone numbers: UAE mobile, then `+`-prefixed international
//! 6. Honorific + capitalised words (`Mr John Smith`)
//! 7. Labeled names (`Employee Name: John Smith`), label kept
//!
//! IBAN must precede the passport rule: `AE07 0331 …` starts with two
//! capitals followed by digits, and once the passport rule has eaten a
//! prefix the IBAN rule can no longer see the whole account number.
//!
//! The passport rule also hits unrelated codes such as `AB1234567` reference
//! numbers. That over-redaction is accepted: a false positive costs a field,
//! a false negative leaks an identity document.
//!
//! Placeholders are upper-case words joined by `_` inside brackets. None of
//! the rules can match them, which is what makes scrubbing idempotent.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Category of personally identifiable information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Iban,
    Passport,
    NationalId,
    Email,
    Phone,
    Name,
}

impl PiiKind {
    /// The token that replaces a matched span.
    pub fn placeholder(self) -> &'static str {
        match self {
            PiiKind::Iban => "[REDACTED_IBAN]",
            PiiKind::Passport => "[REDACTED_PASSPORT]",
            PiiKind::NationalId => "[REDACTED_EMIRATES_ID]",
            PiiKind::Email => "[REDACTED_EMAIL]",
            PiiKind::Phone => "[REDACTED_PHONE]",
            PiiKind::Name => "[REDACTED_NAME]",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PiiKind::Iban => "iban",
            PiiKind::Passport => "passport",
            PiiKind::NationalId => "national_id",
            PiiKind::Email => "email",
            PiiKind::Phone => "phone",
            PiiKind::Name => "name",
        }
    }
}

impl fmt::Display for PiiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What survives of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keep {
    /// The whole match becomes the placeholder.
    Nothing,
    /// Capture group 1 (a field label) is kept, the rest becomes the placeholder.
    Label,
}

/// One `(kind, pattern)` rule of a [`PiiPatternSet`].
#[derive(Debug, Clone)]
pub struct PiiRule {
    kind: PiiKind,
    regex: Regex,
    keep: Keep,
    /// Matches with fewer digits than this are left untouched.
    min_digits: usize,
}

impl PiiRule {
    fn new(kind: PiiKind, pattern: &str, keep: Keep) -> Self {
        Self {
            kind,
            // Patterns are literals below; a typo must fail the first test run.
            regex: Regex::new(pattern).expect("built-in PII pattern must compile"),
            keep,
            min_digits: 0,
        }
    }

    fn with_min_digits(mut self, min_digits: usize) -> Self {
        self.min_digits = min_digits;
        self
    }

    pub fn kind(&self) -> PiiKind {
        self.kind
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Replace every match in `input`, returning the new text and the hit count.
    fn apply<'t>(&self, input: &'t str) -> (Cow<'t, str>, usize) {
        let mut hits = 0usize;
        let placeholder = self.kind.placeholder();
        let out = self.regex.replace_all(input, |caps: &Captures<'_>| {
            let digits = caps[0].bytes().filter(u8::is_ascii_digit).count();
            if digits < self.min_digits {
                return caps[0].to_string();
            }
            hits += 1;
            match self.keep {
                Keep::Nothing => placeholder.to_string(),
                Keep::Label => format!("{}{}", &caps[1], placeholder),
            }
        });
        (out, hits)
    }
}

/// Ordered rule table. Built once, shared read-only by every request.
#[derive(Debug, Clone)]
pub struct PiiPatternSet {
    rules: Vec<PiiRule>,
}

impl PiiPatternSet {
    /// The production rule table.
    pub fn standard() -> &'static PiiPatternSet {
        &STANDARD_PATTERNS
    }

    /// A copy of this set with every rule of `kind` removed.
    ///
    /// Exists so the validation gate can be exercised against a scrubber that
    /// misses a category.
    pub fn without(&self, kind: PiiKind) -> PiiPatternSet {
        PiiPatternSet {
            rules: self
                .rules
                .iter()
                .filter(|r| r.kind != kind)
                .cloned()
                .collect(),
        }
    }

    pub fn rules(&self) -> &[PiiRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ── Rule 1: IBAN ─────────────────────────────────────────────────────────────

const IBAN_LABELED: &str =
    r"((?i)\bIBAN(?:[ \t]+(?:no\.?|number))?[ \t]*[:#]?[ \t]*)[A-Z0-9]{2}(?:[ ]?[A-Z0-9]){8,32}";

const IBAN_SHAPE: &str = r"\b[A-Z]{2}[0-9]{2}(?:[ ]?[0-9]){10,30}\b";

// ── Rule 2: Passport numbers ─────────────────────────────────────────────────

const PASSPORT: &str = r"\b[A-Z]{1,2}[0-9]{6,9}\b";

// ── Rule 3: Emirates ID ──────────────────────────────────────────────────────

const EMIRATES_ID: &str = r"\b784[- ]?[0-9]{4}[- ]?[0-9]{7}[- ]?[0-9]\b";

// ── Rule 4: Email addresses ──────────────────────────────────────────────────

const EMAIL: &str = r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b";

// ── Rule 5: Phone numbers ────────────────────────────────────────────────────
//
// UAE mobiles are `5X XXX XXXX` with an optional `0`, `971`, `+971` or
// `00971` prefix. The leading `(?:\+|\b)` keeps the rule from firing inside
// a longer digit run such as an account number.

const UAE_MOBILE: &str =
    r"(?:\+|\b)(?:(?:00)?971[- ]?|0)?5[0-9][- ]?[0-9]{3}[- ]?[0-9]{4}\b";

// Single-digit groups cover landline area codes (`+971 4 …`). Short runs
// such as `+1 500` fall below the digit minimum.
const INTERNATIONAL_PHONE: &str = r"\+[0-9]{1,3}(?:[- ]?\(?[0-9]{1,4}\)?){2,5}\b";
const INTERNATIONAL_PHONE_MIN_DIGITS: usize = 7;

// ── Rule 6: Honorific + name ─────────────────────────────────────────────────
//
// A name word is a capitalised word or a single initial (`A`, `A.`).

const HONORIFIC_NAME: &str = r"\b(?:Mrs|Mr|Ms|Miss|Mx|Dr|Prof|Sheikha|Sheikh|Sayed|Eng)\.?[ \t]+[A-Z](?:[a-z'\-]+|\.|\b)(?:[ \t]+[A-Z](?:[a-z'\-]+|\.|\b))*";

// ── Rule 7: Labeled name fields ──────────────────────────────────────────────

const LABELED_NAME: &str = r"((?i)\b(?:(?:employee|full|customer|beneficiary|applicant|account[ \t]+holder)[ \t]+)?name(?:[ \t]*[:\-][ \t]*|[ \t]+))[A-Z](?:[a-z'\-]+|\.|\b)(?:[ \t]+[A-Z](?:[a-z'\-]+|\.|\b))*";

static STANDARD_PATTERNS: Lazy<PiiPatternSet> = Lazy::new(|| PiiPatternSet {
    rules: vec![
        PiiRule::new(PiiKind::Iban, IBAN_LABELED, Keep::Label),
        PiiRule::new(PiiKind::Iban, IBAN_SHAPE, Keep::Nothing),
        PiiRule::new(PiiKind::Passport, PASSPORT, Keep::Nothing),
        PiiRule::new(PiiKind::NationalId, EMIRATES_ID, Keep::Nothing),
        PiiRule::new(PiiKind::Email, EMAIL, Keep::Nothing),
        PiiRule::new(PiiKind::Phone, UAE_MOBILE, Keep::Nothing),
        PiiRule::new(PiiKind::Phone, INTERNATIONAL_PHONE, Keep::Nothing)
            .with_min_digits(INTERNATIONAL_PHONE_MIN_DIGITS),
        PiiRule::new(PiiKind::Name, HONORIFIC_NAME, Keep::Nothing),
        PiiRule::new(PiiKind::Name, LABELED_NAME, Keep::Label),
    ],
});

// ── Text types ───────────────────────────────────────────────────────────────

/// Unstructured text as returned by the OCR stage. Untrusted.
#[derive(Clone, PartialEq, Eq)]
pub struct RawExtractedText(String);

impl RawExtractedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when OCR produced nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Debug never prints the content: it is raw PII until scrubbed.
impl fmt::Debug for RawExtractedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawExtractedText({} bytes)", self.0.len())
    }
}

/// Scrubber output. Only a [`Scrubber`] can produce one.
#[derive(Clone, PartialEq, Eq)]
pub struct RedactedText(String);

impl RedactedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RedactedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RedactedText({} bytes)", self.0.len())
    }
}

impl AsRef<str> for RedactedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of one scrub: the redacted text and how many spans of each kind
/// were replaced. Counts are safe to log; the text is not.
#[derive(Debug, Clone)]
pub struct Redaction {
    pub text: RedactedText,
    pub counts: BTreeMap<PiiKind, usize>,
}

impl Redaction {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

// ── Scrubber ─────────────────────────────────────────────────────────────────

/// Applies a [`PiiPatternSet`] in order.
#[derive(Debug, Clone)]
pub struct Scrubber {
    patterns: Cow<'static, PiiPatternSet>,
}

impl Default for Scrubber {
    fn default() -> Self {
        Self {
            patterns: Cow::Borrowed(PiiPatternSet::standard()),
        }
    }
}

impl Scrubber {
    /// A scrubber over a caller-supplied rule table.
    pub fn with_patterns(patterns: PiiPatternSet) -> Self {
        Self {
            patterns: Cow::Owned(patterns),
        }
    }

    pub fn patterns(&self) -> &PiiPatternSet {
        &self.patterns
    }

    /// Redact every PII span in `raw`.
    pub fn scrub(&self, raw: &RawExtractedText) -> Redaction {
        let (text, counts) = self.scrub_str(raw.as_str());
        Redaction {
            text: RedactedText(text),
            counts,
        }
    }

    fn scrub_str(&self, input: &str) -> (String, BTreeMap<PiiKind, usize>) {
        let mut counts = BTreeMap::new();
        if input.is_empty() {
            return (String::new(), counts);
        }

        let mut current = input.to_string();
        for rule in self.patterns.rules() {
            let (next, hits) = rule.apply(&current);
            if hits > 0 {
                *counts.entry(rule.kind()).or_insert(0) += hits;
                current = next.into_owned();
            }
        }
        (current, counts)
    }
}

/// Scrub free text with the standard rule table.
///
/// Used for chat messages, which never pass through OCR.
pub fn scrub_text(input: &str) -> String {
    Scrubber::default().scrub_str(input).0
}

// ── Tests ────────────────────────────────────────────────────────────────────
