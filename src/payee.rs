//! Payee normalization.
//!
//! Bank statements put a lot of noise in the counterparty field: masked card
//! numbers, terminal ids, timestamps and the original amount of foreign
//! currency purchases. The helpers here reduce that to something a budgeting
//! tool can match payees on.

use std::sync::LazyLock;

use regex::Regex;

/// Marker that identifies a masked card number (`516050xxxxxx5888`)
const MASKED_PAN: &str = "xxxxxx";

/// Phrase that starts the trailing metadata of card purchases
const TRAILING_MARKER: &str = " Eredeti";

static NON_LETTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}]+").expect("valid regex"));

static SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {3,}").expect("valid regex"));

/// Collapse every run of non-letter characters into a single space and trim.
pub fn normalize(payee: &str) -> String {
    NON_LETTERS.replace_all(payee, " ").trim().to_string()
}

/// Extract the merchant out of a card purchase line.
///
/// Statements of card purchases look like
/// `516050xxxxxx5888 Purchase 2024.01.12   SPAR MAGYARORSZAG KFT.   Eredeti össz: 2085.00HUF`
/// where the merchant sits between two runs of three or more spaces. If the
/// separators are missing the input is returned trimmed.
pub fn extract_merchant(payee: &str) -> String {
    let mut segments = SEPARATOR.split(payee);
    let (Some(_), Some(merchant)) = (segments.next(), segments.next()) else {
        return payee.trim().to_string();
    };

    merchant
        .split(TRAILING_MARKER)
        .next()
        .unwrap_or(merchant)
        .trim()
        .to_string()
}

/// Produces the payee of mapped transactions
#[derive(Debug, Clone, Default)]
pub struct PayeeSanitizer {
    masked_card: bool,
}

impl PayeeSanitizer {
    /// Create a sanitizer, optionally enabling the masked card heuristic
    pub fn new(masked_card: bool) -> Self {
        Self { masked_card }
    }

    pub fn sanitize(&self, payee: &str) -> String {
        if self.masked_card && payee.contains(MASKED_PAN) {
            return extract_merchant(payee);
        }
        normalize(payee)
    }
}

/// Configured patterns removed from every payee as a final pass
#[derive(Debug, Clone, Default)]
pub struct PayeeStrip {
    patterns: Vec<Regex>,
}

impl PayeeStrip {
    /// Compile the given patterns.
    ///
    /// # Errors
    /// Returns an error if one of the patterns is not a valid regular expression.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .filter(|p| !p.as_ref().is_empty())
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn apply(&self, payee: &str) -> String {
        if self.is_empty() {
            return payee.to_string();
        }
        self.patterns
            .iter()
            .fold(payee.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
            .trim()
            .to_string()
    }
}
