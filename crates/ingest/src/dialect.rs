use std::collections::HashMap;

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;

use interunit_core::StatementPeriod;

use crate::error::IngestError;

/// Export conventions of one accounting package: how its workbooks label
/// the header row, the statement period, the two counterparties, and the
/// operator annotations. Swapping the implementation adds a new export
/// format without touching the matcher or lifecycle manager.
pub trait LedgerDialect {
    /// Cell values that must all appear in a row for it to be the header.
    fn required_headers(&self) -> &[&str];

    /// Statement period from one metadata cell.
    fn extract_period(&self, cell: &str) -> Option<StatementPeriod>;

    /// Identity of the unit the export belongs to.
    fn extract_lender(&self, cell: &str) -> Option<String>;

    /// Identity of the counterparty account, canonicalized.
    fn extract_borrower(&self, cell: &str) -> Option<String>;

    /// When the cell carries the operator annotation marker, returns the
    /// text after it (may be empty when the name sits in a later cell).
    fn entered_by(&self, cell: &str) -> Option<String>;

    /// Opening/closing balance rows, which are never transactions.
    fn is_balance_row(&self, particulars: &str) -> bool;

    /// Date formats this package emits, tried in order.
    fn date_formats(&self) -> &[&str];
}

/// Dialect of Tally ledger exports.
pub struct TallyDialect {
    period: Regex,
    lender: Regex,
    borrower: Regex,
    borrower_unit_suffix: Regex,
    entered_by: Regex,
    aliases: HashMap<String, String>,
}

const REQUIRED_HEADERS: &[&str] =
    &["Date", "Particulars", "Vch Type", "Vch No.", "Debit", "Credit"];

const DATE_FORMATS: &[&str] = &["%d-%b-%Y", "%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];

#[derive(Deserialize)]
struct DialectConfig {
    #[serde(default)]
    aliases: HashMap<String, String>,
}

impl TallyDialect {
    pub fn new() -> Self {
        let mut aliases = HashMap::new();
        aliases.insert("Geo Textile".to_string(), "GeoTex".to_string());
        Self::with_aliases(aliases)
    }

    pub fn with_aliases(aliases: HashMap<String, String>) -> Self {
        TallyDialect {
            period: pattern(r"(\d{1,2}-[A-Za-z]{3}-\d{4})\s*to\s*(\d{1,2}-[A-Za-z]{3}-\d{4})"),
            lender: pattern(r"Unit\s*:?[\s)]*([^)]+)"),
            borrower: pattern(r"A/C-([\w\s&.()/-]+)"),
            borrower_unit_suffix: pattern(r"\s*[Uu]nit\.?\s*$"),
            entered_by: pattern(r"(?i)entered by\s*:\s*(.*)"),
            aliases,
        }
    }

    /// Loads the counterparty alias table from TOML:
    ///
    /// ```toml
    /// [aliases]
    /// "Geo Textile" = "GeoTex"
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, IngestError> {
        let config: DialectConfig =
            toml::from_str(content).map_err(|e| IngestError::InvalidDialect(e.to_string()))?;
        Ok(Self::with_aliases(config.aliases))
    }
}

impl Default for TallyDialect {
    fn default() -> Self {
        Self::new()
    }
}

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("hard-coded dialect pattern")
}

impl LedgerDialect for TallyDialect {
    fn required_headers(&self) -> &[&str] {
        REQUIRED_HEADERS
    }

    fn extract_period(&self, cell: &str) -> Option<StatementPeriod> {
        let caps = self.period.captures(cell)?;
        let start = NaiveDate::parse_from_str(&caps[1], "%d-%b-%Y").ok()?;
        let end = NaiveDate::parse_from_str(&caps[2], "%d-%b-%Y").ok()?;
        Some(StatementPeriod::new(start, end))
    }

    fn extract_lender(&self, cell: &str) -> Option<String> {
        let caps = self.lender.captures(cell)?;
        Some(caps[1].trim().to_string())
    }

    fn extract_borrower(&self, cell: &str) -> Option<String> {
        let caps = self.borrower.captures(cell)?;
        let trimmed = caps[1].trim();
        let stripped = self.borrower_unit_suffix.replace(trimmed, "");
        let name = stripped.trim();
        let canonical = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        Some(canonical.to_string())
    }

    fn entered_by(&self, cell: &str) -> Option<String> {
        if !cell.to_lowercase().contains("entered by :") {
            return None;
        }
        let tail = self
            .entered_by
            .captures(cell)
            .map(|caps| caps[1].trim().to_string())
            .unwrap_or_default();
        Some(tail)
    }

    fn is_balance_row(&self, particulars: &str) -> bool {
        let lowered = particulars.trim().to_lowercase();
        lowered == "opening balance" || lowered.starts_with("closing balance")
    }

    fn date_formats(&self) -> &[&str] {
        DATE_FORMATS
    }
}
