use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of structured reference embedded in a narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReferenceKind {
    Po,
    Lc,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Po => write!(f, "PO"),
            ReferenceKind::Lc => write!(f, "LC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub value: String,
}

/// Pulls purchase-order and letter-of-credit identifiers out of free-text
/// narration. First match wins within one narration.
pub struct ReferenceExtractor {
    po: Regex,
    lc: Regex,
}

impl ReferenceExtractor {
    pub fn new() -> Self {
        ReferenceExtractor {
            po: Regex::new(r"[A-Z]+/PO/\d+/\d+/\d+").expect("hard-coded PO pattern"),
            lc: Regex::new(r"L/C-\d+(?:/\d+)+").expect("hard-coded LC pattern"),
        }
    }

    pub fn po(&self, particulars: &str) -> Option<String> {
        self.po.find(particulars).map(|m| m.as_str().to_string())
    }

    pub fn lc(&self, particulars: &str) -> Option<String> {
        self.lc.find(particulars).map(|m| m.as_str().to_string())
    }
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self::new()
    }
}
