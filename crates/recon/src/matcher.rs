use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use interunit_core::Transaction;

use crate::reference::{ReferenceExtractor, ReferenceKind};

/// Which ledger side represents funds advanced. Export formattings
/// disagree, so the convention is an explicit choice, never inferred
/// from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoleConvention {
    /// Debit entries advance funds (the hardened default).
    #[default]
    DebitLends,
    /// Credit entries advance funds.
    CreditLends,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MatchConfig {
    #[serde(default)]
    pub convention: RoleConvention,
}

/// One candidate pairing of a lender-side and a borrower-side entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub lender_uid: String,
    pub borrower_uid: String,
    pub amount: Decimal,
    pub kind: ReferenceKind,
    pub reference: String,
}

/// Exact-value candidate matcher over one batch of unmatched entries.
///
/// A pair matches iff the advanced and received amounts are exactly equal
/// and the narrations carry an equal structured reference of the same
/// kind, PO taking priority over LC. No tolerance band, no text fallback.
pub struct Matcher {
    config: MatchConfig,
    extractor: ReferenceExtractor,
}

struct Side<'a> {
    tx: &'a Transaction,
    amount: Decimal,
    po: Option<String>,
    lc: Option<String>,
}

impl Matcher {
    pub fn new(config: MatchConfig) -> Self {
        Matcher {
            config,
            extractor: ReferenceExtractor::new(),
        }
    }

    /// Evaluates the full lender-side × borrower-side cross product.
    /// Quadratic in the batch, which stays within per-statement-period
    /// sizes; replace with an (amount, reference) index if batches grow.
    pub fn find_matches(&self, batch: &[Transaction]) -> Vec<CandidateMatch> {
        let lenders: Vec<Side<'_>> = batch
            .iter()
            .filter_map(|tx| self.side(tx, self.advanced(tx)))
            .collect();
        let borrowers: Vec<Side<'_>> = batch
            .iter()
            .filter_map(|tx| self.side(tx, self.received(tx)))
            .collect();

        let mut matches = Vec::new();
        for lender in &lenders {
            for borrower in &borrowers {
                if lender.amount != borrower.amount {
                    continue;
                }
                if let Some(candidate) = self.classify(lender, borrower) {
                    matches.push(candidate);
                }
            }
        }
        matches
    }

    fn classify(&self, lender: &Side<'_>, borrower: &Side<'_>) -> Option<CandidateMatch> {
        let (kind, reference) = match (&lender.po, &borrower.po) {
            (Some(l), Some(b)) if l == b => (ReferenceKind::Po, l.clone()),
            _ => match (&lender.lc, &borrower.lc) {
                (Some(l), Some(b)) if l == b => (ReferenceKind::Lc, l.clone()),
                _ => return None,
            },
        };
        Some(CandidateMatch {
            lender_uid: lender.tx.uid.clone(),
            borrower_uid: borrower.tx.uid.clone(),
            amount: lender.amount,
            kind,
            reference,
        })
    }

    fn side<'a>(&self, tx: &'a Transaction, amount: Option<Decimal>) -> Option<Side<'a>> {
        let amount = amount.filter(|a| *a > Decimal::ZERO)?;
        Some(Side {
            tx,
            amount,
            po: self.extractor.po(&tx.particulars),
            lc: self.extractor.lc(&tx.particulars),
        })
    }

    /// Funds advanced by this entry under the configured convention.
    fn advanced(&self, tx: &Transaction) -> Option<Decimal> {
        match self.config.convention {
            RoleConvention::DebitLends => tx.debit,
            RoleConvention::CreditLends => tx.credit,
        }
    }

    /// Funds received by this entry under the configured convention.
    fn received(&self, tx: &Transaction) -> Option<Decimal> {
        match self.config.convention {
            RoleConvention::DebitLends => tx.credit,
            RoleConvention::CreditLends => tx.debit,
        }
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(MatchConfig::default())
    }
}
