use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Match lifecycle state of one ledger entry.
///
/// `Rejected` is part of the status domain so stored values always parse,
/// but a reject writes `Unmatched` back — a rejected pair re-enters the
/// pool for the next matcher run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    #[default]
    Unmatched,
    Matched,
    Confirmed,
    Rejected,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Unmatched => "unmatched",
            MatchStatus::Matched => "matched",
            MatchStatus::Confirmed => "confirmed",
            MatchStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown match status: '{0}'")]
pub struct ParseMatchStatusError(String);

impl std::str::FromStr for MatchStatus {
    type Err = ParseMatchStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unmatched" => Ok(MatchStatus::Unmatched),
            "matched" => Ok(MatchStatus::Matched),
            "confirmed" => Ok(MatchStatus::Confirmed),
            "rejected" => Ok(MatchStatus::Rejected),
            other => Err(ParseMatchStatusError(other.to_string())),
        }
    }
}

/// One canonical inter-company loan ledger entry.
///
/// `lender` is the unit whose export the row came from; `borrower` is the
/// counterparty account named in the export header. Exactly one of
/// `debit`/`credit` carries the settled amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub uid: String,
    pub lender: String,
    pub borrower: String,
    pub statement_month: Option<String>,
    pub statement_year: Option<i32>,
    pub date: NaiveDate,
    pub particulars: String,
    pub voucher_type: String,
    pub voucher_no: String,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub entered_by: Option<String>,
    pub match_status: MatchStatus,
    pub matched_with: Option<String>,
    pub keywords: Option<String>,
    pub confirmed_by: Option<String>,
    pub match_timestamp: Option<DateTime<Utc>>,
}

impl Transaction {
    /// The amount this row settles: credit when present, else debit.
    pub fn settled_amount(&self) -> Option<Decimal> {
        self.credit.or(self.debit)
    }

    pub fn is_debit_side(&self) -> bool {
        self.debit.is_some_and(|d| d > Decimal::ZERO)
    }

    pub fn is_credit_side(&self) -> bool {
        self.credit.is_some_and(|c| c > Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn tx(debit: Option<i64>, credit: Option<i64>) -> Transaction {
        Transaction {
            uid: "u1".to_string(),
            lender: "Steel".to_string(),
            borrower: "GeoTex".to_string(),
            statement_month: None,
            statement_year: None,
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            particulars: "test".to_string(),
            voucher_type: String::new(),
            voucher_no: String::new(),
            debit: debit.map(Decimal::from),
            credit: credit.map(Decimal::from),
            entered_by: None,
            match_status: MatchStatus::Unmatched,
            matched_with: None,
            keywords: None,
            confirmed_by: None,
            match_timestamp: None,
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            MatchStatus::Unmatched,
            MatchStatus::Matched,
            MatchStatus::Confirmed,
            MatchStatus::Rejected,
        ] {
            assert_eq!(MatchStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(MatchStatus::from_str("pending").is_err());
    }

    #[test]
    fn settled_amount_prefers_credit() {
        assert_eq!(tx(Some(500), None).settled_amount(), Some(Decimal::from(500)));
        assert_eq!(tx(None, Some(700)).settled_amount(), Some(Decimal::from(700)));
        assert_eq!(tx(Some(500), Some(700)).settled_amount(), Some(Decimal::from(700)));
        assert_eq!(tx(None, None).settled_amount(), None);
    }

    #[test]
    fn side_predicates() {
        assert!(tx(Some(1), None).is_debit_side());
        assert!(!tx(Some(1), None).is_credit_side());
        assert!(tx(None, Some(1)).is_credit_side());
        assert!(!tx(Some(0), None).is_debit_side());
    }
}
