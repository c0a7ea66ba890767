use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Assigns deterministic uids across one parse batch, in row order:
/// `{lender}_{hex date digits}_{hex rounded amount}_{seq:06}`.
///
/// The sequence counter advances once per dated row, so re-parsing
/// byte-identical input reproduces identical uids; an external store's
/// uniqueness constraint on uid then rejects duplicate re-imports.
pub struct UidAssigner<'a> {
    lender: &'a str,
    next_seq: u32,
}

impl<'a> UidAssigner<'a> {
    pub fn new(lender: &'a str) -> Self {
        UidAssigner { lender, next_seq: 1 }
    }

    /// Empty uid for rows without a date; such rows must be excluded or
    /// flagged before persistence.
    pub fn assign(&mut self, date: Option<NaiveDate>, amount: Option<Decimal>) -> String {
        let Some(date) = date else {
            return String::new();
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        format!(
            "{}_{}_{}_{:06}",
            self.lender,
            hex_date(date),
            hex_amount(amount),
            seq
        )
    }
}

fn hex_date(date: NaiveDate) -> String {
    let digits: i64 = date
        .format("%Y%m%d")
        .to_string()
        .parse()
        .unwrap_or_default();
    format!("{digits:x}")
}

fn hex_amount(amount: Option<Decimal>) -> String {
    amount
        .and_then(|a| a.round().abs().to_i64())
        .map(|v| format!("{v:x}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn uid_components() {
        let mut assigner = UidAssigner::new("Steel");
        let uid = assigner.assign(Some(date(2024, 1, 15)), Some(Decimal::from(1000)));
        // 20240115 = 0x134d6f3, 1000 = 0x3e8
        assert_eq!(uid, "Steel_134d6f3_3e8_000001");
    }

    #[test]
    fn sequence_advances_only_on_dated_rows() {
        let mut assigner = UidAssigner::new("Steel");
        let first = assigner.assign(Some(date(2024, 1, 15)), Some(Decimal::from(10)));
        let undated = assigner.assign(None, Some(Decimal::from(10)));
        let second = assigner.assign(Some(date(2024, 1, 16)), Some(Decimal::from(10)));
        assert!(first.ends_with("_000001"));
        assert_eq!(undated, "");
        assert!(second.ends_with("_000002"));
    }

    #[test]
    fn amount_is_rounded_before_encoding() {
        let mut assigner = UidAssigner::new("L");
        let uid = assigner.assign(
            Some(date(2024, 1, 15)),
            Some(Decimal::from_str("999.50").unwrap()),
        );
        // round(999.50) = 1000 = 0x3e8
        assert_eq!(uid, "L_134d6f3_3e8_000001");
    }

    #[test]
    fn missing_amount_leaves_empty_component() {
        let mut assigner = UidAssigner::new("L");
        let uid = assigner.assign(Some(date(2024, 1, 15)), None);
        assert_eq!(uid, "L_134d6f3__000001");
    }
}
