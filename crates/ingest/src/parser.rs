use std::collections::HashSet;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use interunit_core::normalize::clean;
use interunit_core::{MatchStatus, StatementPeriod, Transaction};

use crate::dialect::LedgerDialect;
use crate::error::IngestError;
use crate::identity::UidAssigner;
use crate::sheet::Sheet;

/// Everything extracted from one worksheet: the two counterparty
/// identities, the statement period, the canonical records (uids
/// assigned, dated, exactly one amount populated) and the non-fatal
/// anomalies encountered along the way.
#[derive(Debug)]
pub struct ParsedStatement {
    pub lender: String,
    pub borrower: String,
    pub period: Option<StatementPeriod>,
    pub records: Vec<Transaction>,
    pub warnings: Vec<String>,
}

/// Converts one irregular ledger-export worksheet into canonical records.
pub struct StatementParser<D> {
    dialect: D,
}

/// Resolved positions of the columns the parser needs. The export merges
/// the "Particulars" header across two columns: the first holds the
/// debit/credit marker, the following one the narration.
struct Columns {
    date: usize,
    marker: usize,
    particulars: usize,
    voucher_type: usize,
    voucher_no: usize,
    debit: usize,
    credit: usize,
    width: usize,
}

struct LogicalRow {
    cells: Vec<String>,
    entered_by: String,
}

impl<D: LedgerDialect> StatementParser<D> {
    pub fn new(dialect: D) -> Self {
        StatementParser { dialect }
    }

    pub fn parse(&self, mut sheet: Sheet) -> Result<ParsedStatement, IngestError> {
        let header_idx = self
            .find_header_row(&sheet)
            .ok_or(IngestError::HeaderNotFound)?;

        let mut warnings = Vec::new();
        let (lender, borrower, period) = self.extract_metadata(&sheet, header_idx, &mut warnings);

        sheet.fill_merged_regions();

        let columns = self.resolve_columns(&sheet, header_idx)?;
        let mut rows = self.collapse_rows(&sheet, header_idx, &columns);
        deduplicate_columns(&mut rows);
        drop_numeric_footer(&mut rows);
        rows.retain(|row| !self.dialect.is_balance_row(&row.cells[columns.particulars]));

        let records = self.build_records(
            rows,
            &columns,
            &lender,
            &borrower,
            period.as_ref(),
            &mut warnings,
        );

        Ok(ParsedStatement {
            lender,
            borrower,
            period,
            records,
            warnings,
        })
    }

    /// First row whose cleaned cell set covers every required header.
    fn find_header_row(&self, sheet: &Sheet) -> Option<usize> {
        let required = self.dialect.required_headers();
        sheet.rows().iter().position(|row| {
            let cells: HashSet<String> = row.iter().map(|c| clean(c)).collect();
            required.iter().all(|h| cells.contains(*h))
        })
    }

    fn extract_metadata(
        &self,
        sheet: &Sheet,
        header_idx: usize,
        warnings: &mut Vec<String>,
    ) -> (String, String, Option<StatementPeriod>) {
        let cells = sheet.rows()[..header_idx]
            .iter()
            .flat_map(|row| row.iter().map(|c| clean(c)));

        let mut lender = None;
        let mut borrower = None;
        let mut period = None;
        for cell in cells {
            if period.is_none() {
                period = self.dialect.extract_period(&cell);
            }
            if lender.is_none() {
                lender = self.dialect.extract_lender(&cell);
            }
            if borrower.is_none() {
                borrower = self.dialect.extract_borrower(&cell);
            }
        }

        if period.is_none() {
            warnings.push("statement period not found in metadata".to_string());
        }
        if lender.is_none() {
            warnings.push("lender identity not found in metadata".to_string());
        }
        if borrower.is_none() {
            warnings.push("borrower identity not found in metadata".to_string());
        }
        (lender.unwrap_or_default(), borrower.unwrap_or_default(), period)
    }

    fn resolve_columns(&self, sheet: &Sheet, header_idx: usize) -> Result<Columns, IngestError> {
        let header: Vec<String> = sheet.rows()[header_idx].iter().map(|c| clean(c)).collect();
        let position = |name: &'static str| {
            header
                .iter()
                .position(|h| h == name)
                .ok_or(IngestError::MissingColumn(name))
        };

        let marker = position("Particulars")?;
        let particulars = marker + 1;
        if particulars >= header.len() {
            return Err(IngestError::MissingColumn("Particulars"));
        }

        Ok(Columns {
            date: position("Date")?,
            marker,
            particulars,
            voucher_type: position("Vch Type")?,
            voucher_no: position("Vch No.")?,
            debit: position("Debit")?,
            credit: position("Credit")?,
            width: header.len(),
        })
    }

    /// Folds wrapped narration rows into their logical row and absorbs
    /// operator annotation rows, which are never emitted as transactions.
    fn collapse_rows(&self, sheet: &Sheet, header_idx: usize, columns: &Columns) -> Vec<LogicalRow> {
        let mut collapsed = Vec::new();
        let mut current: Option<Vec<String>> = None;
        let mut pending_entered_by = String::new();

        for raw in &sheet.rows()[header_idx + 1..] {
            let mut cells: Vec<String> =
                raw.iter().take(columns.width).map(|c| clean(c)).collect();
            cells.resize(columns.width, String::new());

            if let Some(name) = self.scan_entered_by(&cells) {
                pending_entered_by = name;
                continue;
            }

            let continuation = current.is_some()
                && cells[columns.date].is_empty()
                && cells[columns.marker].is_empty()
                && !cells[columns.particulars].is_empty();

            if continuation {
                if let Some(row) = current.as_mut() {
                    let joined =
                        format!("{} {}", row[columns.particulars], cells[columns.particulars]);
                    row[columns.particulars] = joined.trim().to_string();
                }
            } else {
                if let Some(cells) = current.take() {
                    collapsed.push(LogicalRow {
                        cells,
                        entered_by: std::mem::take(&mut pending_entered_by),
                    });
                }
                current = Some(cells);
            }
        }
        if let Some(cells) = current.take() {
            collapsed.push(LogicalRow {
                cells,
                entered_by: std::mem::take(&mut pending_entered_by),
            });
        }
        collapsed
    }

    /// The annotation name: the next non-empty cell after the marker wins,
    /// else whatever followed the colon in the marker cell itself.
    fn scan_entered_by(&self, cells: &[String]) -> Option<String> {
        for (idx, cell) in cells.iter().enumerate() {
            if let Some(tail) = self.dialect.entered_by(cell) {
                let name = cells[idx + 1..]
                    .iter()
                    .find(|c| !c.is_empty())
                    .cloned()
                    .unwrap_or(tail);
                return Some(name);
            }
        }
        None
    }

    fn build_records(
        &self,
        rows: Vec<LogicalRow>,
        columns: &Columns,
        lender: &str,
        borrower: &str,
        period: Option<&StatementPeriod>,
        warnings: &mut Vec<String>,
    ) -> Vec<Transaction> {
        let statement_month = period.and_then(|p| p.statement_month());
        let statement_year = period.and_then(|p| p.statement_year());

        let mut assigner = UidAssigner::new(lender);
        let mut records = Vec::new();
        for (idx, row) in rows.into_iter().enumerate() {
            let rownum = idx + 1;
            let date = self.parse_date(&row.cells[columns.date], rownum, warnings);
            let debit = parse_amount(&row.cells[columns.debit], "debit", rownum, warnings);
            let credit = parse_amount(&row.cells[columns.credit], "credit", rownum, warnings);

            // uid before exclusion: dropped rows still consume their place
            // in the sequence, keeping re-parses aligned.
            let uid = assigner.assign(date, credit.or(debit));

            let Some(date) = date else {
                warnings.push(format!("row {rownum}: no date; row dropped"));
                continue;
            };
            let (debit, credit) = match (debit, credit) {
                (Some(_), Some(_)) => {
                    warnings.push(format!(
                        "row {rownum}: both debit and credit populated; row dropped"
                    ));
                    continue;
                }
                (None, None) => {
                    warnings.push(format!("row {rownum}: no amount; row dropped"));
                    continue;
                }
                other => other,
            };

            let entered_by = (!row.entered_by.is_empty()).then(|| row.entered_by.clone());
            records.push(Transaction {
                uid,
                lender: lender.to_string(),
                borrower: borrower.to_string(),
                statement_month: statement_month.clone(),
                statement_year,
                date,
                particulars: row.cells[columns.particulars].clone(),
                voucher_type: row.cells[columns.voucher_type].clone(),
                voucher_no: row.cells[columns.voucher_no].clone(),
                debit,
                credit,
                entered_by,
                match_status: MatchStatus::Unmatched,
                matched_with: None,
                keywords: None,
                confirmed_by: None,
                match_timestamp: None,
            });
        }
        records
    }

    fn parse_date(
        &self,
        cell: &str,
        rownum: usize,
        warnings: &mut Vec<String>,
    ) -> Option<NaiveDate> {
        if cell.is_empty() {
            return None;
        }
        for fmt in self.dialect.date_formats() {
            if let Ok(date) = NaiveDate::parse_from_str(cell, fmt) {
                return Some(date);
            }
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S") {
            return Some(dt.date());
        }
        warnings.push(format!("row {rownum}: unparsable date '{cell}'"));
        None
    }
}

fn parse_amount(
    cell: &str,
    column: &str,
    rownum: usize,
    warnings: &mut Vec<String>,
) -> Option<Decimal> {
    if cell.is_empty() {
        return None;
    }
    let (negative, body) = if cell.starts_with('(') && cell.ends_with(')') {
        (true, &cell[1..cell.len() - 1])
    } else {
        (false, cell)
    };
    let stripped = body.replace([',', '$', ' '], "");
    match Decimal::from_str(&stripped) {
        Ok(amount) => Some(if negative { -amount } else { amount }),
        Err(_) => {
            warnings.push(format!("row {rownum}: unparsable {column} amount '{cell}'"));
            None
        }
    }
}

/// Unmerging can replicate one value across several columns. Column groups
/// are taken from the first logical row; within a group, occurrences of the
/// group's value beyond the first are blanked on every row.
fn deduplicate_columns(rows: &mut [LogicalRow]) {
    let Some(first) = rows.first() else {
        return;
    };
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (idx, value) in first.cells.iter().enumerate() {
        if value.is_empty() {
            continue;
        }
        match groups.iter_mut().find(|(v, _)| v == value) {
            Some((_, idxs)) => idxs.push(idx),
            None => groups.push((value.clone(), vec![idx])),
        }
    }
    groups.retain(|(_, idxs)| idxs.len() > 1);
    if groups.is_empty() {
        return;
    }

    for row in rows.iter_mut() {
        for (value, idxs) in &groups {
            let mut found = false;
            for &i in idxs {
                if row.cells[i] == *value {
                    if found {
                        row.cells[i].clear();
                    } else {
                        found = true;
                    }
                }
            }
        }
    }
}

/// A trailing balance/footer row is entirely numeric or blank.
fn drop_numeric_footer(rows: &mut Vec<LogicalRow>) {
    if rows
        .last()
        .is_some_and(|row| row.cells.iter().all(|c| numeric_or_blank(c)))
    {
        rows.pop();
    }
}

fn numeric_or_blank(cell: &str) -> bool {
    if cell.is_empty() {
        return true;
    }
    let stripped = cell.replacen('.', "", 1).replacen(',', "", 1);
    !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit())
}
