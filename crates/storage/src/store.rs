use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use interunit_core::{MatchStatus, Transaction};
use interunit_recon::{CandidateMatch, MatchStore, StoreError};

use crate::db::{create_store, DbPool};

#[derive(Error, Debug)]
pub enum StorageError {
    /// A uid in the batch collided with already-persisted data.
    #[error("already imported: {0}")]
    AlreadyImported(String),
    #[error("invalid stored value in {column}: '{value}'")]
    InvalidColumn { column: &'static str, value: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// SQLite-backed transaction store. Amounts are persisted as decimal text
/// so they round-trip exactly; dates as ISO text.
pub struct SqliteStore {
    pool: DbPool,
}

const SELECT_COLUMNS: &str = "uid, lender, borrower, statement_month, statement_year, date, \
     particulars, voucher_type, voucher_no, debit, credit, entered_by, \
     match_status, matched_with, keywords, confirmed_by, match_timestamp";

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        SqliteStore { pool }
    }

    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        Ok(SqliteStore { pool: create_store(path).await? })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Appends one parse batch. All rows land or none do: a uid collision
    /// rolls the whole batch back and surfaces the distinct
    /// already-imported condition, detected from the driver's
    /// uniqueness-violation signal rather than a pre-check.
    pub async fn append_batch(&self, records: &[Transaction]) -> Result<u64, StorageError> {
        let mut txn = self.pool.begin().await?;
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO transactions (
                    uid, lender, borrower, statement_month, statement_year, date,
                    particulars, voucher_type, voucher_no, debit, credit, entered_by,
                    match_status, matched_with, keywords, confirmed_by, match_timestamp
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.uid)
            .bind(&record.lender)
            .bind(&record.borrower)
            .bind(&record.statement_month)
            .bind(record.statement_year)
            .bind(record.date.format("%Y-%m-%d").to_string())
            .bind(&record.particulars)
            .bind(&record.voucher_type)
            .bind(&record.voucher_no)
            .bind(record.debit.map(|d| d.to_string()))
            .bind(record.credit.map(|c| c.to_string()))
            .bind(&record.entered_by)
            .bind(record.match_status.as_str())
            .bind(&record.matched_with)
            .bind(&record.keywords)
            .bind(&record.confirmed_by)
            .bind(record.match_timestamp.map(format_timestamp))
            .execute(&mut *txn)
            .await;

            if let Err(err) = result {
                if let sqlx::Error::Database(db_err) = &err {
                    if db_err.is_unique_violation() {
                        return Err(StorageError::AlreadyImported(record.uid.clone()));
                    }
                }
                return Err(err.into());
            }
        }
        txn.commit().await?;
        Ok(records.len() as u64)
    }

    pub async fn fetch_by_uid(&self, uid: &str) -> Result<Option<Transaction>, StorageError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM transactions WHERE uid = ?");
        let row = sqlx::query_as::<_, StoredRow>(&sql)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Transaction::try_from).transpose()
    }

    pub async fn fetch_unmatched_all(&self) -> Result<Vec<Transaction>, StorageError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM transactions \
             WHERE match_status = 'unmatched' OR match_status IS NULL \
             ORDER BY date, uid"
        );
        let rows = sqlx::query_as::<_, StoredRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    /// Unmatched entries for one company pair, either orientation,
    /// optionally narrowed to a statement period.
    pub async fn fetch_unmatched_for_pair(
        &self,
        company_a: &str,
        company_b: &str,
        month: Option<&str>,
        year: Option<i32>,
    ) -> Result<Vec<Transaction>, StorageError> {
        let mut sql = format!(
            "SELECT {SELECT_COLUMNS} FROM transactions \
             WHERE (match_status = 'unmatched' OR match_status IS NULL) \
             AND ((lender = ? AND borrower = ?) OR (lender = ? AND borrower = ?))"
        );
        if month.is_some() {
            sql.push_str(" AND statement_month = ?");
        }
        if year.is_some() {
            sql.push_str(" AND statement_year = ?");
        }
        sql.push_str(" ORDER BY date, uid");

        let mut query = sqlx::query_as::<_, StoredRow>(&sql)
            .bind(company_a)
            .bind(company_b)
            .bind(company_b)
            .bind(company_a);
        if let Some(month) = month {
            query = query.bind(month);
        }
        if let Some(year) = year {
            query = query.bind(year);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    /// Record counts per match state, for summary views.
    pub async fn status_counts(&self) -> Result<Vec<(String, i64)>, StorageError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT match_status, COUNT(*) FROM transactions \
             GROUP BY match_status ORDER BY match_status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

impl MatchStore for SqliteStore {
    async fn fetch_unmatched(&self) -> Result<Vec<Transaction>, StoreError> {
        self.fetch_unmatched_all().await.map_err(backend)
    }

    async fn fetch(&self, uid: &str) -> Result<Option<Transaction>, StoreError> {
        self.fetch_by_uid(uid).await.map_err(backend)
    }

    async fn mark_matched(&self, candidate: &CandidateMatch) -> Result<(), StoreError> {
        let mut txn = self.pool.begin().await.map_err(sql_backend)?;

        const APPLY: &str = "UPDATE transactions \
             SET matched_with = ?, match_status = 'matched', keywords = ?, \
                 match_timestamp = datetime('now') \
             WHERE uid = ? AND match_status = 'unmatched'";
        let lender = sqlx::query(APPLY)
            .bind(&candidate.borrower_uid)
            .bind(&candidate.reference)
            .bind(&candidate.lender_uid)
            .execute(&mut *txn)
            .await
            .map_err(sql_backend)?;
        let borrower = sqlx::query(APPLY)
            .bind(&candidate.lender_uid)
            .bind(&candidate.reference)
            .bind(&candidate.borrower_uid)
            .execute(&mut *txn)
            .await
            .map_err(sql_backend)?;

        if lender.rows_affected() != 1 || borrower.rows_affected() != 1 {
            txn.rollback().await.map_err(sql_backend)?;
            return Err(StoreError::Conflict(format!(
                "{} / {} not both unmatched",
                candidate.lender_uid, candidate.borrower_uid
            )));
        }
        txn.commit().await.map_err(sql_backend)
    }

    async fn mark_confirmed(
        &self,
        uid: &str,
        partner: &str,
        actor: &str,
    ) -> Result<(), StoreError> {
        let mut txn = self.pool.begin().await.map_err(sql_backend)?;

        const CONFIRM: &str = "UPDATE transactions \
             SET match_status = 'confirmed', confirmed_by = ?, \
                 match_timestamp = datetime('now') \
             WHERE uid = ? AND match_status IN ('matched', 'confirmed')";
        let mut affected = 0;
        for id in [uid, partner] {
            affected += sqlx::query(CONFIRM)
                .bind(actor)
                .bind(id)
                .execute(&mut *txn)
                .await
                .map_err(sql_backend)?
                .rows_affected();
        }

        if affected != 2 {
            txn.rollback().await.map_err(sql_backend)?;
            return Err(StoreError::Conflict(format!(
                "{uid} / {partner} not both matched"
            )));
        }
        txn.commit().await.map_err(sql_backend)
    }

    async fn clear_match(&self, uid: &str, partner: &str) -> Result<(), StoreError> {
        let mut txn = self.pool.begin().await.map_err(sql_backend)?;

        const CLEAR: &str = "UPDATE transactions \
             SET match_status = 'unmatched', matched_with = NULL, keywords = NULL, \
                 confirmed_by = NULL, match_timestamp = NULL \
             WHERE uid = ?";
        let mut affected = 0;
        for id in [uid, partner] {
            affected += sqlx::query(CLEAR)
                .bind(id)
                .execute(&mut *txn)
                .await
                .map_err(sql_backend)?
                .rows_affected();
        }

        if affected != 2 {
            txn.rollback().await.map_err(sql_backend)?;
            return Err(StoreError::NotFound(format!("{uid} or {partner}")));
        }
        txn.commit().await.map_err(sql_backend)
    }
}

fn backend(err: StorageError) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn sql_backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(sqlx::FromRow)]
struct StoredRow {
    uid: String,
    lender: String,
    borrower: String,
    statement_month: Option<String>,
    statement_year: Option<i32>,
    date: String,
    particulars: String,
    voucher_type: String,
    voucher_no: String,
    debit: Option<String>,
    credit: Option<String>,
    entered_by: Option<String>,
    match_status: String,
    matched_with: Option<String>,
    keywords: Option<String>,
    confirmed_by: Option<String>,
    match_timestamp: Option<String>,
}

impl TryFrom<StoredRow> for Transaction {
    type Error = StorageError;

    fn try_from(row: StoredRow) -> Result<Self, StorageError> {
        let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").map_err(|_| {
            StorageError::InvalidColumn { column: "date", value: row.date.clone() }
        })?;
        let match_status = MatchStatus::from_str(&row.match_status).map_err(|_| {
            StorageError::InvalidColumn { column: "match_status", value: row.match_status.clone() }
        })?;
        let debit = parse_stored_amount("debit", row.debit)?;
        let credit = parse_stored_amount("credit", row.credit)?;
        let match_timestamp = row
            .match_timestamp
            .map(|raw| {
                NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
                    .map(|naive| naive.and_utc())
                    .map_err(|_| StorageError::InvalidColumn { column: "match_timestamp", value: raw })
            })
            .transpose()?;

        Ok(Transaction {
            uid: row.uid,
            lender: row.lender,
            borrower: row.borrower,
            statement_month: row.statement_month,
            statement_year: row.statement_year,
            date,
            particulars: row.particulars,
            voucher_type: row.voucher_type,
            voucher_no: row.voucher_no,
            debit,
            credit,
            entered_by: row.entered_by,
            match_status,
            matched_with: row.matched_with,
            keywords: row.keywords,
            confirmed_by: row.confirmed_by,
            match_timestamp,
        })
    }
}

fn parse_stored_amount(
    column: &'static str,
    raw: Option<String>,
) -> Result<Option<Decimal>, StorageError> {
    raw.map(|value| {
        Decimal::from_str(&value)
            .map_err(|_| StorageError::InvalidColumn { column, value })
    })
    .transpose()
}
