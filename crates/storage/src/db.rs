use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;

pub type DbPool = Pool<Sqlite>;

pub async fn create_store(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uid TEXT NOT NULL UNIQUE,
            lender TEXT NOT NULL,
            borrower TEXT NOT NULL,
            statement_month TEXT,
            statement_year INTEGER,
            date TEXT NOT NULL,
            particulars TEXT NOT NULL,
            voucher_type TEXT NOT NULL DEFAULT '',
            voucher_no TEXT NOT NULL DEFAULT '',
            debit TEXT,
            credit TEXT,
            entered_by TEXT,
            match_status TEXT NOT NULL DEFAULT 'unmatched',
            matched_with TEXT,
            keywords TEXT,
            confirmed_by TEXT,
            match_timestamp TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_match_status ON transactions(match_status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
