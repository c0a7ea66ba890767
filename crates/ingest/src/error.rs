use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Excel error: {0}")]
    Excel(#[from] calamine::XlsxError),
    #[error("worksheet '{0}' not found")]
    SheetNotFound(String),
    #[error("header row not found")]
    HeaderNotFound,
    #[error("header row lacks required column: {0}")]
    MissingColumn(&'static str),
    #[error("invalid dialect configuration: {0}")]
    InvalidDialect(String),
}
