use crate::ScanQuery;
use hscan::{HscanError, ScanId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("missing or invalid builder parameter '{0}'")]
    Builder(&'static str),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid table name {0:?}")]
    TableName(String),

    #[error("data source: {0}")]
    DataSource(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("malformed scan {id}: {source}")]
    MalformedRow {
        id: ScanId,
        #[source]
        source: HscanError,
    },

    #[error("no scans found for {0}")]
    EmptyRange(ScanQuery),

    #[error("scan {0} is not in the loaded range")]
    RowNotFound(ScanId),

    #[error("column {index} is outside 0..{columns}")]
    ColumnOutOfRange { index: usize, columns: usize },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("profile csv line {line}: {reason}")]
    Csv { line: usize, reason: String },
}

impl SurfaceError {
    pub(crate) fn data_source<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::DataSource(Box::new(err))
    }
}
