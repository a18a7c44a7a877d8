//! Scan row sources.

use hscan::{ScanId, ScanMeta, ScanRow, SegId};
use std::{convert::Infallible, fmt};

/// Which scan rows to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanQuery {
    /// Every scan with `min <= id <= max`.
    IdRange { min: ScanId, max: ScanId },

    /// Every scan belonging to one segment.
    Segment(SegId),
}

impl ScanQuery {
    /// Returns true if a row described by `meta` answers this query.
    pub fn matches(&self, meta: &ScanMeta) -> bool {
        match *self {
            Self::IdRange { min, max } => (min..=max).contains(&meta.id),
            Self::Segment(seg_id) => meta.seg_id == seg_id,
        }
    }
}

impl fmt::Display for ScanQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdRange { min, max } => write!(f, "ids {min}..={max}"),
            Self::Segment(seg_id) => write!(f, "segment {seg_id}"),
        }
    }
}

/// A store of raw scan rows.
///
/// Implementations must return rows in ascending `id` order.
pub trait ScanSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch(&self, query: &ScanQuery) -> Result<Vec<ScanRow>, Self::Error>;
}

/// Scan rows held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemSource {
    rows: Vec<ScanRow>,
}

impl MemSource {
    pub fn new<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = ScanRow>,
    {
        let mut rows: Vec<ScanRow> = rows.into_iter().collect();
        rows.sort_by_key(|row| row.meta.id);
        Self { rows }
    }
}

impl ScanSource for MemSource {
    type Error = Infallible;

    fn fetch(&self, query: &ScanQuery) -> Result<Vec<ScanRow>, Infallible> {
        Ok(self
            .rows
            .iter()
            .filter(|row| query.matches(&row.meta))
            .cloned()
            .collect())
    }
}
