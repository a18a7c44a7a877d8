use crate::{ScanQuery, SurfaceError};
use hscan::{ScanId, ScanMeta, ScanRow};
use log::warn;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;

/// Height samples for every scan answering one [`ScanQuery`].
///
/// Rows are kept in the order the source returned them (ascending
/// `id`), and every row has exactly `columns` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanMatrix {
    /// Query this matrix was loaded for.
    query: ScanQuery,

    /// Samples per row.
    columns: usize,

    /// Per-row metadata, parallel to the rows of `heights`.
    meta: Vec<ScanMeta>,

    /// Row-major height samples (mm).
    heights: Vec<f64>,
}

impl ScanMatrix {
    /// Parses `rows` into a matrix `columns` samples wide.
    ///
    /// Fails if there are no rows, or if any row doesn't hold exactly
    /// `columns` numeric samples.
    pub fn from_rows(
        query: ScanQuery,
        rows: Vec<ScanRow>,
        columns: usize,
    ) -> Result<Self, SurfaceError> {
        if rows.is_empty() {
            return Err(SurfaceError::EmptyRange(query));
        }

        let parsed = rows
            .par_iter()
            .map(|row| {
                row.heights(columns)
                    .map_err(|source| SurfaceError::MalformedRow {
                        id: row.meta.id,
                        source,
                    })
            })
            .collect::<Result<Vec<Vec<f64>>, SurfaceError>>()
            .map_err(|e| {
                warn!("rejecting {query}; {e}");
                e
            })?;

        let mut heights = Vec::with_capacity(rows.len() * columns);
        for samples in parsed {
            heights.extend_from_slice(&samples);
        }
        let meta = rows.into_iter().map(|row| row.meta).collect();

        Ok(Self {
            query,
            columns,
            meta,
            heights,
        })
    }

    pub fn query(&self) -> ScanQuery {
        self.query
    }

    /// Returns the number of scans (rows).
    pub fn rows(&self) -> usize {
        self.meta.len()
    }

    /// Returns the number of samples per scan (columns).
    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn meta(&self) -> &[ScanMeta] {
        &self.meta
    }

    /// Returns all samples, row-major.
    pub fn values(&self) -> &[f64] {
        &self.heights
    }

    /// Returns the scan ids labelling each row.
    pub fn ids(&self) -> Vec<ScanId> {
        self.meta.iter().map(|meta| meta.id).collect()
    }

    /// Returns the samples of row `row`.
    pub fn row(&self, row: usize) -> Option<&[f64]> {
        if row >= self.rows() {
            return None;
        }
        let start = row * self.columns;
        self.heights.get(start..start + self.columns)
    }

    /// Returns the sample at (`row`, `col`).
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if col < self.columns {
            self.row(row).map(|samples| samples[col])
        } else {
            None
        }
    }

    /// Returns the row index of scan `id`, if loaded.
    pub fn position(&self, id: ScanId) -> Option<usize> {
        self.meta.iter().position(|meta| meta.id == id)
    }

    /// Returns an iterator over each row's metadata and samples.
    pub fn iter_rows(&self) -> impl Iterator<Item = (&ScanMeta, &[f64])> + '_ {
        self.meta.iter().zip(self.heights.chunks_exact(self.columns))
    }

    pub fn summary(&self) -> ScanSummary {
        let (dfo_min, dfo_max) = self
            .meta
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), meta| {
                (lo.min(meta.dfo), hi.max(meta.dfo))
            });
        #[allow(clippy::cast_precision_loss)]
        let n = self.meta.len() as f64;
        let mean_tran_step = self.meta.iter().map(|meta| meta.tran_step).sum::<f64>() / n;
        let mean_lon_step = self.meta.iter().map(|meta| meta.lon_step).sum::<f64>() / n;
        ScanSummary {
            route_name: self.meta.first().and_then(|meta| meta.route_name.clone()),
            first_id: self.meta.first().map_or(0, |meta| meta.id),
            last_id: self.meta.last().map_or(0, |meta| meta.id),
            rows: self.rows(),
            columns: self.columns,
            dfo_min,
            dfo_max,
            mean_tran_step,
            mean_lon_step,
        }
    }
}

/// An overview of a loaded matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSummary {
    /// Route of the first scan, if recorded.
    pub route_name: Option<String>,
    pub first_id: ScanId,
    pub last_id: ScanId,
    pub rows: usize,
    pub columns: usize,
    pub dfo_min: f64,
    pub dfo_max: f64,
    pub mean_tran_step: f64,
    pub mean_lon_step: f64,
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, DFO: {}~{}",
            self.route_name.as_deref().unwrap_or("unknown route"),
            self.dfo_min,
            self.dfo_max
        )
    }
}
