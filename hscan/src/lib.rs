//! Pavement height-scan record format.
//!
//! A scan row is one transverse sweep of a line-laser profiler across
//! the lane. Alongside its identifiers and position along the route,
//! every row carries its height samples packed into a single
//! comma-separated text column.
//!
//! # Layout
//!
//! | column       | meaning                                        |
//! |--------------|------------------------------------------------|
//! | `id`         | scan number, ascending along the route         |
//! | `segID`      | segment the scan belongs to                    |
//! | `DFO`        | distance from origin (miles)                   |
//! | `OFFSET`     | longitudinal offset within the segment (mm)    |
//! | `tranStep`   | transverse spacing between samples (mm)        |
//! | `lonStep`    | longitudinal spacing between scans (mm)        |
//! | `ROUTE_NAME` | route the scan was collected on (nullable)     |
//! | `height`     | [`SAMPLES_PER_SCAN`] comma-separated heights   |

mod error;

pub use crate::error::HscanError;
use serde::Serialize;
use std::fmt::Write;

/// Number of height samples in one transverse sweep.
pub const SAMPLES_PER_SCAN: usize = 1536;

/// Delimiter between samples in the packed `height` column.
pub const HEIGHT_DELIMITER: char = ',';

/// Scan identifier.
pub type ScanId = u32;

/// Segment identifier.
pub type SegId = u32;

/// One raw measurement record, as returned by the backing store.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRow {
    pub meta: ScanMeta,

    /// Packed height samples (mm), still in their delimited text form.
    pub height: String,
}

/// Everything about a scan row except its height samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanMeta {
    pub id: ScanId,

    pub seg_id: SegId,

    /// Distance from origin, in miles.
    pub dfo: f64,

    /// Longitudinal offset within the segment, in millimeters.
    pub offset: f64,

    /// Transverse distance between adjacent samples, in millimeters.
    pub tran_step: f64,

    /// Longitudinal distance between adjacent scans, in millimeters.
    pub lon_step: f64,

    pub route_name: Option<String>,
}

impl ScanRow {
    /// Parses this row's height samples, requiring exactly `width`
    /// of them.
    pub fn heights(&self, width: usize) -> Result<Vec<f64>, HscanError> {
        parse_heights(&self.height, width)
    }
}

/// Parses a packed height string into exactly `width` samples.
///
/// Whitespace around each sample is ignored. A string with more or
/// fewer than `width` samples is rejected rather than padded or
/// truncated.
pub fn parse_heights(raw: &str, width: usize) -> Result<Vec<f64>, HscanError> {
    let mut samples = Vec::with_capacity(width);
    for (index, token) in raw.split(HEIGHT_DELIMITER).enumerate() {
        if index == width {
            return Err(HscanError::Width {
                expected: width,
                actual: raw.split(HEIGHT_DELIMITER).count(),
            });
        }
        let sample = token
            .trim()
            .parse::<f64>()
            .map_err(|_| HscanError::Token {
                index,
                token: token.to_owned(),
            })?;
        samples.push(sample);
    }
    if samples.len() == width {
        Ok(samples)
    } else {
        Err(HscanError::Width {
            expected: width,
            actual: samples.len(),
        })
    }
}

/// Packs height samples into the delimited form stored in the
/// `height` column.
pub fn format_heights(samples: &[f64]) -> String {
    let mut packed = String::with_capacity(samples.len() * 8);
    for (idx, sample) in samples.iter().enumerate() {
        if idx > 0 {
            packed.push(HEIGHT_DELIMITER);
        }
        // Writing to a String can't fail.
        let _ = write!(packed, "{sample}");
    }
    packed
}
