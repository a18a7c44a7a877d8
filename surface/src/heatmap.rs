//! Heatmap projection of a [`ScanMatrix`].

use crate::ScanMatrix;
use hscan::{ScanId, SegId};
use serde::{ser::SerializeStruct, Serialize, Serializer};

/// A read-only view of a matrix prepared for heatmap display.
///
/// Cell `(row, col)` is the height at transverse sample `col` of
/// scan `row_labels()[row]`.
#[derive(Debug, Clone, Copy)]
pub struct HeatmapView<'a> {
    matrix: &'a ScanMatrix,
}

/// Annotation for a single heatmap cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellHover {
    pub id: ScanId,
    pub seg_id: SegId,

    /// Distance from origin (miles).
    pub dfo: f64,

    /// Longitudinal offset (mm).
    pub lon_offset: f64,

    /// Transverse sample index.
    pub trans_id: usize,

    /// Transverse offset (mm).
    pub trans_offset: f64,

    /// Height (mm).
    pub height: f64,
}

/// Per-cell annotation, derived on demand from per-scan metadata.
#[derive(Debug, Clone, Copy)]
pub struct HoverMeta<'a> {
    matrix: &'a ScanMatrix,
}

impl ScanMatrix {
    pub fn heatmap(&self) -> HeatmapView<'_> {
        HeatmapView { matrix: self }
    }
}

impl<'a> HeatmapView<'a> {
    /// Splits this view into (values, row labels, hover metadata).
    pub fn into_parts(self) -> (&'a [f64], Vec<ScanId>, HoverMeta<'a>) {
        (self.values(), self.row_labels(), self.hover())
    }

    /// Row-major samples, `columns()` per row.
    pub fn values(&self) -> &'a [f64] {
        self.matrix.values()
    }

    pub fn rows(&self) -> usize {
        self.matrix.rows()
    }

    pub fn columns(&self) -> usize {
        self.matrix.columns()
    }

    pub fn row_labels(&self) -> Vec<ScanId> {
        self.matrix.ids()
    }

    pub fn hover(&self) -> HoverMeta<'a> {
        HoverMeta {
            matrix: self.matrix,
        }
    }

    /// Returns the lowest and highest finite samples, if any.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values()
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |range, v| match range {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
            })
    }
}

impl<'a> HoverMeta<'a> {
    pub fn get(&self, row: usize, col: usize) -> Option<CellHover> {
        let meta = self.matrix.meta().get(row)?;
        let height = self.matrix.get(row, col)?;
        #[allow(clippy::cast_precision_loss)]
        let trans_offset = col as f64 * meta.tran_step;
        Some(CellHover {
            id: meta.id,
            seg_id: meta.seg_id,
            dfo: meta.dfo,
            lon_offset: meta.offset,
            trans_id: col,
            trans_offset,
            height,
        })
    }

    /// Returns every cell's annotation in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = CellHover> + 'a {
        let matrix = self.matrix;
        matrix.iter_rows().flat_map(|(meta, samples)| {
            samples.iter().enumerate().map(move |(col, height)| {
                #[allow(clippy::cast_precision_loss)]
                let trans_offset = col as f64 * meta.tran_step;
                CellHover {
                    id: meta.id,
                    seg_id: meta.seg_id,
                    dfo: meta.dfo,
                    lon_offset: meta.offset,
                    trans_id: col,
                    trans_offset,
                    height: *height,
                }
            })
        })
    }
}

/// Serializes as parallel per-scan arrays plus one height array per
/// scan; transverse offsets are `trans_id * tran_step[row]`.
impl<'a> Serialize for HeatmapView<'a> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Rows<'a>(&'a ScanMatrix);

        impl<'a> Serialize for Rows<'a> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_seq(self.0.iter_rows().map(|(_, samples)| samples))
            }
        }

        let meta = self.matrix.meta();
        let mut state = serializer.serialize_struct("HeatmapView", 7)?;
        state.serialize_field("columns", &self.columns())?;
        state.serialize_field("id", &self.row_labels())?;
        state.serialize_field(
            "seg_id",
            &meta.iter().map(|m| m.seg_id).collect::<Vec<_>>(),
        )?;
        state.serialize_field("dfo", &meta.iter().map(|m| m.dfo).collect::<Vec<_>>())?;
        state.serialize_field(
            "lon_offset",
            &meta.iter().map(|m| m.offset).collect::<Vec<_>>(),
        )?;
        state.serialize_field(
            "tran_step",
            &meta.iter().map(|m| m.tran_step).collect::<Vec<_>>(),
        )?;
        state.serialize_field("height", &Rows(self.matrix))?;
        state.end()
    }
}
