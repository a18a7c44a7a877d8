//! # Pavement surface profiling
//!
//! `surface` turns raw height-scan rows into a [`ScanMatrix`] and
//! slices it into transverse and longitudinal [`Profile`]s or a
//! [`HeatmapView`] for display.

mod error;
mod extractor;
mod heatmap;
mod matrix;
mod profile;
mod source;
mod sqlite;

pub use crate::{
    error::SurfaceError,
    extractor::{
        ScanMatrixExtractor, ScanMatrixExtractorBuilder, DEFAULT_ID_BOUNDS, DEFAULT_MAX_SPAN,
    },
    heatmap::{CellHover, HeatmapView, HoverMeta},
    matrix::{ScanMatrix, ScanSummary},
    profile::{DistanceColumn, LongitudinalAxis, Profile, ProfileKind, ProfileTable},
    source::{MemSource, ScanQuery, ScanSource},
    sqlite::SqliteSource,
};
pub use hscan;
