use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use surface::{
    hscan::{ScanId, SegId},
    LongitudinalAxis, ScanQuery,
};

/// Inspect pavement height scans.
#[derive(Parser, Debug, Clone)]
pub struct Cli {
    /// SQLite database holding the scan table.
    #[arg(short, long, env = "RUTVIEW_DB")]
    pub db: PathBuf,

    /// Scan table name.
    #[arg(short, long, env = "RUTVIEW_TABLE", default_value = "pathway_raw_fm365_sep13")]
    pub table: String,

    #[command(subcommand)]
    pub cmd: Command,
}

/// Which scans to load.
#[derive(Args, Debug, Clone, Copy)]
pub struct Range {
    /// First scan id.
    #[arg(long, default_value_t = 1, conflicts_with = "segment")]
    pub min: ScanId,

    /// Last scan id [default: min + 50]
    #[arg(long, conflicts_with = "segment")]
    pub max: Option<ScanId>,

    /// Load a whole segment instead of an id range.
    #[arg(long)]
    pub segment: Option<SegId>,
}

impl Range {
    pub fn query(self) -> ScanQuery {
        match self.segment {
            Some(seg_id) => ScanQuery::Segment(seg_id),
            None => ScanQuery::IdRange {
                min: self.min,
                max: self.max.unwrap_or_else(|| self.min.saturating_add(50)),
            },
        }
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print route, DFO span and matrix shape.
    Summary {
        #[command(flatten)]
        range: Range,
    },

    /// Render the height matrix.
    Heatmap {
        #[command(flatten)]
        range: Range,

        /// PNG file path.
        #[arg(short, long, default_value = "surface.png")]
        out: PathBuf,

        /// Print the heatmap as JSON instead.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Heights across the lane for one scan.
    Transverse {
        #[command(flatten)]
        range: Range,

        /// Scan id.
        #[arg(long)]
        id: ScanId,

        #[command(flatten)]
        output: Output,
    },

    /// Heights along the lane for one sample column.
    Longitudinal {
        #[command(flatten)]
        range: Range,

        /// Transverse sample index.
        #[arg(short, long)]
        column: usize,

        #[arg(long, value_enum, default_value_t = Axis::Id)]
        axis: Axis,

        #[command(flatten)]
        output: Output,
    },
}

#[derive(Args, Debug, Clone, Copy)]
pub struct Output {
    #[arg(short, long, value_enum, default_value_t = Format::Csv)]
    pub format: Format,

    /// Write CSV to the profile's conventional file name.
    #[arg(long, default_value_t = false)]
    pub save: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Print CSV to stdout.
    Csv,

    /// Print JSON to stdout.
    Json,

    /// Plot to terminal.
    Plot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Axis {
    /// Scan id.
    Id,

    /// Longitudinal offset (mm).
    Offset,
}

impl From<Axis> for LongitudinalAxis {
    fn from(axis: Axis) -> Self {
        match axis {
            Axis::Id => LongitudinalAxis::Id,
            Axis::Offset => LongitudinalAxis::Offset,
        }
    }
}
