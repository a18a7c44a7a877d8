use crate::{ScanMatrix, SurfaceError};
use hscan::{ScanId, SegId};
use serde::Serialize;
use std::io::{BufRead, Write};

const HEIGHT_HEADER: &str = "Height";

/// What a longitudinal profile measures distance by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LongitudinalAxis {
    /// Scan id.
    Id,

    /// The scan's longitudinal `OFFSET` (mm).
    Offset,
}

/// The first column of an exported profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DistanceColumn {
    /// A distance in millimeters, headed `DIST`.
    Dist,

    /// A scan id, headed `id`.
    Id,
}

impl DistanceColumn {
    pub fn header(self) -> &'static str {
        match self {
            Self::Dist => "DIST",
            Self::Id => "id",
        }
    }

    fn from_header(header: &str) -> Option<Self> {
        match header {
            "DIST" => Some(Self::Dist),
            "id" => Some(Self::Id),
            _ => None,
        }
    }
}

/// Where in the matrix a profile was sliced from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ProfileKind {
    /// One scan, across the lane.
    Transverse { id: ScanId, seg_id: SegId },

    /// One sample column, along the lane.
    Longitudinal {
        column: usize,
        axis: LongitudinalAxis,
        first_id: ScanId,
        last_id: ScanId,
    },
}

/// Heights along one row or column of a [`ScanMatrix`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub kind: ProfileKind,

    /// Position of each sample, see [`Profile::distance_column`].
    pub distance: Vec<f64>,

    /// Height of each sample (mm).
    pub height: Vec<f64>,
}

impl ScanMatrix {
    /// Returns the transverse profile of scan `id`.
    ///
    /// Sample `i` lies `i * tranStep` millimeters across the lane,
    /// using that scan's own `tranStep`.
    pub fn transverse_profile(&self, id: ScanId) -> Result<Profile, SurfaceError> {
        let row = self.position(id).ok_or(SurfaceError::RowNotFound(id))?;
        let meta = &self.meta()[row];
        let height = self.row(row).ok_or(SurfaceError::RowNotFound(id))?.to_vec();
        #[allow(clippy::cast_precision_loss)]
        let distance = (0..height.len())
            .map(|idx| meta.tran_step * idx as f64)
            .collect();
        Ok(Profile {
            kind: ProfileKind::Transverse {
                id,
                seg_id: meta.seg_id,
            },
            distance,
            height,
        })
    }

    /// Returns the longitudinal profile at sample column `column`,
    /// one point per loaded scan.
    pub fn longitudinal_profile(
        &self,
        column: usize,
        axis: LongitudinalAxis,
    ) -> Result<Profile, SurfaceError> {
        if column >= self.columns() {
            return Err(SurfaceError::ColumnOutOfRange {
                index: column,
                columns: self.columns(),
            });
        }
        let (distance, height): (Vec<f64>, Vec<f64>) = self
            .iter_rows()
            .map(|(meta, samples)| {
                let distance = match axis {
                    LongitudinalAxis::Id => f64::from(meta.id),
                    LongitudinalAxis::Offset => meta.offset,
                };
                (distance, samples[column])
            })
            .unzip();
        let ids = self.meta();
        Ok(Profile {
            kind: ProfileKind::Longitudinal {
                column,
                axis,
                first_id: ids.first().map_or(0, |meta| meta.id),
                last_id: ids.last().map_or(0, |meta| meta.id),
            },
            distance,
            height,
        })
    }
}

impl Profile {
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.height.len()
    }

    pub fn distance_column(&self) -> DistanceColumn {
        match self.kind {
            ProfileKind::Longitudinal {
                axis: LongitudinalAxis::Id,
                ..
            } => DistanceColumn::Id,
            _ => DistanceColumn::Dist,
        }
    }

    /// Returns the conventional download name for this profile.
    pub fn file_name(&self) -> String {
        match self.kind {
            ProfileKind::Transverse { id, seg_id } => {
                format!("transProfile_seg_{seg_id}_scan_{id}.csv")
            }
            ProfileKind::Longitudinal {
                column,
                first_id,
                last_id,
                ..
            } => format!("lonProfile_col_{column}_id_{first_id}_{last_id}.csv"),
        }
    }

    /// Writes this profile as a two-column table.
    ///
    /// ```text
    /// DIST,Height
    /// 0,-1.25
    /// 2,-1.5
    /// ```
    pub fn write_csv<W: Write>(&self, mut wtr: W) -> Result<(), SurfaceError> {
        writeln!(wtr, "{},{HEIGHT_HEADER}", self.distance_column().header())?;
        for (distance, height) in self.distance.iter().zip(self.height.iter()) {
            writeln!(wtr, "{distance},{height}")?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv(&self) -> String {
        let mut buf = Vec::with_capacity(self.len() * 16);
        // Writing to a Vec can't fail.
        let _ = self.write_csv(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Reads a table previously written by [`Profile::write_csv`].
    pub fn read_csv<R: BufRead>(rdr: R) -> Result<ProfileTable, SurfaceError> {
        let mut lines = rdr.lines().enumerate();

        let distance_column = match lines.next() {
            Some((_, header)) => {
                let header = header?;
                header
                    .trim_end()
                    .split_once(',')
                    .filter(|(_, height)| *height == HEIGHT_HEADER)
                    .and_then(|(distance, _)| DistanceColumn::from_header(distance))
                    .ok_or_else(|| SurfaceError::Csv {
                        line: 1,
                        reason: format!("unexpected header {header:?}"),
                    })?
            }
            None => {
                return Err(SurfaceError::Csv {
                    line: 1,
                    reason: "missing header".to_string(),
                })
            }
        };

        let mut table = ProfileTable {
            distance_column,
            distance: Vec::new(),
            height: Vec::new(),
        };
        for (idx, line) in lines {
            let line = line?;
            let line_no = idx + 1;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let mk_err = |reason: &str| SurfaceError::Csv {
                line: line_no,
                reason: format!("{reason} in {line:?}"),
            };
            let (distance, height) = line
                .split_once(',')
                .ok_or_else(|| mk_err("expected two columns"))?;
            table.distance.push(
                distance
                    .parse()
                    .map_err(|_| mk_err("invalid distance"))?,
            );
            table
                .height
                .push(height.parse().map_err(|_| mk_err("invalid height"))?);
        }
        Ok(table)
    }
}

/// Columns read back from an exported profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTable {
    pub distance_column: DistanceColumn,
    pub distance: Vec<f64>,
    pub height: Vec<f64>,
}
