#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

mod options;

use anyhow::{anyhow, Error as AnyError};
use clap::Parser;
use log::info;
use options::{Cli, Command as CliCmd, Format, Output};
use plotters::{
    coord::Shift,
    prelude::{BitMapBackend, DrawingArea, IntoDrawingArea, WHITE},
    style::HSLColor,
};
use serde::Serialize;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};
use surface::{Profile, ProfileKind, ScanMatrix, ScanMatrixExtractor, SqliteSource};
use textplots::{Chart, Plot, Shape};

fn main() -> Result<(), AnyError> {
    let Cli { db, table, cmd } = Cli::parse();

    env_logger::init();

    let extractor = ScanMatrixExtractor::builder()
        .source(SqliteSource::open(&db, &table)?)
        .build()?;

    match cmd {
        CliCmd::Summary { range } => {
            let matrix = extractor.fetch(range.query())?;
            print_summary(&matrix);
        }
        CliCmd::Heatmap { range, out, json } => {
            let matrix = extractor.fetch(range.query())?;
            if json {
                print_json(&matrix.heatmap())?;
            } else {
                write_heatmap(&matrix, &out)?;
            }
        }
        CliCmd::Transverse { range, id, output } => {
            let matrix = extractor.fetch(range.query())?;
            emit(&matrix.transverse_profile(id)?, output)?;
        }
        CliCmd::Longitudinal {
            range,
            column,
            axis,
            output,
        } => {
            let matrix = extractor.fetch(range.query())?;
            emit(&matrix.longitudinal_profile(column, axis.into())?, output)?;
        }
    };
    Ok(())
}

fn print_summary(matrix: &ScanMatrix) {
    let summary = matrix.summary();
    println!("{summary}");
    println!(
        "ids {}..={}, {} scans x {} samples",
        summary.first_id, summary.last_id, summary.rows, summary.columns
    );
    println!(
        "mean tranStep {} mm, mean lonStep {} mm",
        summary.mean_tran_step, summary.mean_lon_step
    );
}

fn emit(profile: &Profile, Output { format, save }: Output) -> Result<(), AnyError> {
    if save {
        let path = profile.file_name();
        profile.write_csv(BufWriter::new(File::create(&path)?))?;
        eprintln!("wrote {path}");
    }
    match format {
        Format::Csv if save => (),
        Format::Csv => print_csv(profile)?,
        Format::Json => print_json(profile)?,
        Format::Plot => plot_ascii(profile),
    };
    Ok(())
}

/// # Example with gnuplot
///
/// ```sh
/// rutview --db scans.db transverse --id 12 | tr ',' ' ' > /tmp/plot && gnuplot -p -e "plot '/tmp/plot' using 1:2 with lines"
/// ```
fn print_csv(profile: &Profile) -> Result<(), AnyError> {
    let stdout = std::io::stdout().lock();
    profile.write_csv(stdout)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AnyError> {
    let json = serde_json::to_string(value)?;
    println!("{json}");
    Ok(())
}

fn plot_ascii(profile: &Profile) {
    let plot_data: Vec<(f32, f32)> = profile
        .distance
        .iter()
        .zip(profile.height.iter())
        .map(|(distance, height)| (*distance as f32, *height as f32))
        .collect();
    let (xmin, xmax) = match (plot_data.first(), plot_data.last()) {
        (Some(first), Some(last)) => (first.0, last.0.max(first.0 + 1.0)),
        _ => return,
    };
    match profile.kind {
        ProfileKind::Transverse { id, .. } => println!("transverse profile, scan {id}"),
        ProfileKind::Longitudinal { column, .. } => {
            println!("longitudinal profile, column {column}");
        }
    }
    Chart::new(300, 150, xmin, xmax)
        .lineplot(&Shape::Lines(&plot_data))
        .display();
}

/// Writes one pixel per sample, scans bottom to top and transverse
/// samples right to left.
fn write_heatmap(matrix: &ScanMatrix, out: &Path) -> Result<(), AnyError> {
    let (width, height) = (matrix.columns() as u32, matrix.rows() as u32);
    let root = BitMapBackend::new(out, (width, height)).into_drawing_area();
    let (lo, hi) = draw_heatmap(&root, matrix)?;
    info!(
        "wrote {width}x{height} heatmap to {out:?}, heights {lo}~{hi} mm ({})",
        matrix.summary()
    );
    Ok(())
}

/// Draws `matrix` onto `root`, which must be `columns x rows` pixels,
/// returning the height range the colormap spans.
fn draw_heatmap(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    matrix: &ScanMatrix,
) -> Result<(f64, f64), AnyError> {
    let (lo, hi) = matrix
        .heatmap()
        .value_range()
        .ok_or_else(|| anyhow!("no finite heights to draw"))?;
    let (rows, columns) = (matrix.rows(), matrix.columns());

    root.fill(&WHITE)?;
    for (row, (_, samples)) in matrix.iter_rows().enumerate() {
        for (col, sample) in samples.iter().enumerate() {
            if sample.is_finite() {
                let pixel = pixel_of(row, col, rows, columns);
                root.draw_pixel(pixel, &colormap(*sample, lo, hi))?;
            }
        }
    }
    root.present()?;
    Ok((lo, hi))
}

/// Image coordinate of sample (`row`, `col`): row 0 on the bottom
/// edge, column 0 on the right edge.
fn pixel_of(row: usize, col: usize, rows: usize, columns: usize) -> (i32, i32) {
    let x = (columns - 1 - col) as i32;
    let y = (rows - 1 - row) as i32;
    (x, y)
}

/// Maps `value` within `[lo, hi]` from blue (low) to red (high).
fn colormap(value: f64, lo: f64, hi: f64) -> HSLColor {
    let t = if hi > lo { (value - lo) / (hi - lo) } else { 0.5 };
    HSLColor((1.0 - t) * 240.0 / 360.0, 0.9, 0.5)
}
