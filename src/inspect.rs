//! Coverage inspector: scans an input tree and reports which periods are
//! present, where the year-level holes are, and the spatial extent of the
//! grid. The report seeds retrieval requests for the missing spans.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::data_io::reader::{InputFile, ReaderError};

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no datable files found under {0}")]
    Empty(PathBuf),
    #[error(transparent)]
    Reader(#[from] ReaderError),
}

/// Spatial extent in degrees, eastern-hemisphere positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

/// What one tree covers. Periods are `yyyymm`; an annual file counts as
/// all twelve months of its year.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    /// Earliest month present.
    pub first: u32,
    /// Last month of the contiguous run starting at `first`.
    pub last: u32,
    /// Calendar years with no data between `first` and the overall end.
    pub gaps: Vec<i32>,
    pub bbox: Option<BoundingBox>,
    /// (Δlat, Δlon) grid step.
    pub grid_step: Option<(f64, f64)>,
    pub file_count: usize,
}

/// Scan `root` (and its immediate year subdirectories) for datable files.
pub fn inspect(root: &Path) -> Result<CoverageReport, InspectError> {
    let mut months: BTreeSet<u32> = BTreeSet::new();
    let mut sample: Option<PathBuf> = None;
    let mut file_count = 0usize;

    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| InspectError::Scan {
            path: dir.clone(),
            source: e,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && dir == root {
                dirs.push(path);
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if let Some(period) = parse_period(name) {
                debug!("{} covers {:?}", name, period);
                file_count += 1;
                match period {
                    Period::Year(y) => months.extend((1..=12u32).map(|m| y * 100 + m)),
                    Period::Month(ym) | Period::Day(ym) => {
                        months.insert(ym);
                    }
                }
                if sample.is_none() && !name.ends_with(".gz") {
                    sample = Some(path);
                }
            }
        }
    }

    let first = *months
        .first()
        .ok_or_else(|| InspectError::Empty(root.to_path_buf()))?;
    let end = *months.last().unwrap_or(&first);
    let last = contiguous_end(&months, first);
    let gaps = year_gaps(&months, first, end);

    let (bbox, grid_step) = match sample {
        Some(path) => {
            let file = InputFile::open(&path)?;
            let lats = file.latitudes()?;
            let lons = file.longitudes()?;
            (bounding_box(&lats, &lons), step(&lats, &lons))
        }
        None => (None, None),
    };

    Ok(CoverageReport {
        first,
        last,
        gaps,
        bbox,
        grid_step,
        file_count,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Period {
    Year(u32),
    Month(u32),
    Day(u32),
}

/// Extract the date part of a known input filename: `era5_` files carry
/// 4, 6, or 8 digits; M2 files carry an 8-digit day between dots.
fn parse_period(name: &str) -> Option<Period> {
    let lower = name.to_ascii_lowercase();
    let datable = [".nc", ".nc4", ".nc.gz", ".nc4.gz"]
        .iter()
        .any(|suffix| lower.ends_with(suffix));
    if !datable {
        return None;
    }
    if let Some(rest) = lower.strip_prefix("era5_") {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        return match digits.len() {
            4 => Some(Period::Year(digits.parse().ok()?)),
            6 => Some(Period::Month(digits.parse().ok()?)),
            8 => Some(Period::Day(digits.parse::<u32>().ok()? / 100)),
            _ => None,
        };
    }
    if lower.starts_with("merra2_") {
        let digits = name
            .split('.')
            .find(|part| part.len() == 8 && part.chars().all(|c| c.is_ascii_digit()))?;
        return Some(Period::Day(digits.parse::<u32>().ok()? / 100));
    }
    None
}

/// Last month of the run of consecutive months starting at `first`.
fn contiguous_end(months: &BTreeSet<u32>, first: u32) -> u32 {
    let mut current = first;
    loop {
        let next = next_month(current);
        if months.contains(&next) {
            current = next;
        } else {
            return current;
        }
    }
}

fn next_month(ym: u32) -> u32 {
    if ym % 100 == 12 {
        (ym / 100 + 1) * 100 + 1
    } else {
        ym + 1
    }
}

/// Years with no months at all between the first and last covered month.
fn year_gaps(months: &BTreeSet<u32>, first: u32, end: u32) -> Vec<i32> {
    (first / 100..=end / 100)
        .filter(|y| months.range(y * 100 + 1..=y * 100 + 12).next().is_none())
        .map(|y| y as i32)
        .collect()
}

fn bounding_box(lats: &[f64], lons: &[f64]) -> Option<BoundingBox> {
    let (s, n) = min_max(lats)?;
    let (w, e) = min_max(lons)?;
    Some(BoundingBox {
        north: n,
        west: w,
        south: s,
        east: e,
    })
}

fn step(lats: &[f64], lons: &[f64]) -> Option<(f64, f64)> {
    let dlat = (lats.get(1)? - lats.first()?).abs();
    let dlon = (lons.get(1)? - lons.first()?).abs();
    Some((dlat, dlon))
}

fn min_max(axis: &[f64]) -> Option<(f64, f64)> {
    let first = *axis.first()?;
    Some(axis.iter().fold((first, first), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    }))
}
