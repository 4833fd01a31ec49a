//! Hub-height post-processing: read back an SRW wind file, extrapolate
//! a new speed column to the requested hub height from the two highest
//! measured speed columns, and rewrite the file in place.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use crate::math::wind::{extrapolate_speed, ProfileLaw};

#[derive(Error, Debug)]
pub enum HubHeightError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not a wind resource file: {reason}")]
    NotSrw { path: PathBuf, reason: String },
    #[error(
        "hub height {hub} m must exceed the highest measured level ({top} m) in {path}"
    )]
    HubTooLow { path: PathBuf, hub: f64, top: f64 },
}

/// Append a `Speed` column at `hub` metres to the SRW file at `path`.
/// Rows that are gap placeholders grow one empty cell so the column
/// count stays consistent.
pub fn add_hub_height_column(
    path: &Path,
    hub: f64,
    law: ProfileLaw,
) -> Result<(), HubHeightError> {
    let text = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut lines: Vec<String> = text.lines().map(|s| s.to_string()).collect();
    if lines.len() < 5 {
        return Err(not_srw(path, "fewer than five header lines"));
    }

    let names: Vec<String> = split(&lines[2]);
    let heights: Vec<f64> = split(&lines[4])
        .iter()
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| not_srw(path, "height row is not numeric"))?;
    if names.len() != heights.len() {
        return Err(not_srw(path, "name and height rows disagree"));
    }

    // The two highest-level speed columns drive the profile fit.
    let mut speeds: Vec<(usize, f64)> = names
        .iter()
        .enumerate()
        .filter(|(_, n)| n.trim() == "Speed")
        .map(|(i, _)| (i, heights[i]))
        .collect();
    speeds.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (hi_idx, hi_h) = match speeds.last() {
        Some(&v) => v,
        None => return Err(not_srw(path, "no speed columns")),
    };
    if hub <= hi_h {
        return Err(HubHeightError::HubTooLow {
            path: path.to_path_buf(),
            hub,
            top: hi_h,
        });
    }
    let (lo_idx, lo_h) = if speeds.len() >= 2 {
        speeds[speeds.len() - 2]
    } else {
        (hi_idx, hi_h)
    };

    if split(&lines[3]).len() != names.len() {
        return Err(not_srw(path, "ragged header rows"));
    }
    lines[2].push_str(",Speed");
    lines[3].push_str(",m/s");
    lines[4].push_str(&format!(",{:.0}", hub));

    for row in lines.iter_mut().skip(5) {
        let cells: Vec<&str> = row.split(',').collect();
        if cells.iter().all(|c| c.trim().is_empty()) {
            // Gap placeholder row: widen without a value.
            row.push(',');
            continue;
        }
        let lo = parse_cell(&cells, lo_idx).ok_or_else(|| not_srw(path, "bad speed cell"))?;
        let hi = parse_cell(&cells, hi_idx).ok_or_else(|| not_srw(path, "bad speed cell"))?;
        let v = extrapolate_speed(law, lo, lo_h, hi, hi_h, hub);
        row.push_str(&format!(",{:.4}", v));
    }

    let mut body = lines.join("\n");
    body.push('\n');
    fs::write(path, body).map_err(|e| io_err(path, e))?;
    info!(
        "appended {:.0} m speed column to {} ({} law from {} m / {} m)",
        hub,
        path.display(),
        law,
        lo_h,
        hi_h
    );
    Ok(())
}

fn split(line: &str) -> Vec<String> {
    line.split(',').map(|s| s.trim().to_string()).collect()
}

fn parse_cell(cells: &[&str], idx: usize) -> Option<f64> {
    cells.get(idx)?.trim().parse().ok()
}

fn io_err(path: &Path, source: std::io::Error) -> HubHeightError {
    HubHeightError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn not_srw(path: &Path, reason: &str) -> HubHeightError {
    HubHeightError::NotSrw {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn sample_srw() -> String {
        let mut s = String::new();
        s.push_str("40.0_-105.0,<city>,<state>,<country>,2020,40.0,-105.0,0\n");
        s.push_str("test wind file\n");
        s.push_str("Temperature,Pressure,Direction,Speed,Direction,Speed\n");
        s.push_str("C,atm,degrees,m/s,degrees,m/s\n");
        s.push_str("2,2,10,10,100,100\n");
        s.push_str("15.0,0.980000,270,5.0000,265,8.0000\n");
        s.push_str(",,,,,\n");
        s
    }

    #[test]
    fn test_appends_column() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(sample_srw().as_bytes()).unwrap();
        add_hub_height_column(f.path(), 120.0, ProfileLaw::Power).unwrap();
        let text = fs::read_to_string(f.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[2].ends_with(",Speed"));
        assert!(lines[3].ends_with(",m/s"));
        assert!(lines[4].ends_with(",120"));
        let cells: Vec<&str> = lines[5].split(',').collect();
        assert_eq!(cells.len(), 7);
        let v: f64 = cells[6].parse().unwrap();
        assert!(v > 8.0, "hub speed {} should exceed 100 m speed", v);
        // Gap placeholder widens with no value.
        assert_eq!(lines[6], ",,,,,,");
    }

    #[test]
    fn test_hub_below_top_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(sample_srw().as_bytes()).unwrap();
        let err = add_hub_height_column(f.path(), 80.0, ProfileLaw::Logarithmic).unwrap_err();
        assert!(matches!(err, HubHeightError::HubTooLow { .. }));
    }

    #[test]
    fn test_rejects_non_srw() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"Year,Month,Day\n2020,1,1\n").unwrap();
        let err = add_hub_height_column(f.path(), 120.0, ProfileLaw::Power).unwrap_err();
        assert!(matches!(err, HubHeightError::NotSrw { .. }));
    }
}
