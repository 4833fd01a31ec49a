//! Variable reader for one NetCDF input file.
//!
//! Returns per-hour 2-D arrays in the file's native layout, maps fill
//! values to NaN, applies packed-data scale/offset, and merges the
//! optional `expver` dimension (preliminary vs final data layers) by
//! picking whichever layer carries a real value at each cell.

use std::cell::Cell;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{info, warn};
use ndarray::Array2;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("NetCDF error in {path}: {source}")]
    Netcdf {
        path: PathBuf,
        source: netcdf::Error,
    },

    #[error("variable not found: {0}")]
    MissingVariable(String),

    #[error("unexpected shape for variable {0}")]
    Shape(String),

    #[error("coordinate axis not found in {0}")]
    MissingAxis(PathBuf),

    #[error("{path} is an HTML error payload from the archive: {message}")]
    HtmlPayload { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

const LAT_NAMES: [&str; 2] = ["lat", "latitude"];
const LON_NAMES: [&str; 2] = ["lon", "longitude"];
const TIME_NAMES: [&str; 2] = ["time", "valid_time"];

/// A single open input file. Files are read-only and opened per access;
/// the assembler drops this handle before moving to the next file.
pub struct InputFile {
    file: netcdf::File,
    path: PathBuf,
    expver_logged: Cell<bool>,
}

impl InputFile {
    /// Open a NetCDF dataset. A file that fails to parse is sniffed for
    /// an HTML error payload left behind by a failed retrieval, so the
    /// server's message reaches the log instead of a bare format error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReaderError> {
        let path = path.as_ref().to_path_buf();
        match netcdf::open(&path) {
            Ok(file) => Ok(Self {
                file,
                path,
                expver_logged: Cell::new(false),
            }),
            Err(source) => {
                if let Some(message) = sniff_html_payload(&path)? {
                    warn!("{}: archive error payload: {}", path.display(), message);
                    Err(ReaderError::HtmlPayload { path, message })
                } else {
                    Err(ReaderError::Netcdf { path, source })
                }
            }
        }
    }

    /// Latitude axis vector in file order.
    pub fn latitudes(&self) -> Result<Vec<f64>, ReaderError> {
        self.axis(&LAT_NAMES)
    }

    /// Longitude axis vector in file order.
    pub fn longitudes(&self) -> Result<Vec<f64>, ReaderError> {
        self.axis(&LON_NAMES)
    }

    /// The time axis as integers. For E5 these are hours since
    /// 1900-01-01 00:00; for M2 daily files a conventional 24-entry
    /// minute offset that the assembler ignores beyond its length.
    pub fn time_values(&self) -> Result<Vec<i64>, ReaderError> {
        let var = self
            .find_variable(&TIME_NAMES)
            .ok_or_else(|| ReaderError::MissingVariable("time".to_string()))?;
        let values: Vec<f64> = var
            .get_values(..)
            .map_err(|e| self.nc_err(e))?;
        Ok(values.into_iter().map(|v| v.round() as i64).collect())
    }

    /// Whether the named variable exists in this file.
    pub fn has_variable(&self, name: &str) -> bool {
        self.file.variable(name).is_some()
    }

    /// Read a 3-D (time, lat, lon) or 4-D (time, expver, lat, lon)
    /// variable as one 2-D frame per hour. Fill values become NaN;
    /// packed data is unscaled; expver layers are merged element-wise.
    pub fn read_hours(&self, name: &str) -> Result<Vec<Array2<f64>>, ReaderError> {
        let var = self
            .file
            .variable(name)
            .ok_or_else(|| ReaderError::MissingVariable(name.to_string()))?;

        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let raw: Vec<f64> = var.get_values(..).map_err(|e| self.nc_err(e))?;

        let fill = attr_f64(&var, "_FillValue").or_else(|| attr_f64(&var, "missing_value"));
        let scale = attr_f64(&var, "scale_factor").unwrap_or(1.0);
        let offset = attr_f64(&var, "add_offset").unwrap_or(0.0);
        let unpack = |v: f64| -> f64 {
            if fill.is_some_and(|f| v == f) || !v.is_finite() {
                f64::NAN
            } else {
                v * scale + offset
            }
        };

        match shape.as_slice() {
            [nt, ny, nx] => {
                let mut out = Vec::with_capacity(*nt);
                for t in 0..*nt {
                    let start = t * ny * nx;
                    let frame = Array2::from_shape_fn((*ny, *nx), |(j, i)| {
                        unpack(raw[start + j * nx + i])
                    });
                    out.push(frame);
                }
                Ok(out)
            }
            [nt, 2, ny, nx] => {
                if !self.expver_logged.replace(true) {
                    info!(
                        "{}: merging preliminary/final expver layers for {}",
                        self.path.display(),
                        name
                    );
                }
                let plane = ny * nx;
                let mut out = Vec::with_capacity(*nt);
                for t in 0..*nt {
                    let start = t * 2 * plane;
                    let frame = Array2::from_shape_fn((*ny, *nx), |(j, i)| {
                        let a = unpack(raw[start + j * nx + i]);
                        let b = unpack(raw[start + plane + j * nx + i]);
                        if a.is_finite() { a } else { b }
                    });
                    out.push(frame);
                }
                Ok(out)
            }
            _ => Err(ReaderError::Shape(name.to_string())),
        }
    }

    fn axis(&self, names: &[&str]) -> Result<Vec<f64>, ReaderError> {
        let var = self
            .find_variable(names)
            .ok_or_else(|| ReaderError::MissingAxis(self.path.clone()))?;
        var.get_values(..).map_err(|e| self.nc_err(e))
    }

    fn find_variable(&self, names: &[&str]) -> Option<netcdf::Variable<'_>> {
        names.iter().find_map(|n| self.file.variable(n))
    }

    fn nc_err(&self, source: netcdf::Error) -> ReaderError {
        ReaderError::Netcdf {
            path: self.path.clone(),
            source,
        }
    }
}

/// Numeric attribute as f64, whichever width the file stored it at.
fn attr_f64(var: &netcdf::Variable<'_>, name: &str) -> Option<f64> {
    use netcdf::AttributeValue::*;
    match var.attribute(name)?.value().ok()? {
        Schar(v) => Some(v as f64),
        Uchar(v) => Some(v as f64),
        Short(v) => Some(v as f64),
        Ushort(v) => Some(v as f64),
        Int(v) => Some(v as f64),
        Uint(v) => Some(v as f64),
        Longlong(v) => Some(v as f64),
        Ulonglong(v) => Some(v as f64),
        Float(v) => Some(v as f64),
        Double(v) => Some(v),
        _ => None,
    }
}

/// Detect the tell-tale HTML error page a failed retrieval leaves on
/// disk; returns the server's message with markup stripped.
fn sniff_html_payload(path: &Path) -> Result<Option<String>, std::io::Error> {
    let mut head = vec![0u8; 4096];
    let n = fs::File::open(path)?.read(&mut head)?;
    head.truncate(n);
    let text = String::from_utf8_lossy(&head);
    let lowered = text.to_lowercase();
    if !(lowered.contains("content-type:text/html")
        || lowered.contains("content-type: text/html")
        || lowered.trim_start().starts_with("<html")
        || lowered.trim_start().starts_with("<!doctype html"))
    {
        return Ok(None);
    }
    Ok(Some(strip_markup(&text)))
}

fn strip_markup(text: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    let collapsed: Vec<&str> = out.split_whitespace().collect();
    let mut message = collapsed.join(" ");
    // Cut on a character boundary; server pages are not always ASCII.
    if let Some((idx, _)) = message.char_indices().nth(200) {
        message.truncate(idx);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup() {
        let html = "Content-type:text/html\n<html><body><h1>404</h1>\
                    <p>variable  not\n available</p></body></html>";
        assert_eq!(strip_markup(html), "Content-type:text/html 404 variable not available");
    }

    #[test]
    fn test_strip_markup_cuts_multibyte_text_cleanly() {
        // A non-ASCII character straddling the cut point must not panic.
        let html = format!("<html><body>{}é tail</body></html>", "x".repeat(199));
        let msg = strip_markup(&html);
        assert_eq!(msg.chars().count(), 200);
        assert!(msg.ends_with('é'));
    }

    #[test]
    fn test_sniff_rejects_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.nc");
        fs::write(&path, [0x89u8, 0x48, 0x44, 0x46, 0x0d, 0x0a]).unwrap();
        assert!(sniff_html_payload(&path).unwrap().is_none());
    }

    #[test]
    fn test_sniff_detects_error_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.nc");
        fs::write(&path, "<html><body>request rejected</body></html>").unwrap();
        let msg = sniff_html_payload(&path).unwrap().unwrap();
        assert!(msg.contains("request rejected"));
    }
}
