//! Input-file catalog: detects which reanalysis family a directory tree
//! holds and locates the file covering a given date, tolerating filename
//! prefix variants, yearly subdirectories, the dataset-version
//! substitution rule, and gzip-compressed inputs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::{debug, info, warn};
use thiserror::Error;

/// Distinctive filename substrings for the M2 collections.
const M2_RAD_TAG: &str = "tavg1_2d_rad_Nx";
const M2_SLV_TAG: &str = "tavg1_2d_slv_Nx";

/// Known M2 stream-version prefixes, in the order they are attempted.
const M2_VERSIONS: [&str; 4] = ["MERRA2_400.", "MERRA2_300.", "MERRA2_200.", "MERRA2_100."];
const M2_SUFFIXES: [&str; 2] = [".nc4", ".nc"];
const E5_PREFIXES: [&str; 2] = ["era5_", "ERA5_"];
const E5_SUFFIX: &str = ".nc";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot scan input directory {0}: {1}")]
    Scan(PathBuf, #[source] io::Error),
}

/// Which provider family a directory holds and, for M2, which collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// M2 radiation collection (daily files, solar variables).
    M2Solar,
    /// M2 single-level collection (daily files, wind/temperature/pressure).
    M2Wind,
    /// E5 monthly or annual files on the hours-since-1900 axis.
    Era5,
}

impl DatasetKind {
    pub fn is_m2(self) -> bool {
        matches!(self, Self::M2Solar | Self::M2Wind)
    }
}

/// Logical weather variables the pipeline asks for; the catalog maps them
/// to the dataset's native names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WxVar {
    Ghi,
    GhiNet,
    Albedo,
    Temp2m,
    Temp10m,
    Pressure,
    U2,
    V2,
    U10,
    V10,
    U50,
    V50,
    U100,
    V100,
}

impl DatasetKind {
    /// Native variable name for a logical variable, or `None` when the
    /// dataset does not carry it. E5 albedo is handled separately because
    /// it merges two candidate variables.
    pub fn var_name(self, var: WxVar) -> Option<&'static str> {
        use WxVar::*;
        match self {
            Self::M2Solar => match var {
                Ghi => Some("SWGDN"),
                GhiNet => Some("SWGNT"),
                Albedo => Some("ALBEDO"),
                _ => None,
            },
            Self::M2Wind => match var {
                Temp2m => Some("T2M"),
                Temp10m => Some("T10M"),
                Pressure => Some("PS"),
                U2 => Some("U2M"),
                V2 => Some("V2M"),
                U10 => Some("U10M"),
                V10 => Some("V10M"),
                U50 => Some("U50M"),
                V50 => Some("V50M"),
                _ => None,
            },
            Self::Era5 => match var {
                Ghi => Some("ssrd"),
                GhiNet => Some("ssr"),
                Temp2m => Some("t2m"),
                Pressure => Some("sp"),
                U10 => Some("u10"),
                V10 => Some("v10"),
                U100 => Some("u100"),
                V100 => Some("v100"),
                _ => None,
            },
        }
    }
}

/// A detected input tree: root directory plus dataset family.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
    kind: DatasetKind,
}

impl Catalog {
    /// Scan the root directory once and classify the tree. Anything that
    /// is not recognizably M2 is treated as E5.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let root = root.as_ref().to_path_buf();
        let entries = fs::read_dir(&root).map_err(|e| CatalogError::Scan(root.clone(), e))?;
        let mut names = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                // Yearly subdirectory layout.
                if let Ok(sub) = fs::read_dir(&path) {
                    names.extend(
                        sub.flatten()
                            .map(|e| e.file_name().to_string_lossy().into_owned()),
                    );
                }
            } else {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        let mut kind = DatasetKind::Era5;
        for name in &names {
            if name.contains(M2_RAD_TAG) {
                kind = DatasetKind::M2Solar;
                break;
            }
            if name.contains(M2_SLV_TAG) {
                kind = DatasetKind::M2Wind;
                break;
            }
        }
        debug!("catalog {}: detected {:?}", root.display(), kind);
        Ok(Self { root, kind })
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locate the daily file for `year-month-day`, or a miss.
    pub fn locate_day(&self, year: i32, month: u8, day: u8) -> Option<PathBuf> {
        self.locate(year, Some(month), Some(day))
    }

    /// Locate the monthly file for `year-month`, or a miss.
    pub fn locate_month(&self, year: i32, month: u8) -> Option<PathBuf> {
        self.locate(year, Some(month), None)
    }

    /// Locate the annual file for `year`, or a miss.
    pub fn locate_year(&self, year: i32) -> Option<PathBuf> {
        self.locate(year, None, None)
    }

    /// Attempt every known (prefix, layout, version-substitution)
    /// combination for the date. A miss is `None`; the caller decides
    /// whether that is fatal.
    fn locate(&self, year: i32, month: Option<u8>, day: Option<u8>) -> Option<PathBuf> {
        let date = match (month, day) {
            (Some(m), Some(d)) => format!("{:04}{:02}{:02}", year, m, d),
            (Some(m), None) => format!("{:04}{:02}", year, m),
            _ => format!("{:04}", year),
        };

        for name in self.candidate_names(&date) {
            for dir in [self.root.clone(), self.root.join(format!("{:04}", year))] {
                if let Some(path) = materialize(&dir.join(&name)) {
                    return Some(path);
                }
            }
        }
        None
    }

    /// Candidate filenames in attempt order, including the
    /// version-substitution fallback (`…300 → …301`, `…400 → …401`).
    fn candidate_names(&self, date: &str) -> Vec<String> {
        let mut names = Vec::new();
        match self.kind {
            DatasetKind::M2Solar | DatasetKind::M2Wind => {
                let tag = if self.kind == DatasetKind::M2Solar {
                    M2_RAD_TAG
                } else {
                    M2_SLV_TAG
                };
                for version in M2_VERSIONS {
                    for suffix in M2_SUFFIXES {
                        names.push(format!("{}{}.{}{}", version, tag, date, suffix));
                    }
                }
                // reprocessed-stream fallback: bump the version tag
                for version in M2_VERSIONS {
                    if let Some(sub) = bump_version(version) {
                        for suffix in M2_SUFFIXES {
                            names.push(format!("{}{}.{}{}", sub, tag, date, suffix));
                        }
                    }
                }
            }
            DatasetKind::Era5 => {
                for prefix in E5_PREFIXES {
                    names.push(format!("{}{}{}", prefix, date, E5_SUFFIX));
                }
            }
        }
        names
    }
}

/// `MERRA2_300.` becomes `MERRA2_301.`; likewise for the other streams.
fn bump_version(prefix: &str) -> Option<String> {
    for tag in ["100", "200", "300", "400"] {
        if let Some(base) = prefix.strip_suffix(&format!("{}.", tag)) {
            let bumped: u32 = tag.parse::<u32>().ok()? + 1;
            return Some(format!("{}{}.", base, bumped));
        }
    }
    None
}

/// Return the path if the file exists, inflating a `.gz` sibling to the
/// plain file once per run when needed. The inflation is idempotent.
fn materialize(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let mut gz = path.as_os_str().to_owned();
    gz.push(".gz");
    let gz = PathBuf::from(gz);
    if gz.is_file() {
        match inflate(&gz, path) {
            Ok(()) => {
                info!("inflated {} -> {}", gz.display(), path.display());
                return Some(path.to_path_buf());
            }
            Err(e) => {
                warn!("failed to inflate {}: {}", gz.display(), e);
                return None;
            }
        }
    }
    None
}

fn inflate(gz: &Path, target: &Path) -> io::Result<()> {
    let input = fs::File::open(gz)?;
    let mut decoder = GzDecoder::new(io::BufReader::new(input));
    let mut output = fs::File::create(target)?;
    io::copy(&mut decoder, &mut output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_version() {
        assert_eq!(bump_version("MERRA2_300."), Some("MERRA2_301.".to_string()));
        assert_eq!(bump_version("MERRA2_400."), Some("MERRA2_401.".to_string()));
        assert_eq!(bump_version("era5_"), None);
    }

    #[test]
    fn test_variable_maps() {
        assert_eq!(DatasetKind::M2Solar.var_name(WxVar::Ghi), Some("SWGDN"));
        assert_eq!(DatasetKind::M2Wind.var_name(WxVar::U50), Some("U50M"));
        assert_eq!(DatasetKind::Era5.var_name(WxVar::Ghi), Some("ssrd"));
        assert_eq!(DatasetKind::Era5.var_name(WxVar::U50), None);
        assert_eq!(DatasetKind::M2Solar.var_name(WxVar::Pressure), None);
    }
}
