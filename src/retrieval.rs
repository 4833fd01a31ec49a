//! Retrieval front-end: builds the request payload for the external
//! climate-data archive and tracks the trivial job lifecycle. The HTTP
//! transport is supplied by the caller behind [`ArchiveClient`]; the core
//! only defines the payload and treats "file appears in the target
//! directory" as completion.

use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::inspect::CoverageReport;
use crate::time_utils::days_in_month;

/// Archive-side names of the variables one assembly run consumes.
pub const DEFAULT_E5_VARIABLES: [&str; 9] = [
    "surface_solar_radiation_downwards",
    "surface_net_solar_radiation",
    "2m_temperature",
    "surface_pressure",
    "10m_u_component_of_wind",
    "10m_v_component_of_wind",
    "100m_u_component_of_wind",
    "100m_v_component_of_wind",
    "near_ir_albedo_for_direct_radiation",
];

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("invalid period: {0}")]
    BadPeriod(String),
    #[error("archive rejected the request: {0}")]
    Rejected(String),
    #[error("retrieved file never appeared under {0}")]
    NeverArrived(PathBuf),
}

/// Target period: a whole year, one month, or one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Year(i32),
    Month(i32, u8),
    Day(i32, u8, u8),
}

impl Period {
    /// Parse `YYYY`, `YYYYMM`, or `YYYYMMDD`.
    pub fn parse(s: &str) -> Result<Self, RetrievalError> {
        let bad = || RetrievalError::BadPeriod(s.to_string());
        if !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(bad());
        }
        match s.len() {
            4 => Ok(Self::Year(s.parse().map_err(|_| bad())?)),
            6 => {
                let (y, m) = s.split_at(4);
                Ok(Self::Month(
                    y.parse().map_err(|_| bad())?,
                    m.parse().map_err(|_| bad())?,
                ))
            }
            8 => {
                let (y, rest) = s.split_at(4);
                let (m, d) = rest.split_at(2);
                Ok(Self::Day(
                    y.parse().map_err(|_| bad())?,
                    m.parse().map_err(|_| bad())?,
                    d.parse().map_err(|_| bad())?,
                ))
            }
            _ => Err(bad()),
        }
    }

    pub fn year(&self) -> i32 {
        match *self {
            Self::Year(y) | Self::Month(y, _) | Self::Day(y, _, _) => y,
        }
    }

    /// Filename the archive product lands under.
    pub fn file_name(&self) -> String {
        match *self {
            Self::Year(y) => format!("era5_{:04}.nc", y),
            Self::Month(y, m) => format!("era5_{:04}{:02}.nc", y, m),
            Self::Day(y, m, d) => format!("era5_{:04}{:02}{:02}.nc", y, m, d),
        }
    }
}

/// The payload submitted to the archive.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalRequest {
    pub product_type: &'static str,
    pub format: &'static str,
    pub variable: Vec<String>,
    pub year: String,
    pub month: Vec<String>,
    pub day: Vec<String>,
    pub time: Vec<String>,
    /// `[N, W, S, E]` in degrees.
    pub area: [f64; 4],
    /// `[Δlat, Δlon]` in degrees.
    pub grid: [f64; 2],
}

impl RetrievalRequest {
    pub fn new(period: Period, area: [f64; 4], grid: [f64; 2]) -> Result<Self, RetrievalError> {
        let (months, days) = match period {
            Period::Year(_) => (
                (1u8..=12).collect::<Vec<_>>(),
                // Widest month; the archive drops nonexistent dates.
                (1u8..=31).collect::<Vec<_>>(),
            ),
            Period::Month(y, m) => {
                if !(1..=12).contains(&m) {
                    return Err(RetrievalError::BadPeriod(format!("{:04}{:02}", y, m)));
                }
                (vec![m], (1..=days_in_month(y, m)).collect())
            }
            Period::Day(y, m, d) => {
                if !(1..=12).contains(&m) || d == 0 || d > days_in_month(y, m) {
                    return Err(RetrievalError::BadPeriod(format!(
                        "{:04}{:02}{:02}",
                        y, m, d
                    )));
                }
                (vec![m], vec![d])
            }
        };
        Ok(Self {
            product_type: "reanalysis",
            format: "netcdf",
            variable: DEFAULT_E5_VARIABLES.iter().map(|v| v.to_string()).collect(),
            year: format!("{:04}", period.year()),
            month: months.iter().map(|m| format!("{:02}", m)).collect(),
            day: days.iter().map(|d| format!("{:02}", d)).collect(),
            time: (0u8..24).map(|h| format!("{:02}:00", h)).collect(),
            area,
            grid,
        })
    }

    /// Build a request for one gap year reported by the inspector,
    /// reusing its bounding box and grid step.
    pub fn for_gap_year(report: &CoverageReport, year: i32) -> Result<Self, RetrievalError> {
        let bbox = report.bbox.unwrap_or(crate::inspect::BoundingBox {
            north: 90.0,
            west: -180.0,
            south: -90.0,
            east: 180.0,
        });
        let grid = report.grid_step.unwrap_or((0.25, 0.25));
        Self::new(
            Period::Year(year),
            [bbox.north, bbox.west, bbox.south, bbox.east],
            [grid.0, grid.1],
        )
    }
}

/// Job lifecycle; the archive side has no intermediate states worth
/// modelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    New,
    Submitted,
    Complete,
    Failed,
}

/// Transport seam. Implementations submit the request and block until
/// the product is written under the target directory.
pub trait ArchiveClient {
    fn submit(&self, request: &RetrievalRequest, target: &Path) -> Result<(), RetrievalError>;
}

/// One retrieval: request, destination, and state.
#[derive(Debug)]
pub struct RetrievalJob {
    pub request: RetrievalRequest,
    pub period: Period,
    pub target: PathBuf,
    pub state: JobState,
}

impl RetrievalJob {
    pub fn new(request: RetrievalRequest, period: Period, target: &Path) -> Self {
        Self {
            request,
            period,
            target: target.to_path_buf(),
            state: JobState::New,
        }
    }

    pub fn expected_path(&self) -> PathBuf {
        self.target.join(self.period.file_name())
    }

    /// Drive the job to a terminal state.
    pub fn run(&mut self, client: &dyn ArchiveClient) -> Result<PathBuf, RetrievalError> {
        self.state = JobState::Submitted;
        info!(
            "submitting retrieval for {} into {}",
            self.period.file_name(),
            self.target.display()
        );
        if let Err(e) = client.submit(&self.request, &self.target) {
            self.state = JobState::Failed;
            return Err(e);
        }
        let path = self.expected_path();
        if path.is_file() {
            self.state = JobState::Complete;
            Ok(path)
        } else {
            self.state = JobState::Failed;
            Err(RetrievalError::NeverArrived(self.target.clone()))
        }
    }
}
