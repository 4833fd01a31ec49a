//! Output writers for the three downstream dialects: CSV solar (dated
//! rows), SMW solar (implied time base), and SRW multi-height wind.
//! Files are overwritten on each run and closed before the next location
//! is processed.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::catalog::DatasetKind;
use crate::time_utils::local_calendar;
use crate::units::{pa_to_atm, pa_to_mbar, MISSING};

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Output dialect. `wind` and `solar` are accepted as aliases on the
/// command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Smw,
    Srw,
}

impl OutputFormat {
    pub fn is_solar(self) -> bool {
        matches!(self, Self::Csv | Self::Smw)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Smw => "smw",
            Self::Srw => "srw",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "smw" | "solar" => Ok(Self::Smw),
            "srw" | "wind" => Ok(Self::Srw),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Per-location header values shared by the dialects. City, state, and
/// country are emitted as literal placeholders the downstream consumers
/// accept verbatim.
#[derive(Debug, Clone)]
pub struct SiteHeader {
    pub latitude: f64,
    pub longitude: f64,
    pub zone: i32,
    pub year: i32,
    pub source: String,
}

impl SiteHeader {
    fn location_id(&self) -> String {
        format!(
            "{}_{}",
            format_coord(self.latitude),
            format_coord(self.longitude)
        )
    }
}

/// Coordinate formatting used in filenames and headers: whole-degree
/// values keep one decimal (`-32.0`), everything else prints exactly.
pub fn format_coord(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Output path for one location's file.
pub fn output_path(target: &Path, format: OutputFormat, lat: f64, lon: f64, year: i32) -> PathBuf {
    let stem = if format.is_solar() {
        "solar_weather"
    } else {
        "wind_weather"
    };
    target.join(format!(
        "{}_{}_{}_{}.{}",
        stem,
        format_coord(lat),
        format_coord(lon),
        year,
        format.extension()
    ))
}

/// One derived solar hour at one location.
#[derive(Debug, Clone, Copy)]
pub struct SolarRecord {
    pub ghi: f64,
    pub dni: f64,
    pub dhi: f64,
    pub temp_c: f64,
    pub pressure_pa: f64,
    pub speed: f64,
    pub direction: f64,
    pub albedo: Option<f64>,
}

/// Writer for the CSV and SMW solar dialects.
pub struct SolarWriter {
    out: BufWriter<File>,
    path: PathBuf,
    format: OutputFormat,
    header: SiteHeader,
    hour: u32,
}

impl SolarWriter {
    pub fn create(path: &Path, format: OutputFormat, header: SiteHeader) -> Result<Self, WriteError> {
        debug_assert!(format.is_solar());
        let file = File::create(path).map_err(|e| io_err(path, e))?;
        let mut writer = Self {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
            format,
            header,
            hour: 0,
        };
        writer.write_header()?;
        Ok(writer)
    }

    fn write_header(&mut self) -> Result<(), WriteError> {
        let h = self.header.clone();
        match self.format {
            OutputFormat::Csv => {
                self.line(
                    "Location,City,Region,Country,Latitude,Longitude,Time Zone,Elevation,Source",
                )?;
                self.line(&format!(
                    "{},<city>,<state>,<country>,{},{},{},0,{}",
                    h.location_id(),
                    format_coord(h.latitude),
                    format_coord(h.longitude),
                    h.zone,
                    h.source
                ))?;
                self.line("Year,Month,Day,Hour,GHI,DNI,DHI,Tdry,Pres,Wspd,Wdir")
            }
            OutputFormat::Smw => self.line(&format!(
                "{},<city>,<state>,{},{},{},0,3600.0,{},0:30:00",
                h.location_id(),
                h.zone,
                format_coord(h.latitude),
                format_coord(h.longitude),
                h.year
            )),
            OutputFormat::Srw => unreachable!("SRW handled by SrwWriter"),
        }
    }

    /// Write the next hourly record; hours must arrive in order.
    pub fn write_record(&mut self, rec: &SolarRecord) -> Result<(), WriteError> {
        self.hour += 1;
        match self.format {
            OutputFormat::Csv => {
                let (month, day, hour) = local_calendar(self.hour);
                let year = self.header.year;
                self.line(&format!(
                    "{},{},{},{},{:.0},{:.0},{:.0},{:.1},{:.0},{:.4},{:.0}",
                    year,
                    month,
                    day,
                    hour,
                    rec.ghi,
                    rec.dni,
                    rec.dhi,
                    rec.temp_c,
                    pa_to_mbar(rec.pressure_pa),
                    rec.speed,
                    rec.direction
                ))
            }
            OutputFormat::Smw => self.line(&format!(
                "{:.1},{:.0},{:.0},{:.0},{:.4},{:.0},{:.0},{:.0},{:.0},{:.1},{},{:.0}",
                rec.temp_c,
                MISSING,
                MISSING,
                MISSING,
                rec.speed,
                rec.direction,
                pa_to_mbar(rec.pressure_pa),
                rec.ghi,
                rec.dni,
                rec.dhi,
                rec.albedo
                    .map(|a| format!("{:.3}", a))
                    .unwrap_or_else(|| format!("{:.0}", MISSING)),
                MISSING
            )),
            OutputFormat::Srw => unreachable!(),
        }
    }

    /// Comma-only placeholder for an hour this location has no data for.
    pub fn write_gap(&mut self) -> Result<(), WriteError> {
        self.hour += 1;
        let ncols = match self.format {
            OutputFormat::Csv => 11,
            OutputFormat::Smw => 12,
            OutputFormat::Srw => unreachable!(),
        };
        self.line(&",".repeat(ncols - 1))
    }

    pub fn finish(mut self) -> Result<PathBuf, WriteError> {
        self.out.flush().map_err(|e| io_err(&self.path, e))?;
        Ok(self.path)
    }

    fn line(&mut self, s: &str) -> Result<(), WriteError> {
        writeln!(self.out, "{}", s).map_err(|e| io_err(&self.path, e))
    }
}

/// One SRW column: name, units, measurement height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindColumn {
    pub name: &'static str,
    pub units: &'static str,
    pub height: u16,
}

/// Column ordering of an SRW file, fixed per dataset family.
#[derive(Debug, Clone, PartialEq)]
pub struct WindSchema {
    pub columns: Vec<WindColumn>,
}

impl WindSchema {
    pub fn for_dataset(kind: DatasetKind) -> Self {
        let columns = match kind {
            DatasetKind::M2Solar | DatasetKind::M2Wind => vec![
                WindColumn { name: "Temperature", units: "C", height: 2 },
                WindColumn { name: "Pressure", units: "atm", height: 2 },
                WindColumn { name: "Direction", units: "degrees", height: 2 },
                WindColumn { name: "Speed", units: "m/s", height: 2 },
                WindColumn { name: "Temperature", units: "C", height: 10 },
                WindColumn { name: "Direction", units: "degrees", height: 10 },
                WindColumn { name: "Speed", units: "m/s", height: 10 },
                WindColumn { name: "Direction", units: "degrees", height: 50 },
                WindColumn { name: "Speed", units: "m/s", height: 50 },
            ],
            DatasetKind::Era5 => vec![
                WindColumn { name: "Temperature", units: "C", height: 2 },
                WindColumn { name: "Pressure", units: "atm", height: 2 },
                WindColumn { name: "Direction", units: "degrees", height: 10 },
                WindColumn { name: "Speed", units: "m/s", height: 10 },
                WindColumn { name: "Direction", units: "degrees", height: 100 },
                WindColumn { name: "Speed", units: "m/s", height: 100 },
            ],
        };
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One derived wind hour: values aligned with a [`WindSchema`]. Pressure
/// arrives in Pa and is converted to atm at write time.
pub struct SrwWriter {
    out: BufWriter<File>,
    path: PathBuf,
    schema: WindSchema,
}

impl SrwWriter {
    pub fn create(path: &Path, schema: WindSchema, header: &SiteHeader) -> Result<Self, WriteError> {
        let file = File::create(path).map_err(|e| io_err(path, e))?;
        let mut writer = Self {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
            schema,
        };
        writer.write_header(header)?;
        Ok(writer)
    }

    fn write_header(&mut self, h: &SiteHeader) -> Result<(), WriteError> {
        let id = h.location_id();
        let names: Vec<&str> = self.schema.columns.iter().map(|c| c.name).collect();
        let units: Vec<&str> = self.schema.columns.iter().map(|c| c.units).collect();
        let heights: Vec<String> = self
            .schema
            .columns
            .iter()
            .map(|c| c.height.to_string())
            .collect();
        self.line(&format!(
            "{},<city>,<state>,<country>,{},{},{},0",
            id,
            h.year,
            format_coord(h.latitude),
            format_coord(h.longitude)
        ))?;
        self.line(&format!(
            "{} reanalysis hourly wind, assembled for {}, zone {}",
            h.source, h.year, h.zone
        ))?;
        self.line(&names.join(","))?;
        self.line(&units.join(","))?;
        self.line(&heights.join(","))
    }

    /// Write one hourly row; `values` align with the schema, pressure
    /// columns in Pa.
    pub fn write_record(&mut self, values: &[f64]) -> Result<(), WriteError> {
        debug_assert_eq!(values.len(), self.schema.len());
        let cells: Vec<String> = self
            .schema
            .columns
            .iter()
            .zip(values)
            .map(|(col, &v)| match col.name {
                "Pressure" => format!("{:.6}", pa_to_atm(v)),
                "Temperature" => format!("{:.1}", v),
                "Direction" => format!("{:.0}", v),
                _ => format!("{:.4}", v),
            })
            .collect();
        self.line(&cells.join(","))
    }

    pub fn write_gap(&mut self) -> Result<(), WriteError> {
        self.line(&",".repeat(self.schema.len().saturating_sub(1)))
    }

    pub fn finish(mut self) -> Result<PathBuf, WriteError> {
        self.out.flush().map_err(|e| io_err(&self.path, e))?;
        Ok(self.path)
    }

    fn line(&mut self, s: &str) -> Result<(), WriteError> {
        writeln!(self.out, "{}", s).map_err(|e| io_err(&self.path, e))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> WriteError {
    WriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_aliases() {
        assert_eq!("wind".parse::<OutputFormat>(), Ok(OutputFormat::Srw));
        assert_eq!("solar".parse::<OutputFormat>(), Ok(OutputFormat::Smw));
        assert_eq!("CSV".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert!("epw".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_coord_formatting() {
        assert_eq!(format_coord(-32.0), "-32.0");
        assert_eq!(format_coord(115.75), "115.75");
        assert_eq!(format_coord(0.0), "0.0");
    }

    #[test]
    fn test_output_paths() {
        let p = output_path(Path::new("./out"), OutputFormat::Smw, -32.0, 115.75, 2020);
        assert_eq!(
            p,
            PathBuf::from("./out/solar_weather_-32.0_115.75_2020.smw")
        );
        let p = output_path(Path::new("./out"), OutputFormat::Srw, 40.0, -105.25, 2019);
        assert_eq!(
            p,
            PathBuf::from("./out/wind_weather_40.0_-105.25_2019.srw")
        );
    }

    #[test]
    fn test_schemas() {
        assert_eq!(WindSchema::for_dataset(DatasetKind::M2Wind).len(), 9);
        assert_eq!(WindSchema::for_dataset(DatasetKind::Era5).len(), 6);
    }
}
