//! Run configuration parsed from `key=value` tokens. The same structure
//! is built directly by programmatic callers.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::data_io::writer::OutputFormat;
use crate::math::wind::ProfileLaw;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("malformed token (expected key=value): {0}")]
    Malformed(String),
    #[error("unknown key: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {value}")]
    BadValue { key: String, value: String },
    #[error("invalid coordinates: {0}")]
    BadCoordinates(String),
}

/// Time-zone selection. `Auto` and `Best` both derive the zone from the
/// data's longitudes, differing only in which longitude represents the
/// grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneSelect {
    /// `round(longitude[0] / 15)` of the first file opened.
    Auto,
    /// Mode of `round(lon / 15)` over all grid longitudes.
    Best,
    Fixed(i32),
}

impl FromStr for ZoneSelect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "best" => Ok(Self::Best),
            other => other
                .parse::<i32>()
                .map(Self::Fixed)
                .map_err(|_| format!("zone must be auto, best, or an integer: {}", other)),
        }
    }
}

/// Which locations to emit.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationRequest {
    /// Interpolate to these (lat, lon) points.
    Points(Vec<(f64, f64)>),
    /// One output file per native grid cell seen across the year.
    AllCells,
}

/// Which M2 radiation variable feeds GHI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadiationSource {
    #[default]
    Swgdn,
    Swgnt,
}

impl FromStr for RadiationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "swgdn" => Ok(Self::Swgdn),
            "swgnt" => Ok(Self::Swgnt),
            other => Err(format!("swg must be swgdn or swgnt: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssembleConfig {
    pub year: i32,
    pub zone: ZoneSelect,
    pub wrap: bool,
    pub gaps: bool,
    pub locations: LocationRequest,
    pub format: OutputFormat,
    pub radiation: RadiationSource,
    pub solar_dir: Option<PathBuf>,
    pub wind_dir: Option<PathBuf>,
    pub target_dir: PathBuf,
    pub hub_height: f64,
    pub law: ProfileLaw,
}

impl Default for AssembleConfig {
    fn default() -> Self {
        Self {
            year: 0,
            zone: ZoneSelect::Auto,
            wrap: true,
            gaps: false,
            locations: LocationRequest::AllCells,
            format: OutputFormat::Csv,
            radiation: RadiationSource::Swgdn,
            solar_dir: None,
            wind_dir: None,
            target_dir: PathBuf::from("."),
            hub_height: 0.0,
            law: ProfileLaw::Logarithmic,
        }
    }
}

impl AssembleConfig {
    /// Parse `key=value` tokens on top of the defaults.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cfg = Self::default();
        for token in tokens {
            let token = token.as_ref();
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| ConfigError::Malformed(token.to_string()))?;
            cfg.apply(key.trim(), value.trim())?;
        }
        Ok(cfg)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key.to_ascii_lowercase().as_str() {
            "year" => self.year = parse_value(key, value)?,
            "zone" => self.zone = parse_value(key, value)?,
            "wrap" => self.wrap = parse_flag(key, value)?,
            "gaps" => self.gaps = parse_flag(key, value)?,
            "latlon" | "coords" => self.locations = parse_points(value)?,
            "fmat" => self.format = parse_value(key, value)?,
            "swg" => self.radiation = parse_value(key, value)?,
            "solar" => self.solar_dir = Some(PathBuf::from(value)),
            "wind" => self.wind_dir = Some(PathBuf::from(value)),
            "target" => self.target_dir = PathBuf::from(value),
            "hub_height" => self.hub_height = parse_value(key, value)?,
            "law" => self.law = parse_value(key, value)?,
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
{
    value.parse().map_err(|_| ConfigError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Ok(true),
        "no" | "n" | "false" | "0" => Ok(false),
        _ => Err(ConfigError::BadValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_points(value: &str) -> Result<LocationRequest, ConfigError> {
    let numbers: Vec<f64> = value
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ConfigError::BadCoordinates(value.to_string()))?;
    if numbers.is_empty() || numbers.len() % 2 != 0 {
        return Err(ConfigError::BadCoordinates(value.to_string()));
    }
    let points: Vec<(f64, f64)> = numbers.chunks(2).map(|c| (c[0], c[1])).collect();
    for &(lat, lon) in &points {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=360.0).contains(&lon) {
            return Err(ConfigError::BadCoordinates(format!("{},{}", lat, lon)));
        }
    }
    Ok(LocationRequest::Points(points))
}
