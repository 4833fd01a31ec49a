//! Temporal assembly engine: stitches hourly frames out of daily M2 or
//! monthly/annual E5 files into exactly 8760 local-time records, resolves
//! each requested location spatially, derives the modelled solar
//! components, and drives the output writers.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError, DatasetKind, WxVar};
use crate::config::{AssembleConfig, LocationRequest, RadiationSource, ZoneSelect};
use crate::data_io::hub_height::add_hub_height_column;
use crate::data_io::reader::{InputFile, ReaderError};
use crate::data_io::writer::{
    output_path, OutputFormat, SiteHeader, SolarRecord, SolarWriter, SrwWriter, WindSchema,
    WriteError,
};
use crate::data_io::{Field, FrameSeq, Grid, GridTable, HourFrame};
use crate::math::interpolate::{exact_index, CellWeights, GRID_EPS};
use crate::math::solar::{diffuse_horizontal, disc_dni};
use crate::math::wind::speed_direction;
use crate::time_utils::{hours_since_1900, is_leap_year, output_days_in_month};
use crate::units::{joules_per_hour_to_watts, kelvin_to_celsius, pa_to_mbar, round_to};

pub const HOURS_PER_YEAR: usize = 8760;

/// A location may be emitted with embedded gaps only below this many
/// missing hours (21 days).
pub const GAP_LIMIT: usize = 504;

/// E5 albedo candidates; when both are present they are averaged.
const E5_ALBEDO_NAMES: [&str; 2] = ["alnip", "aluvp"];

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("invalid coordinates: {0}")]
    BadCoordinates(String),
    #[error("invalid configuration: {0}")]
    BadArgument(String),
    #[error("required input file missing for {date} under {root}")]
    MissingInput { date: String, root: PathBuf },
    #[error("input tree error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("input file unreadable: {0}")]
    Unreadable(#[from] ReaderError),
    #[error("radiation and wind inputs use different grids for {date}")]
    GridMismatch { date: String },
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("run cancelled")]
    Cancelled,
}

impl AssembleError {
    /// Structured return code reported to callers.
    pub fn return_code(&self) -> i32 {
        match self {
            Self::BadCoordinates(_) => 2,
            Self::BadArgument(_) => 3,
            Self::MissingInput { .. } => 4,
            Self::Catalog(_)
            | Self::Unreadable(_)
            | Self::GridMismatch { .. }
            | Self::Write(_)
            | Self::Cancelled => 5,
        }
    }
}

/// Outcome of one assembly run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// 0 success, 1 zone warning.
    pub code: i32,
    /// Whether any day fell back to the previous year's file.
    pub wrapped: bool,
    /// Resolved time zone actually used.
    pub zone: i32,
    pub written: Vec<PathBuf>,
    pub suppressed: Vec<(f64, f64)>,
    pub events: Vec<String>,
}

impl RunReport {
    fn event(&mut self, msg: String) {
        info!("{}", msg);
        self.events.push(msg);
    }
}

type ProgressFn = Box<dyn Fn(u8, &str) + Send + Sync>;

/// Reusable assembly engine. Holds only the cooperative-cancel flag and
/// the progress sink; all per-run state lives inside [`Engine::run`].
#[derive(Default)]
pub struct Engine {
    cancel: Option<Arc<AtomicBool>>,
    progress: Option<ProgressFn>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a cancel flag checked between days and between locations.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_progress(mut self, f: ProgressFn) -> Self {
        self.progress = Some(f);
        self
    }

    fn check_cancel(&self) -> Result<(), AssembleError> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(AssembleError::Cancelled),
            _ => Ok(()),
        }
    }

    fn progress(&self, pct: u8, msg: &str) {
        if let Some(f) = &self.progress {
            f(pct, msg);
        }
    }

    /// Assemble one year for one configuration.
    pub fn run(&self, cfg: &AssembleConfig) -> Result<RunReport, AssembleError> {
        if cfg.year < 1900 {
            return Err(AssembleError::BadArgument(format!(
                "year must be a calendar year, got {}",
                cfg.year
            )));
        }
        let mut report = RunReport::default();

        let inputs = InputPlan::resolve(cfg)?;
        let zone = self.resolve_zone(cfg, &inputs, &mut report)?;
        if !(-12..=14).contains(&zone) {
            return Err(AssembleError::BadArgument(format!(
                "time zone {} is outside -12..=14",
                zone
            )));
        }
        report.zone = zone;
        info!(
            "assembling {} for zone {} from {:?} inputs",
            cfg.year,
            zone,
            inputs.primary.kind()
        );

        let year = self.assemble(cfg, &inputs, zone, &mut report)?;
        let locations = resolve_locations(&cfg.locations, &year.grids)?;
        info!(
            "assembled {} hours across {} grid(s); emitting {} location(s)",
            year.hours.len(),
            year.grids.len(),
            locations.len()
        );

        self.emit(cfg, &inputs, zone, &year, &locations, &mut report)?;

        if cfg.format == OutputFormat::Srw && cfg.hub_height > 0.0 {
            for path in report.written.clone() {
                if let Err(e) = add_hub_height_column(&path, cfg.hub_height, cfg.law) {
                    warn!("hub-height extrapolation skipped: {}", e);
                    report.events.push(format!("hub-height skipped: {}", e));
                }
            }
        }
        self.progress(100, "done");
        Ok(report)
    }

    fn resolve_zone(
        &self,
        cfg: &AssembleConfig,
        inputs: &InputPlan,
        report: &mut RunReport,
    ) -> Result<i32, AssembleError> {
        let lons = first_file(&inputs.primary, cfg.year)
            .map(|p| InputFile::open(p).and_then(|f| f.longitudes()))
            .transpose()?;
        match cfg.zone {
            ZoneSelect::Fixed(z) => {
                if let Some(lons) = lons {
                    let best = best_zone(&lons);
                    if (z - best).abs() > 1 {
                        report.code = 1;
                        report.event(format!(
                            "zone {} is inconsistent with the data extent (nearest zone {})",
                            z, best
                        ));
                    }
                }
                Ok(z)
            }
            ZoneSelect::Auto => {
                let lons = lons.ok_or_else(|| missing(cfg.year, &inputs.primary))?;
                Ok(zone_of(lons.first().copied().unwrap_or(0.0)))
            }
            ZoneSelect::Best => {
                let lons = lons.ok_or_else(|| missing(cfg.year, &inputs.primary))?;
                Ok(best_zone(&lons))
            }
        }
    }

    fn assemble(
        &self,
        cfg: &AssembleConfig,
        inputs: &InputPlan,
        zone: i32,
        report: &mut RunReport,
    ) -> Result<AssembledYear, AssembleError> {
        if inputs.primary.kind().is_m2() {
            self.assemble_m2(cfg, inputs, zone, report)
        } else {
            self.assemble_e5(cfg, inputs, zone, report)
        }
    }

    /// Daily M2 files: 24 GMT hours each, stitched with zone trims at the
    /// year boundaries and 29 Feb skipped outright.
    fn assemble_m2(
        &self,
        cfg: &AssembleConfig,
        inputs: &InputPlan,
        zone: i32,
        report: &mut RunReport,
    ) -> Result<AssembledYear, AssembleError> {
        let mut year = AssembledYear::default();
        let mut read_year = cfg.year;

        if zone > 0 {
            // Local year starts within GMT 31 Dec of the prior year.
            match self.read_day(inputs, cfg.year - 1, 12, 31, &mut year) {
                Ok(day) => year
                    .hours
                    .extend(day.into_iter().skip(24 - zone as usize)),
                Err(AssembleError::MissingInput { date, .. }) => {
                    warn!("boundary file for {} missing; leading hours become gaps", date);
                    year.hours.extend(std::iter::repeat_with(|| None).take(zone as usize));
                }
                Err(e) => return Err(e),
            }
        }

        for month in 1u8..=12 {
            self.check_cancel()?;
            self.progress(
                (month as u32 * 90 / 12) as u8,
                &format!("reading month {:02}", month),
            );
            for day in 1..=output_days_in_month(month) {
                let date = format!("{:04}-{:02}-{:02}", read_year, month, day);
                let mut frames = match self.read_day(inputs, read_year, month, day, &mut year) {
                    Ok(f) => f,
                    Err(AssembleError::MissingInput { .. })
                        if cfg.wrap && read_year == cfg.year =>
                    {
                        // One wrap per assembled year; a miss in the
                        // wrapped year is fatal.
                        read_year = cfg.year - 1;
                        report.wrapped = true;
                        report.event(format!(
                            "{} missing; wrapping to {} for the remainder of the year",
                            date, read_year
                        ));
                        self.read_day(inputs, read_year, month, day, &mut year)?
                    }
                    Err(e) => return Err(e),
                };
                if zone < 0 && month == 1 && day == 1 {
                    frames.drain(..(-zone) as usize);
                }
                year.hours.append(&mut frames);
            }
        }

        if zone < 0 {
            match self.read_day(inputs, read_year + 1, 1, 1, &mut year) {
                Ok(day) => year.hours.extend(day.into_iter().take((-zone) as usize)),
                Err(AssembleError::MissingInput { date, .. }) => {
                    warn!("boundary file for {} missing; trailing hours become gaps", date);
                    year.hours
                        .extend(std::iter::repeat_with(|| None).take((-zone) as usize));
                }
                Err(e) => return Err(e),
            }
        }

        year.hours.truncate(HOURS_PER_YEAR);
        while year.hours.len() < HOURS_PER_YEAR {
            year.hours.push(None);
        }
        Ok(year)
    }

    /// Read one GMT day's 24 frames, combining the variables of every
    /// input tree (M2 needs the radiation and single-level collections
    /// side by side).
    fn read_day(
        &self,
        inputs: &InputPlan,
        year: i32,
        month: u8,
        day: u8,
        out: &mut AssembledYear,
    ) -> Result<Vec<Option<HourFrame>>, AssembleError> {
        let date = format!("{:04}-{:02}-{:02}", year, month, day);
        let mut frames: Vec<Option<HourFrame>> = Vec::with_capacity(24);
        let mut grid_id: Option<usize> = None;

        for source in &inputs.sources {
            let path = source
                .catalog
                .locate_day(year, month, day)
                .ok_or_else(|| AssembleError::MissingInput {
                    date: date.clone(),
                    root: source.catalog.root().to_path_buf(),
                })?;
            let file = InputFile::open(&path)?;
            let grid = Grid {
                lats: file.latitudes()?,
                lons: file.longitudes()?,
            };
            let id = out.grids.intern(grid);
            match grid_id {
                None => grid_id = Some(id),
                Some(prev) if prev != id => {
                    return Err(AssembleError::GridMismatch { date });
                }
                Some(_) => {}
            }

            for (field, name) in &source.plan {
                let hours = file.read_hours(name)?;
                for (h, frame) in hours.into_iter().take(24).enumerate() {
                    if frames.len() <= h {
                        frames.push(Some(HourFrame {
                            grid: id,
                            fields: HashMap::new(),
                        }));
                    }
                    if let Some(slot) = frames[h].as_mut() {
                        slot.fields.insert(*field, frame);
                    }
                }
            }
        }

        while frames.len() < 24 {
            frames.push(None);
        }
        Ok(frames)
    }

    /// E5 monthly/annual files on the hours-since-1900 axis. Stamps are
    /// hour-ending, so the GMT span for the local year is
    /// `[H(Y,1,1) + 1 − Z, H(Y+1,1,1) + 1 − Z)`, with the leap day's 24
    /// GMT stamps dropped.
    fn assemble_e5(
        &self,
        cfg: &AssembleConfig,
        inputs: &InputPlan,
        zone: i32,
        report: &mut RunReport,
    ) -> Result<AssembledYear, AssembleError> {
        let mut year = AssembledYear::default();
        year.hours.resize_with(HOURS_PER_YEAR, || None);

        let frst = hours_since_1900(cfg.year, 1, 1) + 1 - zone as i64;
        let leap = is_leap_year(cfg.year);
        let feb29 = hours_since_1900(cfg.year, 2, 29);
        let mar1 = hours_since_1900(cfg.year, 3, 1);

        let mut files = e5_files(&inputs.primary, cfg.year, zone)?;
        if files.main.is_empty() {
            if cfg.wrap {
                let prior = e5_files(&inputs.primary, cfg.year - 1, zone)?;
                if !prior.main.is_empty() {
                    report.wrapped = true;
                    report.event(format!(
                        "no {} files found; wrapping the whole year to {}",
                        cfg.year,
                        cfg.year - 1
                    ));
                    return self.assemble_e5_wrapped(cfg, inputs, zone, prior);
                }
            }
            return Err(missing(cfg.year, &inputs.primary));
        }

        let total = files.main.len() + files.boundary.len();
        for (i, path) in files.main.drain(..).chain(files.boundary.drain(..)).enumerate() {
            self.check_cancel()?;
            self.progress(
                (i * 90 / total) as u8,
                &format!("reading {}", path.display()),
            );
            self.place_e5_file(inputs, &path, frst, leap, feb29, mar1, 0, &mut year)?;
        }
        Ok(year)
    }

    /// Whole-year wrap: read the prior year's files and shift every stamp
    /// forward by one year's worth of hours.
    fn assemble_e5_wrapped(
        &self,
        cfg: &AssembleConfig,
        inputs: &InputPlan,
        zone: i32,
        mut files: E5Files,
    ) -> Result<AssembledYear, AssembleError> {
        let mut year = AssembledYear::default();
        year.hours.resize_with(HOURS_PER_YEAR, || None);

        let source_year = cfg.year - 1;
        let shift = hours_since_1900(cfg.year, 1, 1) - hours_since_1900(source_year, 1, 1);
        let frst = hours_since_1900(cfg.year, 1, 1) + 1 - zone as i64;
        let leap = is_leap_year(source_year);
        let feb29 = hours_since_1900(source_year, 2, 29) + shift;
        let mar1 = hours_since_1900(source_year, 3, 1) + shift;

        for path in files.main.drain(..) {
            self.check_cancel()?;
            self.place_e5_file(inputs, &path, frst, leap, feb29, mar1, shift, &mut year)?;
        }
        Ok(year)
    }

    #[allow(clippy::too_many_arguments)]
    fn place_e5_file(
        &self,
        inputs: &InputPlan,
        path: &Path,
        frst: i64,
        leap: bool,
        feb29: i64,
        mar1: i64,
        shift: i64,
        out: &mut AssembledYear,
    ) -> Result<(), AssembleError> {
        let file = InputFile::open(path)?;
        let grid = Grid {
            lats: file.latitudes()?,
            lons: file.longitudes()?,
        };
        let id = out.grids.intern(grid);
        let stamps = file.time_values()?;

        let plan = e5_plan(inputs, &file);
        for (field, name) in &plan {
            let hours = file.read_hours(name)?;
            for (frame, &stamp) in hours.into_iter().zip(&stamps) {
                let t = stamp + shift;
                if leap && t > feb29 && t <= mar1 {
                    continue;
                }
                let mut slot = t - frst;
                if leap && t > mar1 {
                    slot -= 24;
                }
                if !(0..HOURS_PER_YEAR as i64).contains(&slot) {
                    continue;
                }
                let frame = if *field == Field::Ghi {
                    frame.mapv(joules_per_hour_to_watts)
                } else {
                    frame
                };
                let entry = out.hours[slot as usize].get_or_insert_with(|| HourFrame {
                    grid: id,
                    fields: HashMap::new(),
                });
                // Two albedo variables in the same file are averaged cell
                // by cell; a NaN cell defers to the other layer.
                if *field == Field::Albedo {
                    if let Some(prev) = entry.fields.get_mut(field) {
                        for (p, &n) in prev.iter_mut().zip(frame.iter()) {
                            if p.is_nan() {
                                *p = n;
                            } else if !n.is_nan() {
                                *p = 0.5 * (*p + n);
                            }
                        }
                        continue;
                    }
                }
                entry.fields.insert(*field, frame);
            }
        }
        Ok(())
    }

    /// Per-location output: count gaps, apply the gap policy, then write.
    fn emit(
        &self,
        cfg: &AssembleConfig,
        inputs: &InputPlan,
        zone: i32,
        year: &AssembledYear,
        locations: &[Location],
        report: &mut RunReport,
    ) -> Result<(), AssembleError> {
        let kind = inputs.primary.kind();
        let source = match kind {
            DatasetKind::Era5 => "E5 reanalysis",
            _ => "M2 reanalysis",
        };
        let schema = WindSchema::for_dataset(kind);

        for (i, loc) in locations.iter().enumerate() {
            self.check_cancel()?;
            self.progress(
                (90 + i * 10 / locations.len().max(1)) as u8,
                &format!("writing {},{}", loc.lat, loc.lon),
            );

            let sampler = Sampler::new(loc, year);
            let gap_count = (1..=HOURS_PER_YEAR as u32)
                .filter(|&h| sampler.sample(h).is_none())
                .count();
            let path = output_path(&cfg.target_dir, cfg.format, loc.lat, loc.lon, cfg.year);

            if gap_count > 0 && !(cfg.gaps && gap_count < GAP_LIMIT) {
                report.event(format!(
                    "{} not created due to data gaps ({} missing hours)",
                    path.display(),
                    gap_count
                ));
                report.suppressed.push((loc.lat, loc.lon));
                if path.is_file() {
                    let _ = fs::remove_file(&path);
                }
                continue;
            }
            if gap_count > 0 {
                report.event(format!(
                    "{} written with {} gap hours",
                    path.display(),
                    gap_count
                ));
            }

            let header = SiteHeader {
                latitude: loc.lat,
                longitude: loc.lon,
                zone,
                year: cfg.year,
                source: source.to_string(),
            };
            if cfg.format.is_solar() {
                let mut writer = SolarWriter::create(&path, cfg.format, header)?;
                for h in 1..=HOURS_PER_YEAR as u32 {
                    match sampler.sample(h) {
                        Some(sample) => {
                            let rec = derive_solar(&sample, h, loc, zone);
                            writer.write_record(&rec)?;
                        }
                        None => writer.write_gap()?,
                    }
                }
                report.written.push(writer.finish()?);
            } else {
                let mut writer = SrwWriter::create(&path, schema.clone(), &header)?;
                for h in 1..=HOURS_PER_YEAR as u32 {
                    match sampler.sample(h) {
                        Some(sample) => {
                            let row = wind_row(&sample, &schema);
                            writer.write_record(&row)?;
                        }
                        None => writer.write_gap()?,
                    }
                }
                report.written.push(writer.finish()?);
            }
        }
        Ok(())
    }
}

/// The assembled year plus the grids its hours reference.
#[derive(Debug, Default)]
struct AssembledYear {
    grids: GridTable,
    hours: FrameSeq,
}

/// One input tree with the fields it supplies.
struct InputSource {
    catalog: Catalog,
    plan: Vec<(Field, String)>,
}

/// All input trees for one run: the primary drives dataset detection and
/// zone selection.
struct InputPlan {
    primary: Catalog,
    sources: Vec<InputSource>,
}

impl InputPlan {
    fn resolve(cfg: &AssembleConfig) -> Result<Self, AssembleError> {
        let need = |dir: &Option<PathBuf>, key: &str| {
            dir.clone()
                .ok_or_else(|| AssembleError::BadArgument(format!("{}= directory required", key)))
        };

        if cfg.format.is_solar() {
            let solar = Catalog::open(need(&cfg.solar_dir, "solar")?)?;
            match solar.kind() {
                DatasetKind::M2Solar => {
                    let wind = Catalog::open(need(&cfg.wind_dir, "wind")?)?;
                    if wind.kind() != DatasetKind::M2Wind {
                        return Err(AssembleError::BadArgument(
                            "wind= tree does not hold M2 single-level files".into(),
                        ));
                    }
                    let sources = vec![
                        InputSource {
                            plan: solar_radiation_plan(DatasetKind::M2Solar, cfg.radiation),
                            catalog: solar.clone(),
                        },
                        InputSource {
                            plan: solar_surface_plan(DatasetKind::M2Wind),
                            catalog: wind,
                        },
                    ];
                    Ok(Self { primary: solar, sources })
                }
                DatasetKind::Era5 => {
                    let mut plan = solar_radiation_plan(DatasetKind::Era5, cfg.radiation);
                    plan.extend(solar_surface_plan(DatasetKind::Era5));
                    Ok(Self {
                        sources: vec![InputSource { catalog: solar.clone(), plan }],
                        primary: solar,
                    })
                }
                DatasetKind::M2Wind => Err(AssembleError::BadArgument(
                    "solar= tree holds M2 single-level files, not radiation".into(),
                )),
            }
        } else {
            let wind = Catalog::open(need(&cfg.wind_dir, "wind")?)?;
            let kind = wind.kind();
            if kind == DatasetKind::M2Solar {
                return Err(AssembleError::BadArgument(
                    "wind= tree holds M2 radiation files".into(),
                ));
            }
            Ok(Self {
                sources: vec![InputSource {
                    plan: wind_plan(kind),
                    catalog: wind.clone(),
                }],
                primary: wind,
            })
        }
    }
}

fn var(kind: DatasetKind, v: WxVar) -> (Field, String) {
    let name = kind
        .var_name(v)
        .unwrap_or_default()
        .to_string();
    let field = match v {
        WxVar::Ghi | WxVar::GhiNet => Field::Ghi,
        WxVar::Albedo => Field::Albedo,
        WxVar::Temp2m => Field::TempK(2),
        WxVar::Temp10m => Field::TempK(10),
        WxVar::Pressure => Field::PressurePa,
        WxVar::U2 => Field::U(2),
        WxVar::V2 => Field::V(2),
        WxVar::U10 => Field::U(10),
        WxVar::V10 => Field::V(10),
        WxVar::U50 => Field::U(50),
        WxVar::V50 => Field::V(50),
        WxVar::U100 => Field::U(100),
        WxVar::V100 => Field::V(100),
    };
    (field, name)
}

fn solar_radiation_plan(kind: DatasetKind, radiation: RadiationSource) -> Vec<(Field, String)> {
    let ghi = match radiation {
        RadiationSource::Swgdn => WxVar::Ghi,
        RadiationSource::Swgnt => WxVar::GhiNet,
    };
    let mut plan = vec![var(kind, ghi)];
    if kind == DatasetKind::M2Solar {
        plan.push(var(kind, WxVar::Albedo));
    }
    plan
}

fn solar_surface_plan(kind: DatasetKind) -> Vec<(Field, String)> {
    let temp = if kind == DatasetKind::Era5 {
        WxVar::Temp2m
    } else {
        WxVar::Temp10m
    };
    vec![
        var(kind, temp),
        var(kind, WxVar::Pressure),
        var(kind, WxVar::U10),
        var(kind, WxVar::V10),
    ]
}

fn wind_plan(kind: DatasetKind) -> Vec<(Field, String)> {
    use WxVar::*;
    let vars: &[WxVar] = match kind {
        DatasetKind::M2Wind => &[Temp2m, Temp10m, Pressure, U2, V2, U10, V10, U50, V50],
        DatasetKind::Era5 => &[Temp2m, Pressure, U10, V10, U100, V100],
        DatasetKind::M2Solar => &[],
    };
    vars.iter().map(|&v| var(kind, v)).collect()
}

/// E5 files carry all variables; the albedo name varies, so the plan is
/// finalized against what the open file actually holds.
fn e5_plan(inputs: &InputPlan, file: &InputFile) -> Vec<(Field, String)> {
    let mut plan: Vec<(Field, String)> = inputs
        .sources
        .iter()
        .flat_map(|s| s.plan.iter().cloned())
        .collect();
    if inputs.primary.kind() == DatasetKind::Era5
        && plan.iter().any(|(f, _)| *f == Field::Ghi)
    {
        for name in E5_ALBEDO_NAMES.iter().filter(|n| file.has_variable(n)) {
            plan.push((Field::Albedo, name.to_string()));
        }
    }
    plan.retain(|(_, name)| file.has_variable(name));
    plan
}

struct E5Files {
    /// Files for the target year itself.
    main: Vec<PathBuf>,
    /// Neighbor-year files covering the zone overhang; a miss here only
    /// produces gap hours.
    boundary: Vec<PathBuf>,
}

fn e5_files(catalog: &Catalog, year: i32, zone: i32) -> Result<E5Files, AssembleError> {
    let mut main = Vec::new();
    if let Some(p) = catalog.locate_year(year) {
        main.push(p);
    } else {
        let monthly: Vec<_> = (1u8..=12)
            .filter_map(|m| catalog.locate_month(year, m))
            .collect();
        if monthly.len() == 12 {
            main = monthly;
        } else if !monthly.is_empty() {
            return Err(AssembleError::MissingInput {
                date: format!("{} (only {} of 12 monthly files found)", year, monthly.len()),
                root: catalog.root().to_path_buf(),
            });
        }
    }

    let mut boundary = Vec::new();
    if zone > 0 {
        if let Some(p) = catalog
            .locate_year(year - 1)
            .or_else(|| catalog.locate_month(year - 1, 12))
        {
            boundary.push(p);
        }
    } else if zone < 0 {
        if let Some(p) = catalog
            .locate_year(year + 1)
            .or_else(|| catalog.locate_month(year + 1, 1))
        {
            boundary.push(p);
        }
    }
    Ok(E5Files { main, boundary })
}

fn first_file(catalog: &Catalog, year: i32) -> Option<PathBuf> {
    if catalog.kind().is_m2() {
        catalog
            .locate_day(year, 1, 1)
            .or_else(|| catalog.locate_day(year - 1, 12, 31))
            .or_else(|| catalog.locate_day(year - 1, 1, 1))
    } else {
        catalog
            .locate_year(year)
            .or_else(|| catalog.locate_month(year, 1))
            .or_else(|| catalog.locate_year(year - 1))
    }
}

fn missing(year: i32, catalog: &Catalog) -> AssembleError {
    AssembleError::MissingInput {
        date: year.to_string(),
        root: catalog.root().to_path_buf(),
    }
}

fn zone_of(lon: f64) -> i32 {
    (lon / 15.0).round() as i32
}

/// Mode of `round(lon / 15)` over the grid's longitudes.
fn best_zone(lons: &[f64]) -> i32 {
    let mut tally: HashMap<i32, usize> = HashMap::new();
    for &lon in lons {
        *tally.entry(zone_of(lon)).or_insert(0) += 1;
    }
    tally
        .into_iter()
        .max_by_key(|&(zone, count)| (count, -zone))
        .map(|(zone, _)| zone)
        .unwrap_or(0)
}

/// One output location.
#[derive(Debug, Clone, Copy)]
struct Location {
    lat: f64,
    lon: f64,
    /// Interpolated point vs native-cell exact lookup.
    interpolate: bool,
}

fn resolve_locations(
    request: &LocationRequest,
    grids: &GridTable,
) -> Result<Vec<Location>, AssembleError> {
    match request {
        LocationRequest::Points(points) => {
            for &(lat, lon) in points {
                let inside = grids.iter().any(|g| {
                    within(&g.lats, lat) && within(&g.lons, lon)
                });
                if !inside {
                    return Err(AssembleError::BadCoordinates(format!(
                        "{},{} lies outside the input grid",
                        lat, lon
                    )));
                }
            }
            Ok(points
                .iter()
                .map(|&(lat, lon)| Location {
                    lat,
                    lon,
                    interpolate: true,
                })
                .collect())
        }
        LocationRequest::AllCells => {
            let mut lats: Vec<f64> = Vec::new();
            let mut lons: Vec<f64> = Vec::new();
            for grid in grids.iter() {
                merge_axis(&mut lats, &grid.lats);
                merge_axis(&mut lons, &grid.lons);
            }
            let mut cells = Vec::with_capacity(lats.len() * lons.len());
            for &lat in &lats {
                for &lon in &lons {
                    cells.push(Location {
                        lat,
                        lon,
                        interpolate: false,
                    });
                }
            }
            Ok(cells)
        }
    }
}

fn within(axis: &[f64], x: f64) -> bool {
    if axis.is_empty() {
        return false;
    }
    let (min, max) = axis
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    (min - GRID_EPS..=max + GRID_EPS).contains(&x)
}

fn merge_axis(into: &mut Vec<f64>, axis: &[f64]) {
    for &v in axis {
        if !into.iter().any(|&u| (u - v).abs() < GRID_EPS) {
            into.push(v);
        }
    }
    into.sort_by(f64::total_cmp);
}

/// Everything extracted from one hour at one location, still in source
/// units.
struct HourSample {
    fields: HashMap<Field, f64>,
}

impl HourSample {
    fn get(&self, field: Field) -> Option<f64> {
        self.fields.get(&field).copied()
    }
}

/// Spatial resolver for one location, caching per-grid weights since a
/// year's hours typically share one grid.
struct Sampler<'a> {
    loc: &'a Location,
    year: &'a AssembledYear,
    required: Vec<Field>,
    optional: Vec<Field>,
    weights: std::cell::RefCell<HashMap<usize, Option<CellWeights>>>,
    indices: std::cell::RefCell<HashMap<usize, Option<(usize, usize)>>>,
}

impl<'a> Sampler<'a> {
    fn new(loc: &'a Location, year: &'a AssembledYear) -> Self {
        // Albedo never counts as a gap; missing values become -999 downstream.
        let mut required: Vec<Field> = year
            .hours
            .iter()
            .flatten()
            .next()
            .map(|f| f.fields.keys().copied().collect())
            .unwrap_or_default();
        required.retain(|f| *f != Field::Albedo);
        let optional = vec![Field::Albedo];
        Self {
            loc,
            year,
            required,
            optional,
            weights: Default::default(),
            indices: Default::default(),
        }
    }

    /// Resolve local hour `h` (1..=8760); `None` means a gap at this
    /// location.
    fn sample(&self, h: u32) -> Option<HourSample> {
        let frame = self.year.hours[(h - 1) as usize].as_ref()?;
        let mut fields = HashMap::new();
        for &field in &self.required {
            let v = self.value(frame, field)?;
            if !v.is_finite() {
                return None;
            }
            fields.insert(field, v);
        }
        for &field in &self.optional {
            if let Some(v) = self.value(frame, field) {
                if v.is_finite() {
                    fields.insert(field, v);
                }
            }
        }
        Some(HourSample { fields })
    }

    fn value(&self, frame: &HourFrame, field: Field) -> Option<f64> {
        let array = frame.field(field)?;
        if self.loc.interpolate {
            let mut cache = self.weights.borrow_mut();
            let w = cache.entry(frame.grid).or_insert_with(|| {
                let g = self.year.grids.get(frame.grid);
                CellWeights::resolve(&g.lats, &g.lons, self.loc.lat, self.loc.lon)
            });
            w.map(|w| w.apply(array))
        } else {
            let mut cache = self.indices.borrow_mut();
            let idx = cache.entry(frame.grid).or_insert_with(|| {
                let g = self.year.grids.get(frame.grid);
                Some((
                    exact_index(&g.lats, self.loc.lat)?,
                    exact_index(&g.lons, self.loc.lon)?,
                ))
            });
            idx.map(|(i, j)| array[[i, j]])
        }
    }
}

/// Derive the written solar record for one hour.
fn derive_solar(sample: &HourSample, hour: u32, loc: &Location, zone: i32) -> SolarRecord {
    let ghi = sample.get(Field::Ghi).unwrap_or(0.0).max(0.0);
    let pressure_pa = sample.get(Field::PressurePa).unwrap_or(0.0);
    let temp_k = sample
        .get(Field::TempK(10))
        .or_else(|| sample.get(Field::TempK(2)))
        .unwrap_or(f64::NAN);
    let u = sample.get(Field::U(10)).unwrap_or(0.0);
    let v = sample.get(Field::V(10)).unwrap_or(0.0);
    let (speed, direction) = speed_direction(u, v);

    let dni = disc_dni(ghi, hour, loc.lat, loc.lon, zone, pa_to_mbar(pressure_pa));
    let dhi = diffuse_horizontal(ghi, dni, hour, loc.lat, loc.lon, zone, 0.0);
    SolarRecord {
        ghi: ghi.round(),
        dni: dni.round(),
        dhi,
        temp_c: kelvin_to_celsius(temp_k),
        pressure_pa,
        speed,
        direction,
        albedo: sample.get(Field::Albedo).map(|a| round_to(a, 3)),
    }
}

/// Map one hour's sample onto an SRW schema row, pressure left in Pa.
fn wind_row(sample: &HourSample, schema: &WindSchema) -> Vec<f64> {
    let mut speed_dir: HashMap<u16, (f64, f64)> = HashMap::new();
    let mut at = |h: u16| -> (f64, f64) {
        *speed_dir.entry(h).or_insert_with(|| {
            let u = sample.get(Field::U(h)).unwrap_or(0.0);
            let v = sample.get(Field::V(h)).unwrap_or(0.0);
            speed_direction(u, v)
        })
    };
    schema
        .columns
        .iter()
        .map(|col| match col.name {
            "Temperature" => sample
                .get(Field::TempK(col.height))
                .map(kelvin_to_celsius)
                .unwrap_or(f64::NAN),
            "Pressure" => sample.get(Field::PressurePa).unwrap_or(f64::NAN),
            "Direction" => at(col.height).1,
            "Speed" => at(col.height).0,
            _ => f64::NAN,
        })
        .collect()
}
