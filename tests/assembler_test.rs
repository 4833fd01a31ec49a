use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Datelike, Duration, NaiveDate};
use reweather::assembler::Engine;
use reweather::config::AssembleConfig;
use reweather::time_utils::hours_since_1900;

fn write_axes(file: &mut netcdf::FileMut, nt: usize, lats: &[f64], lons: &[f64]) {
    file.add_dimension("time", nt).unwrap();
    file.add_dimension("lat", lats.len()).unwrap();
    file.add_dimension("lon", lons.len()).unwrap();
    let mut v = file.add_variable::<f64>("lat", &["lat"]).unwrap();
    v.put_values(lats, ..).unwrap();
    let mut v = file.add_variable::<f64>("lon", &["lon"]).unwrap();
    v.put_values(lons, ..).unwrap();
}

fn write_m2_day(dir: &Path, tag: &str, date: &str, lats: &[f64], lons: &[f64], vars: &[(&str, f64)]) {
    let path = dir.join(format!("MERRA2_400.{}.{}.nc4", tag, date));
    let mut file = netcdf::create(&path).unwrap();
    write_axes(&mut file, 24, lats, lons);
    let mut v = file.add_variable::<i64>("time", &["time"]).unwrap();
    v.put_values(&(0..24i64).collect::<Vec<_>>(), ..).unwrap();
    for (name, value) in vars {
        let mut v = file
            .add_variable::<f64>(name, &["time", "lat", "lon"])
            .unwrap();
        v.put_values(&vec![*value; 24 * lats.len() * lons.len()], ..)
            .unwrap();
    }
}

fn write_e5_year(
    path: &Path,
    stamps: &[i64],
    lats: &[f64],
    lons: &[f64],
    vars: &[(&str, &dyn Fn(usize, usize) -> f64)],
) {
    let mut file = netcdf::create(path).unwrap();
    write_axes(&mut file, stamps.len(), lats, lons);
    let mut v = file.add_variable::<i64>("time", &["time"]).unwrap();
    v.put_values(stamps, ..).unwrap();
    let ncell = lats.len() * lons.len();
    for (name, value) in vars {
        let data: Vec<f64> = (0..stamps.len())
            .flat_map(|t| (0..ncell).map(move |c| (t, c)))
            .map(|(t, c)| value(t, c))
            .collect();
        let mut v = file
            .add_variable::<f64>(name, &["time", "lat", "lon"])
            .unwrap();
        v.put_values(&data, ..).unwrap();
    }
}

/// Daily M2 point extraction: one SMW file with a header line and 8760
/// records, positive zone pulling the lead hours from the prior 31 Dec.
#[test]
fn test_m2_point_extract_smw() {
    let lats = [-33.0, -32.5, -32.0];
    let lons = [115.0, 115.625, 116.25];
    let root = tempfile::tempdir().unwrap();
    let rad = root.path().join("rad");
    let slv = root.path().join("slv");
    let out = root.path().join("out");
    fs::create_dir_all(&rad).unwrap();
    fs::create_dir_all(&slv).unwrap();
    fs::create_dir_all(&out).unwrap();

    let mut date = NaiveDate::from_ymd_opt(2019, 12, 31).unwrap();
    let end = NaiveDate::from_ymd_opt(2020, 12, 31).unwrap();
    while date <= end {
        let stamp = format!("{:04}{:02}{:02}", date.year(), date.month(), date.day());
        write_m2_day(
            &rad,
            "tavg1_2d_rad_Nx",
            &stamp,
            &lats,
            &lons,
            &[("SWGDN", 400.0), ("ALBEDO", 0.2)],
        );
        write_m2_day(
            &slv,
            "tavg1_2d_slv_Nx",
            &stamp,
            &lats,
            &lons,
            &[("T10M", 288.15), ("PS", 101_325.0), ("U10M", 3.0), ("V10M", 4.0)],
        );
        date += Duration::days(1);
    }

    let cfg = AssembleConfig::from_tokens([
        "year=2020".to_string(),
        "zone=8".to_string(),
        "latlon=-32.0,115.75".to_string(),
        "fmat=smw".to_string(),
        format!("solar={}", rad.display()),
        format!("wind={}", slv.display()),
        format!("target={}", out.display()),
    ])
    .unwrap();
    let report = Engine::new().run(&cfg).unwrap();
    assert_eq!(report.code, 0);
    assert_eq!(report.zone, 8);
    assert!(!report.wrapped);
    assert!(report.suppressed.is_empty());

    let path = out.join("solar_weather_-32.0_115.75_2020.smw");
    assert_eq!(report.written, vec![path.clone()]);
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1 + 8760);
    assert!(lines[0].starts_with("-32.0_115.75,"));
    assert!(lines[0].ends_with(",2020,0:30:00"));

    for line in &lines[1..] {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields.len(), 12, "bad row: {}", line);
        // temperature, speed, direction from the constant wind field
        assert_eq!(fields[0], "15.0");
        assert_eq!(fields[4], "5.0000");
        assert_eq!(fields[5], "217");
        let dhi: f64 = fields[9].parse().unwrap();
        assert!(dhi >= 0.0, "negative DHI in {}", line);
        assert_eq!(fields[10], "0.200");
    }
}

/// An 8784-hour E5 annual file loses exactly the leap day, and the first
/// March hour comes from the stamp just past the excluded window.
#[test]
fn test_e5_leap_year_csv() {
    let lats = [-32.5, -32.0];
    let lons = [0.0, 0.5];
    let root = tempfile::tempdir().unwrap();
    let e5 = root.path().join("e5");
    let out = root.path().join("out");
    fs::create_dir_all(&e5).unwrap();
    fs::create_dir_all(&out).unwrap();

    let h0 = hours_since_1900(2020, 1, 1);
    let stamps: Vec<i64> = (1..=8784).map(|i| h0 + i).collect();
    // GMT 1 Mar 00:00-01:00 carries a marker temperature.
    let mar1_index = 1440usize;
    write_e5_year(
        &e5.join("era5_2020.nc"),
        &stamps,
        &lats,
        &lons,
        &[
            ("ssrd", &|_, _| 1_800_000.0),
            ("t2m", &move |t, _| if t == mar1_index { 300.15 } else { 280.15 }),
            ("sp", &|_, _| 101_325.0),
            ("u10", &|_, _| 2.0),
            ("v10", &|_, _| 2.0),
        ],
    );

    let cfg = AssembleConfig::from_tokens([
        "year=2020".to_string(),
        "zone=0".to_string(),
        "fmat=csv".to_string(),
        format!("solar={}", e5.display()),
        format!("target={}", out.display()),
    ])
    .unwrap();
    let report = Engine::new().run(&cfg).unwrap();
    assert_eq!(report.code, 0);
    assert_eq!(report.written.len(), 4, "one file per grid cell");

    let text = fs::read_to_string(out.join("solar_weather_-32.0_0.5_2020.csv")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3 + 8760);
    assert_eq!(lines[2], "Year,Month,Day,Hour,GHI,DNI,DHI,Tdry,Pres,Wspd,Wdir");
    assert!(!text.contains("2020,2,29,"), "leap day must be dropped");

    let march = lines
        .iter()
        .find(|l| l.starts_with("2020,3,1,0,"))
        .expect("missing 1 Mar row");
    let fields: Vec<&str> = march.split(',').collect();
    assert_eq!(fields[7], "27.0");
    // Every other hour holds the background temperature.
    let jan = lines.iter().find(|l| l.starts_with("2020,1,1,0,")).unwrap();
    assert_eq!(jan.split(',').nth(7).unwrap(), "7.0");
    // The J/m²/hr flux lands as 500 W/m².
    assert_eq!(fields[4], "500");
}

/// Gap policy: a cell past the tolerance is suppressed and logged, one
/// inside the tolerance is written with comma-only placeholder rows.
#[test]
fn test_gap_policy() {
    let lats = [-32.5, -32.0];
    let lons = [0.0, 0.5];
    let root = tempfile::tempdir().unwrap();
    let e5 = root.path().join("e5");
    let out = root.path().join("out");
    fs::create_dir_all(&e5).unwrap();
    fs::create_dir_all(&out).unwrap();

    let h0 = hours_since_1900(2019, 1, 1);
    let stamps: Vec<i64> = (1..=8760).map(|i| h0 + i).collect();
    // Cell 0 misses 600 hours, cell 1 misses 100.
    write_e5_year(
        &e5.join("era5_2019.nc"),
        &stamps,
        &lats,
        &lons,
        &[
            ("ssrd", &|_, _| 1_800_000.0),
            ("t2m", &|t, c| match c {
                0 if t < 600 => f64::NAN,
                1 if t < 100 => f64::NAN,
                _ => 280.15,
            }),
            ("sp", &|_, _| 101_325.0),
            ("u10", &|_, _| 2.0),
            ("v10", &|_, _| 2.0),
        ],
    );

    let cfg = AssembleConfig::from_tokens([
        "year=2019".to_string(),
        "zone=0".to_string(),
        "gaps=yes".to_string(),
        "fmat=csv".to_string(),
        format!("solar={}", e5.display()),
        format!("target={}", out.display()),
    ])
    .unwrap();
    let report = Engine::new().run(&cfg).unwrap();
    assert_eq!(report.written.len(), 3);
    assert_eq!(report.suppressed, vec![(-32.5, 0.0)]);
    assert!(report
        .events
        .iter()
        .any(|e| e.contains("not created due to data gaps")));

    assert!(!out.join("solar_weather_-32.5_0.0_2019.csv").exists());
    let partial = fs::read_to_string(out.join("solar_weather_-32.5_0.5_2019.csv")).unwrap();
    let placeholder = ",".repeat(10);
    let gap_rows = partial.lines().filter(|l| *l == placeholder).count();
    assert_eq!(gap_rows, 100);
    assert_eq!(partial.lines().count(), 3 + 8760);

    let clean = fs::read_to_string(out.join("solar_weather_-32.0_0.0_2019.csv")).unwrap();
    assert!(!clean.lines().any(|l| l == placeholder));
}

/// SRW output from E5 wind plus hub-height extrapolation in one run.
#[test]
fn test_e5_wind_srw_with_hub_height() {
    let lats = [-32.5, -32.0];
    let lons = [0.0, 0.5];
    let root = tempfile::tempdir().unwrap();
    let e5 = root.path().join("e5");
    let out = root.path().join("out");
    fs::create_dir_all(&e5).unwrap();
    fs::create_dir_all(&out).unwrap();

    let h0 = hours_since_1900(2019, 1, 1);
    let stamps: Vec<i64> = (1..=8760).map(|i| h0 + i).collect();
    write_e5_year(
        &e5.join("era5_2019.nc"),
        &stamps,
        &lats,
        &lons,
        &[
            ("t2m", &|_, _| 283.15),
            ("sp", &|_, _| 101_325.0),
            ("u10", &|_, _| 3.0),
            ("v10", &|_, _| 4.0),
            ("u100", &|_, _| 6.0),
            ("v100", &|_, _| 8.0),
        ],
    );

    let cfg = AssembleConfig::from_tokens([
        "year=2019".to_string(),
        "zone=0".to_string(),
        "latlon=-32.25,0.25".to_string(),
        "fmat=wind".to_string(),
        "hub_height=150".to_string(),
        "law=power".to_string(),
        format!("wind={}", e5.display()),
        format!("target={}", out.display()),
    ])
    .unwrap();
    let report = Engine::new().run(&cfg).unwrap();
    assert_eq!(report.code, 0);

    let path = out.join("wind_weather_-32.25_0.25_2019.srw");
    assert!(path.is_file());
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5 + 8760);
    assert_eq!(lines[2], "Temperature,Pressure,Direction,Speed,Direction,Speed,Speed");
    assert_eq!(lines[4], "2,2,10,10,100,100,150");

    let fields: Vec<&str> = lines[5].split(',').collect();
    assert_eq!(fields.len(), 7);
    let spd100: f64 = fields[5].parse().unwrap();
    let spd150: f64 = fields[6].parse().unwrap();
    assert!((spd100 - 10.0).abs() < 1e-6);
    assert!(spd150 > spd100, "hub speed must exceed the 100 m speed");
}

/// A missing day mid-year falls back to the prior year once wrap is on.
#[test]
fn test_m2_wrap_to_prior_year() {
    let lats = [-33.0, -32.5, -32.0];
    let lons = [115.0, 115.625, 116.25];
    let root = tempfile::tempdir().unwrap();
    let slv = root.path().join("slv");
    let out = root.path().join("out");
    fs::create_dir_all(&slv).unwrap();
    fs::create_dir_all(&out).unwrap();

    let vars: &[(&str, f64)] = &[
        ("T2M", 288.15),
        ("T10M", 287.15),
        ("PS", 101_325.0),
        ("U2M", 1.0),
        ("V2M", 1.0),
        ("U10M", 3.0),
        ("V10M", 4.0),
        ("U50M", 5.0),
        ("V50M", 5.0),
    ];
    // 2021 stops after 15 Jan; 2020 covers the whole remainder.
    for year in [2020, 2021] {
        let mut date = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
        let end = if year == 2021 {
            NaiveDate::from_ymd_opt(2021, 1, 15).unwrap()
        } else {
            NaiveDate::from_ymd_opt(2020, 12, 31).unwrap()
        };
        while date <= end {
            let stamp = format!("{:04}{:02}{:02}", date.year(), date.month(), date.day());
            write_m2_day(&slv, "tavg1_2d_slv_Nx", &stamp, &lats, &lons, vars);
            date += Duration::days(1);
        }
    }

    let cfg = AssembleConfig::from_tokens([
        "year=2021".to_string(),
        "zone=0".to_string(),
        "wrap=yes".to_string(),
        "latlon=-32.25,115.3".to_string(),
        "fmat=srw".to_string(),
        format!("wind={}", slv.display()),
        format!("target={}", out.display()),
    ])
    .unwrap();
    let report = Engine::new().run(&cfg).unwrap();
    assert!(report.wrapped);
    assert!(report.events.iter().any(|e| e.contains("wrapping")));

    // zone=0 against longitudes near 115°E is flagged but still written.
    assert_eq!(report.code, 1);
    let text = fs::read_to_string(&report.written[0]).unwrap();
    assert_eq!(text.lines().count(), 5 + 8760);
}

/// Missing inputs without wrap surface as the structured missing-file
/// return code.
#[test]
fn test_missing_input_code() {
    let root = tempfile::tempdir().unwrap();
    let slv = root.path().join("slv");
    let out = root.path().join("out");
    fs::create_dir_all(&slv).unwrap();
    fs::create_dir_all(&out).unwrap();
    write_m2_day(
        &slv,
        "tavg1_2d_slv_Nx",
        "20210101",
        &[-32.0],
        &[115.0],
        &[
            ("T2M", 288.15),
            ("T10M", 287.15),
            ("PS", 101_325.0),
            ("U2M", 1.0),
            ("V2M", 1.0),
            ("U10M", 3.0),
            ("V10M", 4.0),
            ("U50M", 5.0),
            ("V50M", 5.0),
        ],
    );

    let cfg = AssembleConfig::from_tokens([
        "year=2021".to_string(),
        "zone=0".to_string(),
        "wrap=no".to_string(),
        "fmat=srw".to_string(),
        format!("wind={}", slv.display()),
        format!("target={}", out.display()),
    ])
    .unwrap();
    let err = Engine::new().run(&cfg).unwrap_err();
    assert_eq!(err.return_code(), 4);
}

/// The wrap to the prior year happens at most once: a miss in the
/// wrapped year is fatal rather than wrapping again.
#[test]
fn test_second_miss_after_wrap_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let slv = root.path().join("slv");
    let out = root.path().join("out");
    fs::create_dir_all(&slv).unwrap();
    fs::create_dir_all(&out).unwrap();
    let vars: [(&str, f64); 9] = [
        ("T2M", 288.15),
        ("T10M", 287.15),
        ("PS", 101_325.0),
        ("U2M", 1.0),
        ("V2M", 1.0),
        ("U10M", 3.0),
        ("V10M", 4.0),
        ("U50M", 5.0),
        ("V50M", 5.0),
    ];
    // 2021 stops after 1 Jan; 2020 covers 2 Jan but not 3 Jan.
    write_m2_day(&slv, "tavg1_2d_slv_Nx", "20210101", &[-32.0], &[115.0], &vars);
    write_m2_day(&slv, "tavg1_2d_slv_Nx", "20200102", &[-32.0], &[115.0], &vars);

    let cfg = AssembleConfig::from_tokens([
        "year=2021".to_string(),
        "zone=0".to_string(),
        "fmat=srw".to_string(),
        format!("wind={}", slv.display()),
        format!("target={}", out.display()),
    ])
    .unwrap();
    let err = Engine::new().run(&cfg).unwrap_err();
    assert_eq!(err.return_code(), 4);
    // The fatal miss is reported against the wrapped year, so the run
    // wrapped exactly once and did not retry a second time.
    assert!(err.to_string().contains("2020-01-03"), "{}", err);
}

/// A pre-raised cancel flag stops the run before any file is written;
/// without it the same run completes and reports progress.
#[test]
fn test_cancel_and_progress() {
    let lats = [-32.5, -32.0];
    let lons = [0.0, 0.5];
    let root = tempfile::tempdir().unwrap();
    let e5 = root.path().join("e5");
    let out = root.path().join("out");
    fs::create_dir_all(&e5).unwrap();
    fs::create_dir_all(&out).unwrap();

    let h0 = hours_since_1900(2019, 1, 1);
    let stamps: Vec<i64> = (1..=8760).map(|i| h0 + i).collect();
    write_e5_year(
        &e5.join("era5_2019.nc"),
        &stamps,
        &lats,
        &lons,
        &[
            ("ssrd", &|_, _| 1_800_000.0),
            ("t2m", &|_, _| 290.15),
            ("sp", &|_, _| 101_325.0),
            ("u10", &|_, _| 2.0),
            ("v10", &|_, _| 2.0),
        ],
    );

    let cfg = AssembleConfig::from_tokens([
        "year=2019".to_string(),
        "zone=0".to_string(),
        "fmat=csv".to_string(),
        format!("solar={}", e5.display()),
        format!("target={}", out.display()),
    ])
    .unwrap();

    let flag = Arc::new(AtomicBool::new(true));
    let err = Engine::new().with_cancel(Arc::clone(&flag)).run(&cfg).unwrap_err();
    assert_eq!(err.return_code(), 5);
    assert_eq!(fs::read_dir(&out).unwrap().count(), 0);

    flag.store(false, Ordering::Relaxed);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let report = Engine::new()
        .with_cancel(flag)
        .with_progress(Box::new(move |pct, msg| {
            sink.lock().unwrap().push((pct, msg.to_string()));
        }))
        .run(&cfg)
        .unwrap();
    assert_eq!(report.code, 0);
    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert_eq!(seen.last().unwrap().0, 100);
}
