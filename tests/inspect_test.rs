use std::fs;
use std::path::Path;

use reweather::inspect::inspect;

fn write_grid_file(path: &Path, lats: &[f64], lons: &[f64]) {
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("lat", lats.len()).unwrap();
    file.add_dimension("lon", lons.len()).unwrap();
    let mut v = file.add_variable::<f64>("lat", &["lat"]).unwrap();
    v.put_values(lats, ..).unwrap();
    let mut v = file.add_variable::<f64>("lon", &["lon"]).unwrap();
    v.put_values(lons, ..).unwrap();
}

#[test]
fn test_annual_tree_with_hole() {
    let lats = [-33.0, -32.75, -32.5];
    let lons = [115.0, 115.25, 115.5];
    let dir = tempfile::tempdir().unwrap();
    for year in [2018, 2019, 2021] {
        write_grid_file(&dir.path().join(format!("era5_{}.nc", year)), &lats, &lons);
    }
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let report = inspect(dir.path()).unwrap();
    assert_eq!(report.first, 201801);
    assert_eq!(report.last, 201912);
    assert_eq!(report.gaps, vec![2020]);
    assert_eq!(report.file_count, 3);

    let bbox = report.bbox.unwrap();
    assert_eq!(bbox.south, -33.0);
    assert_eq!(bbox.north, -32.5);
    assert_eq!(bbox.west, 115.0);
    assert_eq!(bbox.east, 115.5);
    assert_eq!(report.grid_step, Some((0.25, 0.25)));
}

#[test]
fn test_m2_daily_tree_in_year_subdir() {
    let lats = [-33.0, -32.5];
    let lons = [115.0, 115.625];
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("2020");
    fs::create_dir(&sub).unwrap();
    for day in ["20200101", "20200102"] {
        write_grid_file(
            &sub.join(format!("MERRA2_400.tavg1_2d_slv_Nx.{}.nc4", day)),
            &lats,
            &lons,
        );
    }
    write_grid_file(
        &dir.path()
            .join("MERRA2_400.tavg1_2d_slv_Nx.20200301.nc4"),
        &lats,
        &lons,
    );

    let report = inspect(dir.path()).unwrap();
    assert_eq!(report.first, 202001);
    assert_eq!(report.last, 202001);
    assert!(report.gaps.is_empty());
    assert_eq!(report.file_count, 3);
    assert_eq!(report.grid_step, Some((0.5, 0.625)));
}

#[test]
fn test_empty_tree() {
    let dir = tempfile::tempdir().unwrap();
    assert!(inspect(dir.path()).is_err());
}
