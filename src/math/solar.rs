//! Solar-geometry kernel: Spencer series for the orbital terms, the DISC
//! regression for direct-normal irradiance, and the flat-receiver diffuse
//! split. All functions are pure; angles are degrees at the API surface
//! unless a name says otherwise.

use crate::time_utils::{day_of_year, hour_of_day};
use crate::units::{round_to, STD_PRESSURE_MBAR};

/// Day angle in radians for a 1-based day-of-year.
pub fn day_angle(day: u32) -> f64 {
    2.0 * std::f64::consts::PI * (day as f64 - 1.0) / 365.0
}

/// Extraterrestrial radiation (W·m⁻²) for a day angle.
pub fn extraterrestrial(da: f64) -> f64 {
    1370.0
        * (1.00011
            + 0.034221 * da.cos()
            + 0.00128 * da.sin()
            + 0.000719 * (2.0 * da).cos()
            + 0.000077 * (2.0 * da).sin())
}

/// Solar declination in radians (Spencer 1971).
pub fn declination(da: f64) -> f64 {
    0.006918 - 0.399912 * da.cos() + 0.070257 * da.sin() - 0.006758 * (2.0 * da).cos()
        + 0.000907 * (2.0 * da).sin()
        - 0.002697 * (3.0 * da).cos()
        + 0.00148 * (3.0 * da).sin()
}

/// Equation of time in minutes (Spencer 1971).
pub fn equation_of_time(da: f64) -> f64 {
    229.18
        * (0.000075 + 0.001868 * da.cos()
            - 0.032077 * da.sin()
            - 0.014615 * (2.0 * da).cos()
            - 0.040849 * (2.0 * da).sin())
}

/// Hour angle in degrees at the midpoint of the averaging hour.
/// `hour` is the 1-based hour-of-day; `zone` is integer hours east of GMT.
pub fn hour_angle(hour: u32, eqt_min: f64, longitude: f64, zone: i32) -> f64 {
    15.0 * (hour as f64 - 12.0 - 0.5
        + eqt_min / 60.0
        + (longitude - zone as f64 * 15.0) * 4.0 / 60.0)
}

/// Solar zenith angle in radians.
pub fn zenith(declination_rad: f64, latitude_rad: f64, hour_angle_rad: f64) -> f64 {
    let cos_z = declination_rad.cos() * latitude_rad.cos() * hour_angle_rad.cos()
        + declination_rad.sin() * latitude_rad.sin();
    cos_z.clamp(-1.0, 1.0).acos()
}

/// Pressure-corrected relative air mass (Kasten). Zero when the sun is
/// within 10 degrees of the horizon or below it.
pub fn air_mass(zenith_rad: f64, pressure_mbar: f64) -> f64 {
    let z_deg = zenith_rad.to_degrees();
    if z_deg < 80.0 {
        (zenith_rad.cos() + 0.15 * (93.885 - z_deg).powf(-1.253)).recip() * pressure_mbar
            / STD_PRESSURE_MBAR
    } else {
        0.0
    }
}

/// Direct-normal irradiance from global-horizontal via the DISC model.
///
/// `hour_of_year` is 1..=8760 in local standard time; negative GHI is
/// treated as 0 silently.
pub fn disc_dni(
    ghi: f64,
    hour_of_year: u32,
    latitude: f64,
    longitude: f64,
    zone: i32,
    pressure_mbar: f64,
) -> f64 {
    let ghi = ghi.max(0.0);
    let da = day_angle(day_of_year(hour_of_year));
    let etr = extraterrestrial(da);
    let dec = declination(da);
    let eqt = equation_of_time(da);
    let ha = hour_angle(hour_of_day(hour_of_year), eqt, longitude, zone).to_radians();
    let z = zenith(dec, latitude.to_radians(), ha);
    let am = air_mass(z, pressure_mbar);

    let kt = if am > 0.0 { ghi / (z.cos() * etr) } else { 0.0 };
    if kt <= 0.0 {
        return 0.0;
    }

    // DISC direct-beam clearness; the polynomials branch at kt = 0.6.
    let (a, b, c) = if kt > 0.6 {
        (
            -5.743 + 21.77 * kt - 27.49 * kt.powi(2) + 11.56 * kt.powi(3),
            41.40 - 118.5 * kt + 66.05 * kt.powi(2) + 31.90 * kt.powi(3),
            -47.01 + 184.2 * kt - 222.0 * kt.powi(2) + 73.81 * kt.powi(3),
        )
    } else {
        (
            0.512 - 1.56 * kt + 2.286 * kt.powi(2) - 2.222 * kt.powi(3),
            0.370 + 0.962 * kt,
            -0.280 + 0.932 * kt - 2.048 * kt.powi(2),
        )
    };
    let kn = a + b * (c * am).exp();
    let knc = 0.886 - 0.122 * am + 0.0121 * am.powi(2) - 0.000653 * am.powi(3)
        + 0.000014 * am.powi(4);

    (etr * (knc - kn)).max(0.0)
}

/// Diffuse-horizontal irradiance for a reference receiver at `tilt_deg`
/// (0 = flat). Uses a declination formula anchored at day + 10.5 and a
/// sunrise/sunset-aware hour angle.
pub fn diffuse_horizontal(
    ghi: f64,
    dni: f64,
    hour_of_year: u32,
    latitude: f64,
    longitude: f64,
    zone: i32,
    tilt_deg: f64,
) -> f64 {
    let ghi = ghi.max(0.0);
    let day = day_of_year(hour_of_year) as f64;
    let dec = (-23.45 * (2.0 * std::f64::consts::PI * (day + 10.5) / 365.0).cos()).to_radians();
    let lat = latitude.to_radians();
    let eqt = equation_of_time(day_angle(day_of_year(hour_of_year)));

    let ha_mid = hour_angle(hour_of_day(hour_of_year), eqt, longitude, zone);
    let ha = sunrise_corrected_hour_angle(ha_mid, lat, dec).to_radians();

    let alt = (lat.cos() * dec.cos() * ha.cos() + lat.sin() * dec.sin())
        .clamp(-1.0, 1.0)
        .asin();
    if alt <= 0.0 {
        return 0.0;
    }
    let tilt_factor = (tilt_deg.to_radians() / 2.0).cos().powi(2);
    round_to((ghi - dni * alt.sin()).max(0.0) * tilt_factor, 1)
}

/// When the one-hour averaging window straddles sunrise or sunset, move
/// the effective hour angle to the midpoint of the lit sub-window.
fn sunrise_corrected_hour_angle(ha_mid_deg: f64, latitude_rad: f64, declination_rad: f64) -> f64 {
    const HALF_WINDOW: f64 = 7.5; // degrees, half of one hour
    let ws = (-latitude_rad.tan() * declination_rad.tan())
        .clamp(-1.0, 1.0)
        .acos()
        .to_degrees();
    let (lo, hi) = (ha_mid_deg - HALF_WINDOW, ha_mid_deg + HALF_WINDOW);
    if lo < -ws && -ws < hi {
        (-ws + hi) / 2.0
    } else if lo < ws && ws < hi {
        (lo + ws) / 2.0
    } else {
        ha_mid_deg
    }
}
