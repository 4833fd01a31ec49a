//! Wind vector conversion and vertical extrapolation laws.

use crate::units::round_to;
use std::fmt;
use std::str::FromStr;

/// Calm-wind threshold on the v component (m/s).
const CALM_V: f64 = 1e-6;

/// Convert u/v components into (speed, direction-from).
///
/// Speed is rounded to four decimals; direction to a whole degree in
/// [0, 360).
pub fn speed_direction(u: f64, v: f64) -> (f64, f64) {
    let speed = round_to((u * u + v * v).sqrt(), 4);
    let direction = if v.abs() < CALM_V {
        if v >= 0.0 {
            270.0
        } else {
            90.0
        }
    } else {
        let theta = (u / v).atan().to_degrees();
        if v > 0.0 {
            theta + 180.0
        } else {
            (theta + 360.0) % 360.0
        }
    };
    (speed, direction.round().rem_euclid(360.0))
}

/// Vertical wind-profile law used for hub-height extrapolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileLaw {
    Logarithmic,
    Power,
}

impl FromStr for ProfileLaw {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "logarithmic" | "log" | "l" => Ok(Self::Logarithmic),
            "power" | "p" => Ok(Self::Power),
            other => Err(format!("unknown profile law: {}", other)),
        }
    }
}

impl fmt::Display for ProfileLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logarithmic => write!(f, "logarithmic"),
            Self::Power => write!(f, "power"),
        }
    }
}

/// Extrapolate a wind speed to `hub` metres from measurements `v1` at
/// `h1` and `v2` at `h2` (with `h1 < h2 <= hub`).
///
/// The logarithmic law back-solves the roughness length from the two
/// measured points; the power law fits the shear exponent. Calm or
/// shear-free measurement pairs carry the upper speed through unchanged.
pub fn extrapolate_speed(law: ProfileLaw, v1: f64, h1: f64, v2: f64, h2: f64, hub: f64) -> f64 {
    if v1 <= 0.0 || v2 <= 0.0 || (v2 - v1).abs() < f64::EPSILON {
        return round_to(v2.max(0.0), 4);
    }
    let v = match law {
        ProfileLaw::Power => {
            let alpha = (v2 / v1).ln() / (h2 / h1).ln();
            v1 * (hub / h1).powf(alpha)
        }
        ProfileLaw::Logarithmic => {
            let z0 = ((v2 * h1.ln() - v1 * h2.ln()) / (v2 - v1)).exp();
            if !z0.is_finite() || z0 <= 0.0 || z0 >= h1 {
                v2
            } else {
                v1 * (hub / z0).ln() / (h1 / z0).ln()
            }
        }
    };
    round_to(v.max(0.0), 4)
}
