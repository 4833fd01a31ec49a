//! Unit conversions and the rounding conventions of the output columns.
//!
//! Downstream simulation models historically parsed fixed-width numeric
//! strings, so the precision of each column is part of the contract.

pub const STD_PRESSURE_MBAR: f64 = 1013.25;
pub const PA_PER_ATM: f64 = 101_325.0;

/// Sentinel used for columns the input dataset cannot supply.
pub const MISSING: f64 = -999.0;

/// Round `v` to `decimals` decimal places.
pub fn round_to(v: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (v * scale).round() / scale
}

/// Kelvin to Celsius, one decimal.
pub fn kelvin_to_celsius(k: f64) -> f64 {
    round_to(k - 273.15, 1)
}

/// Pascal to atmospheres, six decimals (SRW wind pressure column).
pub fn pa_to_atm(pa: f64) -> f64 {
    round_to(pa / PA_PER_ATM, 6)
}

/// Pascal to millibar, whole numbers (CSV/SMW solar pressure column).
pub fn pa_to_mbar(pa: f64) -> f64 {
    round_to(pa / 100.0, 0)
}

/// E5 accumulated radiation (J·m⁻² over one hour) to mean W·m⁻².
pub fn joules_per_hour_to_watts(j: f64) -> f64 {
    j / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_conversion() {
        assert_eq!(kelvin_to_celsius(273.15), 0.0);
        assert_eq!(kelvin_to_celsius(293.178), 20.0);
        assert_eq!(kelvin_to_celsius(250.0), -23.2);
    }

    #[test]
    fn test_pressure_conversions() {
        assert_eq!(pa_to_atm(101_325.0), 1.0);
        assert_eq!(pa_to_atm(97_000.0), 0.957316);
        assert_eq!(pa_to_mbar(101_325.0), 1013.0);
        assert_eq!(pa_to_mbar(100_049.0), 1000.0);
    }

    #[test]
    fn test_radiation_conversion() {
        assert_eq!(joules_per_hour_to_watts(3_600_000.0), 1000.0);
    }
}
