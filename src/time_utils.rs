//! Calendar arithmetic for the hourly assembly loop.
//!
//! The assembled year is always 8760 hours long: local hours are mapped to
//! month/day/hour through a fixed non-leap calendar, and 29 Feb never
//! appears in output even when the input data covers a leap year.

/// Integer Julian day number (Fliegel & Van Flandern).
pub fn julian(year: i64, month: i64, day: i64) -> i64 {
    day - 32075
        + 1461 * (year + 4800 + (month - 14) / 12) / 4
        + 367 * (month - 2 - (month - 14) / 12 * 12) / 12
        - 3 * ((year + 4900 + (month - 14) / 12) / 100) / 4
}

/// Inverse of [`julian`]: (year, month, day).
pub fn gregorian(jd: i64) -> (i64, i64, i64) {
    let l = jd + 68569;
    let n = 4 * l / 146097;
    let l = l - (146097 * n + 3) / 4;
    let i = 4000 * (l + 1) / 1461001;
    let l = l - 1461 * i / 4 + 31;
    let j = 80 * l / 2447;
    let k = l - 2447 * j / 80;
    let l = j / 11;
    let j = j + 2 - 12 * l;
    let i = 100 * (n - 49) + i + l;

    (i, j, k)
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Calendar month length, leap-aware. Input files are addressed with this.
pub fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => panic!("Invalid month: {}", month),
    }
}

/// Month length in the fixed 8760-hour output calendar: February is
/// always 28 days.
pub fn output_days_in_month(month: u8) -> u8 {
    match month {
        2 => 28,
        m => days_in_month(2001, m),
    }
}

/// Hours elapsed from 1900-01-01 00:00 to `year-month-day` 00:00.
/// This is the time base of the E5 `hours since 1900-01-01` axis.
pub fn hours_since_1900(year: i32, month: u8, day: u8) -> i64 {
    (julian(year as i64, month as i64, day as i64) - julian(1900, 1, 1)) * 24
}

/// Map a 1-based hour-of-year (1..=8760) onto the non-leap output
/// calendar: (month 1..=12, day-of-month 1..=31, hour 0..=23).
pub fn local_calendar(hour_of_year: u32) -> (u8, u8, u8) {
    debug_assert!((1..=8760).contains(&hour_of_year));
    let mut day = (hour_of_year - 1) / 24;
    let hour = ((hour_of_year - 1) % 24) as u8;
    let mut month = 1u8;
    loop {
        let len = output_days_in_month(month) as u32;
        if day < len {
            return (month, day as u8 + 1, hour);
        }
        day -= len;
        month += 1;
    }
}

/// 1-based day-of-year for an hour-of-year.
pub fn day_of_year(hour_of_year: u32) -> u32 {
    (hour_of_year - 1) / 24 + 1
}

/// 1-based hour-of-day (1..=24) for an hour-of-year.
pub fn hour_of_day(hour_of_year: u32) -> u32 {
    (hour_of_year - 1) % 24 + 1
}
