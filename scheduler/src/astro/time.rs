//! Time scales for scheduling: Modified Julian Date, sidereal time and
//! wraparound-aware clock arithmetic.

use serde::{Deserialize, Serialize};

use super::JD_J2000;

/// Offset between Julian Date and Modified Julian Date.
const MJD_JD_OFFSET: f64 = 2_400_000.5;
/// MJD of the Unix epoch (1970-01-01 00:00:00 UTC).
const MJD_UNIX_EPOCH: f64 = 40_587.0;

/// Modified Julian Date representation.
/// MJD 0 = 1858-11-17 00:00:00 UTC
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ModifiedJulianDate(f64);

impl ModifiedJulianDate {
    /// Create a new MJD value.
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// Raw MJD value as f64.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Create from a full Julian Date.
    pub fn from_jd(jd: f64) -> Self {
        Self(jd - MJD_JD_OFFSET)
    }

    /// Full Julian Date.
    pub fn to_jd(&self) -> f64 {
        self.0 + MJD_JD_OFFSET
    }

    /// Convert to Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    pub fn to_unix_timestamp(&self) -> f64 {
        (self.0 - MJD_UNIX_EPOCH) * 86_400.0
    }

    /// Create from Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    pub fn from_unix_timestamp(timestamp: f64) -> Self {
        Self(timestamp / 86_400.0 + MJD_UNIX_EPOCH)
    }

    /// Convert to chrono `DateTime<Utc>`.
    pub fn to_datetime(&self) -> chrono::DateTime<chrono::Utc> {
        let secs = self.to_unix_timestamp();
        let secs_i64 = secs.floor() as i64;
        let nanos = ((secs - secs.floor()) * 1e9) as u32;
        chrono::DateTime::from_timestamp(secs_i64, nanos).unwrap_or(chrono::DateTime::UNIX_EPOCH)
    }

    /// Create from chrono `DateTime<Utc>`.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self::from_unix_timestamp(dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1e9)
    }

    /// This MJD shifted by a number of hours.
    pub fn add_hours(&self, hours: f64) -> Self {
        Self(self.0 + hours / 24.0)
    }

    /// This MJD shifted by a number of days.
    pub fn add_days(&self, days: f64) -> Self {
        Self(self.0 + days)
    }

    /// Signed difference `self - other` in hours.
    pub fn hours_since(&self, other: ModifiedJulianDate) -> f64 {
        (self.0 - other.0) * 24.0
    }

    /// UT hours into the current day (0-24).
    pub fn ut_hours(&self) -> f64 {
        normalize_hours(self.0.fract() * 24.0)
    }
}

impl From<f64> for ModifiedJulianDate {
    fn from(v: f64) -> Self {
        ModifiedJulianDate::new(v)
    }
}

/// Julian Date for a civil UT date and decimal hour.
pub fn julian_date(year: i32, month: u32, day: u32, hour: f64) -> f64 {
    let (mut y, mut m) = (year, month as i32);
    if m <= 2 {
        y -= 1;
        m += 12;
    }
    let a = y / 100;
    let b = 2 - a + a / 4;
    let jd0 = (365.25 * (y as f64 + 4716.0)).floor() + (30.6001 * (m as f64 + 1.0)).floor()
        + day as f64
        + b as f64
        - 1524.5;
    jd0 + hour / 24.0
}

/// Greenwich Mean Sidereal Time in hours (0-24) at the given Julian Date.
pub fn gmst(jd: f64) -> f64 {
    // The polynomial is anchored at the preceding 0h UT; the elapsed UT is
    // then scaled by the sidereal rate.
    let jd0 = (jd - 0.5).floor() + 0.5;
    let t = (jd0 - JD_J2000) / 36_525.0;
    let gmst0 = 6.697_374_558 + 2_400.051_336 * t + 0.000_025_862 * t * t;
    let ut_hours = (jd - jd0) * 24.0;
    normalize_hours(gmst0 + ut_hours * 1.002_737_909_35)
}

/// Local Sidereal Time in hours (0-24).
///
/// # Arguments
/// * `jd` - Julian Date
/// * `longitude_hours_west` - observatory longitude in hours, west positive
pub fn lst(jd: f64, longitude_hours_west: f64) -> f64 {
    normalize_hours(gmst(jd) - longitude_hours_west)
}

/// Difference `h2 - h1` between two 24-hour clock values, wrapped so that the
/// result lies in [-12, 12].
pub fn clock_difference(h1: f64, h2: f64) -> f64 {
    let mut dt = h2 - h1;
    if dt > 12.0 {
        dt -= 24.0;
    }
    if dt < -12.0 {
        dt += 24.0;
    }
    dt
}

/// Wrap an hour value into [0, 24).
pub fn normalize_hours(mut h: f64) -> f64 {
    while h >= 24.0 {
        h -= 24.0;
    }
    while h < 0.0 {
        h += 24.0;
    }
    h
}
