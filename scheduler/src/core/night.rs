//! The night's timing envelope and the observatory site.

use serde::{Deserialize, Serialize};

use crate::astro::{ModifiedJulianDate, MoonEphemeris};

/// Observatory location and timezone configuration. Immutable per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteParams {
    pub name: String,
    /// Longitude in degrees, east positive.
    pub longitude_deg: f64,
    /// Latitude in degrees, north positive.
    pub latitude_deg: f64,
    /// Elevation above sea level in meters.
    pub elevation_m: f64,
    /// Standard timezone offset from UTC in hours.
    pub utc_offset_hours: f64,
}

impl SiteParams {
    /// Longitude in the hours-west convention used by the sidereal-time and
    /// rise/set routines.
    pub fn longitude_hours_west(&self) -> f64 {
        -self.longitude_deg / 15.0
    }
}

/// Timing envelope of one night: twilight boundaries, the chosen observing
/// window, sidereal time at the window edges and the moon at window start.
/// Computed once by the night planner, read-only thereafter.
#[derive(Debug, Clone)]
pub struct NightTimes {
    pub sunset: ModifiedJulianDate,
    pub sunrise: ModifiedJulianDate,
    pub civil_dusk: ModifiedJulianDate,
    pub civil_dawn: ModifiedJulianDate,
    pub nautical_dusk: ModifiedJulianDate,
    pub nautical_dawn: ModifiedJulianDate,
    pub astronomical_dusk: ModifiedJulianDate,
    pub astronomical_dawn: ModifiedJulianDate,

    /// Observing window start: chosen twilight plus the startup delay.
    pub window_start: ModifiedJulianDate,
    /// Observing window end: opposite twilight minus the execution margin.
    pub window_end: ModifiedJulianDate,

    /// UT hours at the window edges.
    pub ut_start: f64,
    pub ut_end: f64,
    /// Local sidereal time in hours at the window edges.
    pub lst_start: f64,
    pub lst_end: f64,

    /// Moon position and illumination at window start.
    pub moon: MoonEphemeris,
}

impl NightTimes {
    /// Length of the observing window in hours.
    pub fn dark_hours(&self) -> f64 {
        self.window_end.hours_since(self.window_start)
    }

    /// Hours from `now` until sunrise.
    pub fn hours_until_sunrise(&self, now: ModifiedJulianDate) -> f64 {
        self.sunrise.hours_since(now)
    }

    /// Whether `t` falls inside the observing window.
    pub fn contains(&self, t: ModifiedJulianDate) -> bool {
        t >= self.window_start && t <= self.window_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longitude_convention_flips_sign() {
        let site = SiteParams {
            name: "La Silla".to_string(),
            longitude_deg: -70.73,
            latitude_deg: -29.25,
            elevation_m: 2400.0,
            utc_offset_hours: -4.0,
        };
        assert!((site.longitude_hours_west() - 70.73 / 15.0).abs() < 1e-12);
    }
}
