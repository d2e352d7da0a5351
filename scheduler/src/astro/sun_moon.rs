//! Low-precision solar and lunar ephemerides, and twilight times.

use super::{riset, DEG_PER_RAD, HOURS_PER_RAD, JD_J2000};

/// Sun altitude at sunset/sunrise, accounting for refraction and the solar
/// radius.
const HORIZON_ALT_DEG: f64 = -0.833;
/// Sun altitude defining civil twilight.
pub const CIVIL_ALT_DEG: f64 = -6.0;
/// Sun altitude defining nautical twilight.
pub const NAUTICAL_ALT_DEG: f64 = -12.0;
/// Sun altitude defining astronomical twilight.
pub const ASTRONOMICAL_ALT_DEG: f64 = -18.0;

/// Moon position and phase at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct MoonEphemeris {
    /// Right ascension in hours.
    pub ra_hours: f64,
    /// Declination in degrees.
    pub dec_deg: f64,
    /// Illuminated fraction of the disk, 0 (new) to 1 (full).
    pub illuminated_fraction: f64,
}

/// One evening/morning crossing pair of a sun-altitude threshold.
#[derive(Debug, Clone, Copy)]
pub struct TwilightPair {
    /// Evening crossing (sun descending), as a Julian Date.
    pub evening_jd: f64,
    /// Morning crossing (sun ascending), as a Julian Date.
    pub morning_jd: f64,
}

/// Sunset/sunrise and the three twilight pairs for one night.
#[derive(Debug, Clone, Copy)]
pub struct TwilightTimes {
    pub sunset_jd: f64,
    pub sunrise_jd: f64,
    pub civil: Option<TwilightPair>,
    pub nautical: Option<TwilightPair>,
    pub astronomical: Option<TwilightPair>,
}

/// Low-precision solar position: RA in hours, Dec in degrees.
pub fn sun_position(jd: f64) -> (f64, f64) {
    let n = jd - JD_J2000;
    let mean_lon = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
    let mean_anom = ((357.528 + 0.985_600_3 * n).rem_euclid(360.0)) / DEG_PER_RAD;

    // Equation of center.
    let lambda_sun =
        (mean_lon + 1.915 * mean_anom.sin() + 0.020 * (2.0 * mean_anom).sin()) / DEG_PER_RAD;
    let eps = (23.439 - 0.000_000_4 * n) / DEG_PER_RAD;

    let ra = (eps.cos() * lambda_sun.sin()).atan2(lambda_sun.cos());
    let dec = (eps.sin() * lambda_sun.sin()).asin();

    let mut ra_hours = ra * HOURS_PER_RAD;
    if ra_hours < 0.0 {
        ra_hours += 24.0;
    }
    (ra_hours, dec * DEG_PER_RAD)
}

/// Sunset, sunrise and twilight crossings for the night following `jd_noon`.
///
/// `jd_noon` should be the Julian Date of local noon; the evening crossings
/// then land before the morning ones. A twilight pair is `None` at latitudes
/// and seasons where the sun never goes that far down.
pub fn twilight_times(jd_noon: f64, longitude_hours_west: f64, lat_deg: f64) -> Option<TwilightTimes> {
    let (sun_ra, sun_dec) = sun_position(jd_noon);

    let pair = |alt: f64| -> Option<TwilightPair> {
        let (rise, set) =
            riset::rise_set_times(sun_ra, sun_dec, jd_noon, longitude_hours_west, lat_deg, alt);
        match (rise, set) {
            // Searching forward from noon, the sun sets before it rises
            // again, so the "set" crossing is the evening one.
            (Some(morning), Some(evening)) if evening < morning => Some(TwilightPair {
                evening_jd: evening,
                morning_jd: morning,
            }),
            _ => None,
        }
    };

    let horizon = pair(HORIZON_ALT_DEG)?;
    Some(TwilightTimes {
        sunset_jd: horizon.evening_jd,
        sunrise_jd: horizon.morning_jd,
        civil: pair(CIVIL_ALT_DEG),
        nautical: pair(NAUTICAL_ALT_DEG),
        astronomical: pair(ASTRONOMICAL_ALT_DEG),
    })
}

/// Approximate moon position and illuminated fraction.
pub fn moon_position(jd: f64) -> MoonEphemeris {
    let n = jd - JD_J2000;
    let t = n / 36_525.0;

    // Mean elements of the lunar orbit, in degrees.
    let mean_lon = 218.316 + 13.176_396 * n;
    let mean_anom = (134.963 + 13.064_993 * n) / DEG_PER_RAD;
    let node_dist = (93.272 + 13.229_350 * n) / DEG_PER_RAD;

    // First-order corrections in ecliptic longitude and latitude.
    let lon = (mean_lon + 6.289 * mean_anom.sin()) / DEG_PER_RAD;
    let lat = (5.128 * node_dist.sin()) / DEG_PER_RAD;

    let eps = (23.439_291 - 0.013_004_2 * t) / DEG_PER_RAD;

    let ra = (lon.sin() * eps.cos() - lat.tan() * eps.sin()).atan2(lon.cos());
    let dec = (lat.sin() * eps.cos() + lat.cos() * eps.sin() * lon.sin()).asin();

    let mut ra_hours = ra * HOURS_PER_RAD;
    while ra_hours < 0.0 {
        ra_hours += 24.0;
    }
    while ra_hours >= 24.0 {
        ra_hours -= 24.0;
    }

    // Illumination from the elongation against the mean sun.
    let sun_lon = (280.460 + 0.985_647_4 * n) / DEG_PER_RAD;
    let elongation = lon - sun_lon;
    let illuminated_fraction = 0.5 * (1.0 - elongation.cos());

    MoonEphemeris {
        ra_hours,
        dec_deg: dec * DEG_PER_RAD,
        illuminated_fraction,
    }
}
