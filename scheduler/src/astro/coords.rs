//! Coordinate transforms and the airmass model.

use super::{time::normalize_hours, DEG_PER_RAD, HOURS_PER_RAD, JD_J2000};

/// Airmass reported for positions at or below the horizon.
pub const BELOW_HORIZON_AIRMASS: f64 = 999.9;

/// Hour angle of a position in hours, wrapped to [-12, 12].
pub fn hour_angle(ra_hours: f64, lst_hours: f64) -> f64 {
    let mut ha = lst_hours - ra_hours;
    if ha <= -12.0 {
        ha += 24.0;
    } else if ha >= 12.0 {
        ha -= 24.0;
    }
    ha
}

/// Altitude and azimuth (degrees) of a position at the given sidereal time.
pub fn altitude_azimuth(ra_hours: f64, dec_deg: f64, lst_hours: f64, lat_deg: f64) -> (f64, f64) {
    let ha_rad = hour_angle(ra_hours, lst_hours) / HOURS_PER_RAD;
    let dec_rad = dec_deg / DEG_PER_RAD;
    let lat_rad = lat_deg / DEG_PER_RAD;

    let sin_alt =
        (dec_rad.sin() * lat_rad.sin() + dec_rad.cos() * lat_rad.cos() * ha_rad.cos()).clamp(-1.0, 1.0);
    let alt_rad = sin_alt.asin();

    let cos_az = (dec_rad.sin() - sin_alt * lat_rad.sin()) / (alt_rad.cos() * lat_rad.cos());
    let sin_az = -ha_rad.sin() * dec_rad.cos() / alt_rad.cos();
    let mut az = sin_az.atan2(cos_az) * DEG_PER_RAD;
    if az < 0.0 {
        az += 360.0;
    }

    (alt_rad * DEG_PER_RAD, az)
}

/// Plane-parallel (secant) airmass at a given altitude in degrees.
///
/// 1.0 at zenith, growing toward the horizon; [`BELOW_HORIZON_AIRMASS`] for
/// altitudes at or below zero.
pub fn airmass(altitude_deg: f64) -> f64 {
    if altitude_deg <= 0.0 {
        return BELOW_HORIZON_AIRMASS;
    }
    let zenith_rad = (90.0 - altitude_deg) / DEG_PER_RAD;
    1.0 / zenith_rad.cos()
}

/// Angular separation in degrees between two equatorial positions
/// (spherical law of cosines).
pub fn separation_deg(ra1_hours: f64, dec1_deg: f64, ra2_hours: f64, dec2_deg: f64) -> f64 {
    let ra1 = ra1_hours / HOURS_PER_RAD;
    let dec1 = dec1_deg / DEG_PER_RAD;
    let ra2 = ra2_hours / HOURS_PER_RAD;
    let dec2 = dec2_deg / DEG_PER_RAD;

    let cos_sep =
        (dec1.sin() * dec2.sin() + dec1.cos() * dec2.cos() * (ra1 - ra2).cos()).clamp(-1.0, 1.0);
    cos_sep.acos() * DEG_PER_RAD
}

/// Galactic longitude and latitude (degrees) of a J2000 equatorial position.
pub fn galactic_coordinates(ra_hours: f64, dec_deg: f64) -> (f64, f64) {
    let ra = ra_hours / HOURS_PER_RAD;
    let dec = dec_deg / DEG_PER_RAD;

    // North galactic pole and the galactic longitude of the north celestial
    // pole, J2000.
    let ra_gp = 12.8605 / HOURS_PER_RAD;
    let dec_gp = 27.1282 / DEG_PER_RAD;
    let l_ncp = 122.932 / DEG_PER_RAD;

    let sin_b = (dec.sin() * dec_gp.sin() + dec.cos() * dec_gp.cos() * (ra - ra_gp).cos())
        .clamp(-1.0, 1.0);
    let b = sin_b.asin();

    let sin_l = dec.cos() * (ra - ra_gp).sin() / b.cos();
    let cos_l = (dec.sin() - b.sin() * dec_gp.sin()) / (b.cos() * dec_gp.cos());
    let mut l = (l_ncp - sin_l.atan2(cos_l)) * DEG_PER_RAD;

    while l < 0.0 {
        l += 360.0;
    }
    while l >= 360.0 {
        l -= 360.0;
    }

    (l, b * DEG_PER_RAD)
}

/// Ecliptic coordinates of an equatorial position.
///
/// Returns `(epoch_year, longitude_deg, latitude_deg)`; the epoch is the
/// Julian year of the supplied date.
pub fn ecliptic_coordinates(ra_hours: f64, dec_deg: f64, jd: f64) -> (f64, f64, f64) {
    let t = (jd - JD_J2000) / 36_525.0;
    let eps = (23.439_291 - 0.013_004_2 * t) / DEG_PER_RAD;

    let ra = ra_hours / HOURS_PER_RAD;
    let dec = dec_deg / DEG_PER_RAD;

    let sin_lon = ra.sin() * eps.cos() + dec.tan() * eps.sin();
    let lon_rad = sin_lon.atan2(ra.cos());
    let lat_rad = (dec.sin() * eps.cos() - dec.cos() * eps.sin() * ra.sin()).asin();

    let mut lon = lon_rad * DEG_PER_RAD;
    while lon < 0.0 {
        lon += 360.0;
    }
    while lon >= 360.0 {
        lon -= 360.0;
    }

    let epoch = 2000.0 + (jd - JD_J2000) / 365.25;
    (epoch, lon, lat_rad * DEG_PER_RAD)
}

/// RA normalized into [0, 24) hours.
pub fn normalize_ra(ra_hours: f64) -> f64 {
    normalize_hours(ra_hours)
}
