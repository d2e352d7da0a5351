//! Altitude-threshold rise and set times.

use super::{time, DEG_PER_RAD, HOURS_PER_RAD};

/// Ratio converting a sidereal-time difference to a solar-time difference.
const SOLAR_PER_SIDEREAL: f64 = 365.25 / 366.25;

/// Hour angle (hours, positive) at which a position crosses the given
/// altitude, or `None` if it never reaches that altitude from the site.
pub fn hour_angle_from_altitude(altitude_deg: f64, dec_deg: f64, lat_deg: f64) -> Option<f64> {
    let alt = altitude_deg / DEG_PER_RAD;
    let dec = dec_deg / DEG_PER_RAD;
    let lat = lat_deg / DEG_PER_RAD;

    let cos_ha = (alt.sin() - dec.sin() * lat.sin()) / (dec.cos() * lat.cos());
    if cos_ha.abs() > 1.0 {
        return None;
    }
    Some(cos_ha.acos() * HOURS_PER_RAD)
}

/// Next rise and set times (as Julian Dates at or after `jd`) of a position
/// crossing the given altitude threshold.
///
/// Circumpolar positions (always above the threshold) are reported as
/// `(Some(jd), Some(jd + 1.0))`; positions that never reach the threshold as
/// `(None, None)`.
///
/// # Arguments
/// * `ra_hours`, `dec_deg` - equatorial position
/// * `jd` - Julian Date the search starts from
/// * `longitude_hours_west` - site longitude in hours, west positive
/// * `lat_deg` - site latitude in degrees
/// * `altitude_deg` - altitude threshold in degrees
pub fn rise_set_times(
    ra_hours: f64,
    dec_deg: f64,
    jd: f64,
    longitude_hours_west: f64,
    lat_deg: f64,
    altitude_deg: f64,
) -> (Option<f64>, Option<f64>) {
    let Some(ha) = hour_angle_from_altitude(altitude_deg, dec_deg, lat_deg) else {
        // No crossing: either circumpolar above the threshold or never up.
        let transit_alt = 90.0 - (lat_deg - dec_deg).abs();
        if transit_alt > altitude_deg {
            return (Some(jd), Some(jd + 1.0));
        }
        return (None, None);
    };

    let lst_rise = time::normalize_hours(ra_hours - ha);
    let lst_set = time::normalize_hours(ra_hours + ha);

    let current_lst = time::lst(jd, longitude_hours_west);

    let mut dt_rise = lst_rise - current_lst;
    let mut dt_set = lst_set - current_lst;
    if dt_rise < 0.0 {
        dt_rise += 24.0;
    }
    if dt_set < 0.0 {
        dt_set += 24.0;
    }

    let jd_rise = jd + (dt_rise * SOLAR_PER_SIDEREAL) / 24.0;
    let jd_set = jd + (dt_set * SOLAR_PER_SIDEREAL) / 24.0;

    (Some(jd_rise), Some(jd_set))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::{altitude_azimuth, lst};

    const LA_SILLA_LAT: f64 = -29.25;
    const LA_SILLA_LON_W: f64 = 70.73 / 15.0;

    #[test]
    fn hour_angle_symmetric_cases() {
        // An equatorial field seen from the equator spends 6 hours on each
        // side of the meridian above the horizon.
        let ha = hour_angle_from_altitude(0.0, 0.0, 0.0).unwrap();
        assert!((ha - 6.0).abs() < 1e-6, "ha = {ha}");

        // Far northern field never reaches 30 deg from a southern site.
        assert!(hour_angle_from_altitude(30.0, 80.0, LA_SILLA_LAT).is_none());
    }

    #[test]
    fn circumpolar_field_is_always_up() {
        let (rise, set) = rise_set_times(0.0, -88.0, 60_000.0, LA_SILLA_LON_W, LA_SILLA_LAT, 10.0);
        assert_eq!(rise, Some(60_000.0));
        assert_eq!(set, Some(60_001.0));
    }

    #[test]
    fn never_rising_field_has_no_times() {
        let (rise, set) = rise_set_times(0.0, 85.0, 60_000.0, LA_SILLA_LON_W, LA_SILLA_LAT, 30.0);
        assert!(rise.is_none());
        assert!(set.is_none());
    }

    #[test]
    fn altitude_at_computed_rise_matches_threshold() {
        let jd = 2_460_000.5;
        let (ra, dec, min_alt) = (5.5, 23.5, 30.0);
        let (rise, set) = rise_set_times(ra, dec, jd, LA_SILLA_LON_W, LA_SILLA_LAT, min_alt);
        let (rise, set) = (rise.unwrap(), set.unwrap());

        assert!(rise >= jd && set >= jd);
        for crossing in [rise, set] {
            let lst_h = lst(crossing, LA_SILLA_LON_W);
            let (alt, _) = altitude_azimuth(ra, dec, lst_h, LA_SILLA_LAT);
            assert!((alt - min_alt).abs() < 0.25, "alt at crossing = {alt}");
        }
    }
}
