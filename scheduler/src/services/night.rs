//! Night planning: the timing envelope for one night of observing.

use chrono::{Datelike, NaiveDate};

use crate::astro::{self, ModifiedJulianDate};
use crate::config::ObservingSettings;
use crate::core::{NightTimes, SiteParams};
use crate::errors::SchedulerError;

/// Compute the night's timing envelope for a civil date.
///
/// The observing window opens at the configured twilight (12° nautical or
/// 18° astronomical) plus the startup delay, and closes at the matching
/// morning twilight minus the minimum-execution margin. Pure computation,
/// no side effects; a missing twilight solution (polar day, bad site) is a
/// fatal configuration error.
pub fn plan_night(
    date: NaiveDate,
    site: &SiteParams,
    observing: &ObservingSettings,
) -> Result<NightTimes, SchedulerError> {
    let lon_w = site.longitude_hours_west();
    let jd_noon = astro::time::julian_date(date.year(), date.month(), date.day(), 12.0 + lon_w);

    let twilights = astro::twilight_times(jd_noon, lon_w, site.latitude_deg)
        .ok_or_else(|| SchedulerError::NightPlanning("sun never sets at this site/date".to_string()))?;

    let nautical = twilights.nautical.ok_or_else(|| {
        SchedulerError::NightPlanning("no 12-degree twilight at this site/date".to_string())
    })?;
    let astronomical = twilights.astronomical.ok_or_else(|| {
        SchedulerError::NightPlanning("no 18-degree twilight at this site/date".to_string())
    })?;
    let civil = twilights.civil.ok_or_else(|| {
        SchedulerError::NightPlanning("no civil twilight at this site/date".to_string())
    })?;

    let chosen = if observing.use_nautical_start {
        nautical
    } else {
        astronomical
    };

    let window_start =
        ModifiedJulianDate::from_jd(chosen.evening_jd).add_hours(observing.startup_delay_hours);
    let window_end =
        ModifiedJulianDate::from_jd(chosen.morning_jd).add_hours(-observing.min_execution_hours);

    let night = NightTimes {
        sunset: ModifiedJulianDate::from_jd(twilights.sunset_jd),
        sunrise: ModifiedJulianDate::from_jd(twilights.sunrise_jd),
        civil_dusk: ModifiedJulianDate::from_jd(civil.evening_jd),
        civil_dawn: ModifiedJulianDate::from_jd(civil.morning_jd),
        nautical_dusk: ModifiedJulianDate::from_jd(nautical.evening_jd),
        nautical_dawn: ModifiedJulianDate::from_jd(nautical.morning_jd),
        astronomical_dusk: ModifiedJulianDate::from_jd(astronomical.evening_jd),
        astronomical_dawn: ModifiedJulianDate::from_jd(astronomical.morning_jd),
        window_start,
        window_end,
        ut_start: window_start.ut_hours(),
        ut_end: window_end.ut_hours(),
        lst_start: astro::lst(window_start.to_jd(), lon_w),
        lst_end: astro::lst(window_end.to_jd(), lon_w),
        moon: astro::moon_position(window_start.to_jd()),
    };

    log::info!(
        "night plan: sunset {:.6}, window {:.6} - {:.6} ({:.2} h), sunrise {:.6}, moon {:.0}% up at ra {:.2} h",
        night.sunset.value(),
        night.window_start.value(),
        night.window_end.value(),
        night.dark_hours(),
        night.sunrise.value(),
        night.moon.illuminated_fraction * 100.0,
        night.moon.ra_hours,
    );

    Ok(night)
}
