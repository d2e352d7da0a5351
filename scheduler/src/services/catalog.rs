//! Field-catalog initialization: per-field observability for the night.

use crate::astro::{self, ModifiedJulianDate};
use crate::config::SchedulerConfig;
use crate::core::{Field, NightTimes, ShutterCode, SiteParams, SurveyCode};

/// Accept/reject tallies from one initialization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogSummary {
    pub observable: usize,
    pub never_rise: usize,
    pub up_too_short: usize,
    pub moon_too_close: usize,
    pub excluded: usize,
}

/// Compute each field's observability window and initial scheduling state.
///
/// Runs once at night start (and for any fields added later). Rejection
/// and acceptance state is written onto the fields; progress carried over
/// from a resumed record is left untouched. Returns the tallies, with
/// `observable` counting the accepted fields.
pub fn initialize_fields(
    fields: &mut [Field],
    night: &NightTimes,
    site: &SiteParams,
    config: &SchedulerConfig,
    now: ModifiedJulianDate,
) -> CatalogSummary {
    let mut summary = CatalogSummary::default();

    for field in fields.iter_mut() {
        initialize_field(field, night, site, config, now, &mut summary);

        log::debug!(
            "field {}: doable={} rise={:?} set={:?} next={:?} time_left={:.3}",
            field.index,
            field.doable,
            field.rise.map(|t| t.value()),
            field.set.map(|t| t.value()),
            field.next_due.map(|t| t.value()),
            field.time_left_hours,
        );
    }

    log::info!(
        "field catalog: {} observable, {} never rise, {} up too short, {} moon too close, {} excluded",
        summary.observable,
        summary.never_rise,
        summary.up_too_short,
        summary.moon_too_close,
        summary.excluded,
    );

    summary
}

fn initialize_field(
    field: &mut Field,
    night: &NightTimes,
    site: &SiteParams,
    config: &SchedulerConfig,
    now: ModifiedJulianDate,
    summary: &mut CatalogSummary,
) {
    let obs = &config.observing;

    // Derived coordinates, once per night.
    let (gal_lon, gal_lat) = astro::coords::galactic_coordinates(field.ra_hours, field.dec_deg);
    field.gal_lon_deg = gal_lon;
    field.gal_lat_deg = gal_lat;
    let (epoch, ecl_lon, ecl_lat) =
        astro::coords::ecliptic_coordinates(field.ra_hours, field.dec_deg, night.window_start.to_jd());
    field.epoch = epoch;
    field.ecl_lon_deg = ecl_lon;
    field.ecl_lat_deg = ecl_lat;

    field.doable = false;
    field.rise = None;
    field.set = None;
    field.next_due = None;

    // Calibrations whose exposure does not depend on a sky position are
    // observable for the whole window.
    if field.shutter.is_window_wide() {
        accept(field, night.window_start, night.window_end, now);
        summary.observable += 1;
        return;
    }

    // Twilight flats live in the gaps between sunset/sunrise and the window.
    if field.shutter == ShutterCode::EveningFlat {
        if now < night.window_start {
            let rise = night.sunset.add_hours(obs.flat_wait_hours);
            accept(field, rise, night.window_start, now);
            summary.observable += 1;
        } else {
            log::info!("field {}: evening twilight has ended", field.index);
            summary.excluded += 1;
        }
        return;
    }
    if field.shutter == ShutterCode::MorningFlat {
        let set = night.sunrise.add_hours(-obs.flat_wait_hours);
        if now < set {
            accept(field, night.window_end, set, now);
            summary.observable += 1;
        } else {
            log::info!("field {}: morning twilight has ended", field.index);
            summary.excluded += 1;
        }
        return;
    }

    // Ordinary sky field: window from the airmass threshold.
    let min_alt = config.min_altitude_deg();
    let (rise, set) = astro::rise_set_times(
        field.ra_hours,
        field.dec_deg,
        night.window_start.to_jd(),
        site.longitude_hours_west(),
        site.latitude_deg,
        min_alt,
    );

    let (Some(rise_jd), Some(set_jd)) = (rise, set) else {
        log::info!("field {}: never rises above airmass threshold", field.index);
        summary.never_rise += 1;
        return;
    };

    let mut rise = ModifiedJulianDate::from_jd(rise_jd);
    let mut set = ModifiedJulianDate::from_jd(set_jd);

    // A field already up at window start sets before its next rise.
    if set < rise {
        rise = night.window_start;
    }
    // Clip to the observing window.
    if rise < night.window_start {
        rise = night.window_start;
    }
    if set > night.window_end {
        set = night.window_end;
    }

    if rise >= set {
        log::info!("field {}: not up during the observing window", field.index);
        summary.never_rise += 1;
        return;
    }

    if night.moon.illuminated_fraction > obs.moon_bright_fraction {
        let separation = astro::separation_deg(
            field.ra_hours,
            field.dec_deg,
            night.moon.ra_hours,
            night.moon.dec_deg,
        );
        if separation < obs.min_moon_separation_deg {
            log::info!(
                "field {}: moon too close ({separation:.1} deg)",
                field.index
            );
            summary.moon_too_close += 1;
            return;
        }
    }

    if field.dec_deg > obs.max_dec_deg || field.dec_deg < obs.min_dec_deg {
        log::info!("field {}: declination {:.2} out of range", field.index, field.dec_deg);
        summary.excluded += 1;
        return;
    }

    // Time budget: can the remaining repeats fit while the field is up?
    field.time_up_hours = set.hours_since(rise);
    field.time_required_hours = (field.n_required.saturating_sub(1)) as f64 * field.interval_hours;
    field.time_left_hours = field.time_up_hours - field.time_required_hours;

    if field.time_left_hours < 0.0 && field.survey != SurveyCode::MustDo {
        log::info!(
            "field {}: up {:.2} h, needs {:.2} h",
            field.index,
            field.time_up_hours,
            field.time_required_hours
        );
        summary.up_too_short += 1;
        return;
    }

    if field.survey == SurveyCode::Sne && field.gal_lat_deg.abs() < obs.sne_min_galactic_latitude_deg {
        log::info!(
            "field {}: galactic latitude {:.1} too low for supernova search",
            field.index,
            field.gal_lat_deg
        );
        summary.excluded += 1;
        return;
    }

    accept(field, rise, set, now);
    summary.observable += 1;
}

fn accept(field: &mut Field, rise: ModifiedJulianDate, set: ModifiedJulianDate, now: ModifiedJulianDate) {
    field.doable = true;
    field.rise = Some(rise);
    field.set = Some(set);
    let due = if now > rise { now } else { rise };
    field.next_due = Some(due);
    field.time_up_hours = set.hours_since(if now > rise { now } else { rise });
    field.time_required_hours = (field.n_required.saturating_sub(1)) as f64 * field.interval_hours;
    field.time_left_hours = field.time_up_hours - field.time_required_hours;
}
