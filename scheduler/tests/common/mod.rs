//! Shared helpers for the integration tests: a synthetic night envelope,
//! hand-built fields and a fully simulated loop rig.
#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use tos_rust::astro::{self, ModifiedJulianDate, MoonEphemeris};
use tos_rust::config::SchedulerConfig;
use tos_rust::core::{Field, NightTimes, ShutterCode, SiteParams, SurveyCode};
use tos_rust::hardware::sim::{SimCamera, SimFocusSolver, SimOffsetSolver, SimTelescope};
use tos_rust::hardware::{FocusSolver, OffsetSolver};
use tos_rust::run::{RunContext, SimClock};
use tos_rust::services::{LoopDeps, ObservationLoop};

pub fn la_silla() -> SiteParams {
    SiteParams {
        name: "La Silla".to_string(),
        longitude_deg: -70.73,
        latitude_deg: -29.25,
        elevation_m: 2400.0,
        utc_offset_hours: -4.0,
    }
}

/// Test configuration: fast camera, one-minute poll interval, outputs under
/// a temp directory, weather checks live (not simulated) so the sim
/// telescope's dome flag is honored.
pub fn test_config(dir: &TempDir) -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.simulate = false;
    config.observing.loop_wait_secs = 60;
    config.camera.readout_secs = 1.0;
    config.camera.transfer_secs = 0.5;
    config.camera.clear_secs = 0.1;
    config.paths.record_file = dir.path().join("scheduler.rec");
    config.paths.history_file = dir.path().join("survey.hist");
    config.paths.obs_log_file = dir.path().join("log.obs");
    config.paths.completed_file = dir.path().join("fields.completed");
    config
}

/// The MJD near `base` at which the local sidereal time equals
/// `target_lst`.
pub fn mjd_at_lst(base: f64, lon_hours_west: f64, target_lst: f64) -> ModifiedJulianDate {
    let current = astro::lst(ModifiedJulianDate::new(base).to_jd(), lon_hours_west);
    let dt_sidereal = astro::clock_difference(current, target_lst);
    ModifiedJulianDate::new(base).add_hours(dt_sidereal * 365.25 / 366.25)
}

/// A synthetic but self-consistent night envelope around a chosen window.
pub fn synthetic_night(site: &SiteParams, window_start: ModifiedJulianDate, dark_hours: f64) -> NightTimes {
    let window_end = window_start.add_hours(dark_hours);
    let lon_w = site.longitude_hours_west();
    NightTimes {
        sunset: window_start.add_hours(-1.0),
        sunrise: window_end.add_hours(1.0),
        civil_dusk: window_start.add_hours(-0.6),
        civil_dawn: window_end.add_hours(0.6),
        nautical_dusk: window_start,
        nautical_dawn: window_end,
        astronomical_dusk: window_start.add_hours(0.4),
        astronomical_dawn: window_end.add_hours(-0.4),
        window_start,
        window_end,
        ut_start: window_start.ut_hours(),
        ut_end: window_end.ut_hours(),
        lst_start: astro::lst(window_start.to_jd(), lon_w),
        lst_end: astro::lst(window_end.to_jd(), lon_w),
        moon: MoonEphemeris {
            ra_hours: 0.0,
            dec_deg: 0.0,
            illuminated_fraction: 0.0,
        },
    }
}

/// A sky field with default survey parameters.
pub fn sky_field(index: usize, ra_hours: f64, dec_deg: f64, n_required: u32) -> Field {
    Field::new(
        index,
        index + 1,
        format!("{ra_hours} {dec_deg} Y 60.0 1800.0 {n_required} 1"),
        ra_hours,
        dec_deg,
        ShutterCode::Sky,
        60.0 / 3600.0,
        0.5,
        n_required,
        SurveyCode::Tno,
        None,
    )
}

/// A field with a hand-built observability window, bypassing the catalog.
pub fn windowed_field(
    index: usize,
    shutter: ShutterCode,
    survey: SurveyCode,
    rise: ModifiedJulianDate,
    set: ModifiedJulianDate,
    interval_hours: f64,
    n_required: u32,
) -> Field {
    let mut f = Field::new(
        index,
        index + 1,
        format!("{index}.0 -20.0 {} 60.0 {} {n_required} 1", shutter.letter(), interval_hours * 3600.0),
        index as f64,
        -20.0,
        shutter,
        60.0 / 3600.0,
        interval_hours,
        n_required,
        survey,
        None,
    );
    f.doable = true;
    f.rise = Some(rise);
    f.set = Some(set);
    f.next_due = Some(rise);
    f
}

/// A fully simulated loop plus handles onto its collaborators.
pub struct Rig {
    pub dir: TempDir,
    pub clock: Arc<SimClock>,
    pub ctx: Arc<RunContext>,
    pub camera: Arc<SimCamera>,
    pub telescope: Arc<SimTelescope>,
    pub night: NightTimes,
}

impl Rig {
    pub fn now(&self) -> ModifiedJulianDate {
        use tos_rust::run::Clock;
        self.clock.now()
    }
}

pub fn build_rig(
    config: SchedulerConfig,
    night: NightTimes,
    fields: Vec<Field>,
    start: ModifiedJulianDate,
    dir: TempDir,
    focus_solver: Arc<dyn FocusSolver>,
    offset_solver: Arc<dyn OffsetSolver>,
) -> (Rig, ObservationLoop) {
    let clock = SimClock::new(start);
    let ctx = RunContext::new();
    let camera = SimCamera::new(clock.clone(), config.camera.readout_secs);
    let telescope = SimTelescope::new(config.site_params(), clock.clone(), config.telescope.default_focus_mm);

    let observation_loop = ObservationLoop::new(
        config,
        night.clone(),
        fields,
        Some("rgzz".to_string()),
        LoopDeps {
            clock: clock.clone(),
            ctx: ctx.clone(),
            telescope: telescope.clone(),
            camera: camera.clone(),
            focus_solver,
            offset_solver,
        },
    );

    (
        Rig {
            dir,
            clock,
            ctx,
            camera,
            telescope,
            night,
        },
        observation_loop,
    )
}

/// Rig with benign solvers.
pub fn default_rig(fields: Vec<Field>, night_start_lst: f64) -> (Rig, ObservationLoop) {
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    let site = la_silla();
    let window_start = mjd_at_lst(60_660.0, site.longitude_hours_west(), night_start_lst);
    let night = synthetic_night(&site, window_start, 9.0);
    let start = night.window_start;
    build_rig(
        config,
        night,
        fields,
        start,
        dir,
        SimFocusSolver::measuring(25.30),
        SimOffsetSolver::unusable(),
    )
}
