//! End-to-end observation-loop tests against fully simulated hardware and
//! a virtual clock.

mod common;

use common::*;

use tempfile::TempDir;
use tos_rust::core::{FieldStatus, ShutterCode, SurveyCode};
use tos_rust::errors::SchedulerError;
use tos_rust::hardware::sim::{SimFocusSolver, SimOffsetSolver};
use tos_rust::hardware::{PointingOffsets, TelescopeClient};
use tos_rust::io::RecordStore;
use tos_rust::run::LoopState;

/// Scenario A: a three-repeat sky field, up at window start with margin to
/// spare, ends the night permanently done with exactly three history
/// entries.
#[tokio::test]
async fn sky_field_completes_three_repeats() {
    // Window start chosen so the field at ra 5.5 h sits an hour east of the
    // meridian, already above the airmass threshold.
    let fields = vec![sky_field(0, 5.5, 23.5, 3)];
    let (rig, mut observation_loop) = default_rig(fields, 4.5);

    let stats = observation_loop.run().await.unwrap();

    assert_eq!(stats.loaded, 1);
    assert_eq!(stats.observable, 1);
    assert_eq!(stats.completed, 1);

    let field = &observation_loop.fields()[0];
    assert_eq!(field.n_done, 3);
    assert_eq!(field.history.len(), 3);
    assert_eq!(field.status, FieldStatus::NotDoable);
    assert!(!field.doable);

    // Repeats honored the half-hour cadence (fields come due up to the
    // minimum-execution margin early).
    let t0 = field.history[0].mjd;
    let t1 = field.history[1].mjd;
    let t2 = field.history[2].mjd;
    assert!(t1.hours_since(t0) >= 0.45);
    assert!(t2.hours_since(t1) >= 0.45);

    assert_eq!(rig.camera.exposures_taken(), 3);
    // The record survives the run and reproduces the progress.
    let store = RecordStore::new(rig.dir.path().join("scheduler.rec"));
    let record = store.load().unwrap().expect("record written");
    assert_eq!(record.fields[0].n_done, 3);
    assert_eq!(record.fields[0].status, FieldStatus::NotDoable);
    // End of night stowed the telescope.
    assert!(rig.telescope.is_stowed());
}

/// Scenario D: a lost overlapped readout un-counts the affected exposure
/// and makes the field due again at the tick that discovered the loss.
#[tokio::test]
async fn lost_readout_rolls_back_and_reschedules() {
    let site = la_silla();
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let window_start = mjd_at_lst(60_660.0, site.longitude_hours_west(), 4.5);
    let night = synthetic_night(&site, window_start, 9.0);

    // Field 0 is the more urgent (earlier set); field 1 backs it up.
    let fields = vec![
        windowed_field(0, ShutterCode::Sky, SurveyCode::Tno, night.window_start, night.window_start.add_hours(4.0), 0.5, 3),
        windowed_field(1, ShutterCode::Sky, SurveyCode::Tno, night.window_start, night.window_start.add_hours(8.0), 0.5, 3),
    ];

    let (rig, mut observation_loop) = build_rig(
        config,
        night,
        fields,
        window_start,
        dir,
        SimFocusSolver::measuring(25.30),
        SimOffsetSolver::unusable(),
    );

    // First tick exposes field 0 overlapped; its readout will fail.
    rig.camera.fail_next_readouts(1);
    observation_loop.tick().await.unwrap();
    assert_eq!(observation_loop.fields()[0].n_done, 1);

    // Second tick picks field 1, discovers the loss, rolls field 0 back.
    observation_loop.tick().await.unwrap();
    let fields = observation_loop.fields();
    assert_eq!(fields[0].n_done, 0, "lost exposure un-counted");
    assert!(fields[0].history.is_empty());
    let due = fields[0].next_due.unwrap();
    assert!(due <= rig.now());
    assert_eq!(fields[1].n_done, 1, "the discovering field still exposed");

    // Field 0 is immediately eligible again and wins on urgency.
    observation_loop.tick().await.unwrap();
    assert_eq!(observation_loop.fields()[0].n_done, 1);
}

#[tokio::test]
async fn pause_idles_and_stops_the_telescope() {
    let site = la_silla();
    let window_start = mjd_at_lst(60_660.0, site.longitude_hours_west(), 4.5);
    let night = synthetic_night(&site, window_start, 9.0);
    let fields = vec![windowed_field(
        0,
        ShutterCode::Sky,
        SurveyCode::Tno,
        night.window_start,
        night.window_end,
        0.5,
        3,
    )];
    let (rig, mut observation_loop) = default_rig(fields, 4.5);

    rig.ctx.request_pause();
    observation_loop.tick().await.unwrap();
    observation_loop.tick().await.unwrap();

    assert_eq!(observation_loop.state(), LoopState::Paused);
    assert_eq!(rig.camera.exposures_taken(), 0, "no exposures while paused");
    assert!(rig.telescope.is_stopped());

    // Resume: the field is picked up on the next tick.
    rig.ctx.request_resume();
    observation_loop.tick().await.unwrap();
    assert_eq!(observation_loop.state(), LoopState::Running);
    assert_eq!(observation_loop.fields()[0].n_done, 1);
}

#[tokio::test]
async fn terminate_checkpoints_and_finishes() {
    let fields = vec![sky_field(0, 5.5, 23.5, 3)];
    let (rig, mut observation_loop) = default_rig(fields, 4.5);

    rig.ctx.request_terminate();
    let stats = observation_loop.run().await.unwrap();

    assert_eq!(observation_loop.state(), LoopState::Done);
    assert_eq!(stats.completed, 0);
}

#[tokio::test]
async fn focus_sequence_hands_off_to_the_solver() {
    let site = la_silla();
    let window_start = mjd_at_lst(60_660.0, site.longitude_hours_west(), 4.5);
    let night = synthetic_night(&site, window_start, 9.0);

    let mut focus = windowed_field(
        0,
        ShutterCode::Focus,
        SurveyCode::None,
        night.window_start,
        night.window_end,
        60.0 / 3600.0,
        3,
    );
    focus.focus = Some(tos_rust::core::FocusParams::new(0.05, 25.30, 3));

    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let (rig, mut observation_loop) = build_rig(
        config,
        night,
        vec![focus],
        window_start,
        dir,
        SimFocusSolver::measuring(25.38),
        SimOffsetSolver::unusable(),
    );

    // Run the sequence to completion plus the hand-off tick.
    for _ in 0..40 {
        observation_loop.tick().await.unwrap();
        if observation_loop.fields()[0].is_complete()
            && (rig.telescope.get_focus().await.unwrap() - 25.38).abs() < 1e-9
        {
            break;
        }
    }

    assert_eq!(observation_loop.fields()[0].n_done, 3);
    let focus_now = rig.telescope.get_focus().await.unwrap();
    assert!((focus_now - 25.38).abs() < 1e-9, "measured focus applied");
}

#[tokio::test]
async fn unusable_focus_sequence_falls_back_to_default() {
    let site = la_silla();
    let window_start = mjd_at_lst(60_660.0, site.longitude_hours_west(), 4.5);
    let night = synthetic_night(&site, window_start, 9.0);

    let mut focus = windowed_field(
        0,
        ShutterCode::Focus,
        SurveyCode::None,
        night.window_start,
        night.window_end,
        60.0 / 3600.0,
        3,
    );
    focus.focus = Some(tos_rust::core::FocusParams::new(0.05, 25.30, 3));

    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let (rig, mut observation_loop) = build_rig(
        config,
        night,
        vec![focus],
        window_start,
        dir,
        SimFocusSolver::unusable(),
        SimOffsetSolver::unusable(),
    );

    for _ in 0..40 {
        observation_loop.tick().await.unwrap();
        if observation_loop.fields()[0].is_complete() {
            // One extra tick for the hand-off.
            observation_loop.tick().await.unwrap();
            break;
        }
    }

    let focus_now = rig.telescope.get_focus().await.unwrap();
    assert!((focus_now - 25.30).abs() < 1e-9, "default focus restored");
}

#[tokio::test]
async fn broken_focus_analysis_is_fatal_but_checkpointed() {
    let site = la_silla();
    let window_start = mjd_at_lst(60_660.0, site.longitude_hours_west(), 4.5);
    let night = synthetic_night(&site, window_start, 9.0);

    let mut focus = windowed_field(
        0,
        ShutterCode::Focus,
        SurveyCode::None,
        night.window_start,
        night.window_end,
        60.0 / 3600.0,
        2,
    );
    focus.focus = Some(tos_rust::core::FocusParams::new(0.05, 25.30, 2));

    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let record_path = config.paths.record_file.clone();
    let (_rig, mut observation_loop) = build_rig(
        config,
        night,
        vec![focus],
        window_start,
        dir,
        SimFocusSolver::broken(),
        SimOffsetSolver::unusable(),
    );

    let mut fatal = None;
    for _ in 0..40 {
        match observation_loop.tick().await {
            Ok(()) => {}
            Err(e) => {
                fatal = Some(e);
                break;
            }
        }
    }

    assert!(matches!(fatal, Some(SchedulerError::FocusFailure(_))));
    // The state was saved before terminating.
    let record = RecordStore::new(record_path).load().unwrap();
    assert!(record.is_some());
}

#[tokio::test]
async fn offset_sequence_updates_sky_pointing() {
    let site = la_silla();
    let window_start = mjd_at_lst(60_660.0, site.longitude_hours_west(), 4.5);
    let night = synthetic_night(&site, window_start, 9.0);

    // An offset calibration first, then an ordinary sky field.
    let offset_field = windowed_field(
        0,
        ShutterCode::Offset,
        SurveyCode::None,
        night.window_start,
        night.window_end,
        60.0 / 3600.0,
        2,
    );
    let sky = windowed_field(
        1,
        ShutterCode::Sky,
        SurveyCode::Tno,
        night.window_start,
        night.window_end,
        0.5,
        3,
    );
    let sky_ra = sky.ra_hours;
    let sky_dec = sky.dec_deg;

    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let measured = PointingOffsets {
        ra_deg: 0.15,
        dec_deg: -0.30,
    };
    let (rig, mut observation_loop) = build_rig(
        config,
        night,
        vec![offset_field, sky],
        window_start,
        dir,
        SimFocusSolver::measuring(25.30),
        SimOffsetSolver::measuring(measured),
    );

    for _ in 0..60 {
        observation_loop.tick().await.unwrap();
        if observation_loop.fields()[1].n_done > 0 {
            break;
        }
    }

    assert_eq!(observation_loop.offsets(), measured);
    assert_eq!(observation_loop.fields()[1].n_done, 1);

    // The sky pointing subtracted the measured corrections.
    let (ra, dec) = rig.telescope.pointing();
    assert!((ra - (sky_ra - measured.ra_deg / 15.0)).abs() < 1e-9);
    assert!((dec - (sky_dec - measured.dec_deg)).abs() < 1e-9);
}

#[tokio::test]
async fn bad_weather_allows_darks_but_blocks_sky() {
    let site = la_silla();
    let window_start = mjd_at_lst(60_660.0, site.longitude_hours_west(), 4.5);
    let night = synthetic_night(&site, window_start, 9.0);

    let fields = vec![
        windowed_field(0, ShutterCode::Sky, SurveyCode::Tno, night.window_start, night.window_end, 0.5, 3),
        windowed_field(1, ShutterCode::Dark, SurveyCode::None, night.window_start, night.window_end, 0.01, 1),
    ];

    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let (rig, mut observation_loop) = build_rig(
        config,
        night,
        fields,
        window_start,
        dir,
        SimFocusSolver::measuring(25.30),
        SimOffsetSolver::unusable(),
    );

    rig.telescope.set_dome_open(false);

    // The dark executes despite the closed dome.
    observation_loop.tick().await.unwrap();
    assert_eq!(observation_loop.fields()[1].n_done, 1);
    assert_eq!(rig.telescope.points_commanded(), 0);

    // With only the sky field left, the loop waits for the dome.
    let before = rig.camera.exposures_taken();
    observation_loop.tick().await.unwrap();
    observation_loop.tick().await.unwrap();
    assert_eq!(rig.camera.exposures_taken(), before);
    assert_eq!(observation_loop.fields()[0].n_done, 0);
    assert!(rig.telescope.is_stopped());

    // Dome opens: observing resumes.
    rig.telescope.set_dome_open(true);
    observation_loop.tick().await.unwrap();
    assert_eq!(observation_loop.fields()[0].n_done, 1);
}
