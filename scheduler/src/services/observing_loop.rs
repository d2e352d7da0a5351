//! The top-level observation loop.
//!
//! One tick: observe pause/terminate requests, refresh telescope and
//! weather, hand completed focus/offset sequences to their analysis
//! solvers, select the next field and execute it, checkpoint progress.
//! Recovery decisions for hardware failures live here; nothing below the
//! loop retries on its own.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::core::{Field, NightTimes, ShutterCode, SiteParams};
use crate::errors::SchedulerError;
use crate::hardware::camera::CameraClient;
use crate::hardware::{
    CameraLink, ExposureMode, FocusSolver, HardwareError, HardwareResult, OffsetSolver,
    PointingOffsets, TelescopeClient, TelescopeStatus,
};
use crate::io::history::{write_completed, HistoryLog, ObsLog};
use crate::io::record::{ObservationRecord, RecordStore};
use crate::run::{Clock, LoopState, RunContext};
use crate::services::catalog::initialize_fields;
use crate::services::executor::ObservationExecutor;
use crate::services::selector::select_next_field;

/// Final statistics of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub loaded: usize,
    pub observable: usize,
    pub completed: usize,
}

/// Collaborators handed to the loop at construction.
pub struct LoopDeps {
    pub clock: Arc<dyn Clock>,
    pub ctx: Arc<RunContext>,
    pub telescope: Arc<dyn TelescopeClient>,
    pub camera: Arc<dyn CameraClient>,
    pub focus_solver: Arc<dyn FocusSolver>,
    pub offset_solver: Arc<dyn OffsetSolver>,
}

/// The control state machine driving one night.
pub struct ObservationLoop {
    config: SchedulerConfig,
    site: SiteParams,
    night: NightTimes,
    fields: Vec<Field>,
    filter: Option<String>,

    clock: Arc<dyn Clock>,
    ctx: Arc<RunContext>,
    telescope: Arc<dyn TelescopeClient>,
    camera: CameraLink,
    focus_solver: Arc<dyn FocusSolver>,
    offset_solver: Arc<dyn OffsetSolver>,
    executor: ObservationExecutor,

    record_store: RecordStore,
    history_log: HistoryLog,
    obs_log: ObsLog,

    state: LoopState,
    prev_index: Option<usize>,
    focus_done: bool,
    offset_done: bool,
    first_exposure: bool,
    stop_flag: bool,
    stow_flag: bool,
    telescope_ready: bool,
    /// Last-known-good telescope snapshot; stale until the next refresh.
    telescope_status: TelescopeStatus,
    offsets: PointingOffsets,
    last_exposure_ut: Option<f64>,
    observable: usize,
}

impl ObservationLoop {
    pub fn new(
        config: SchedulerConfig,
        night: NightTimes,
        fields: Vec<Field>,
        filter: Option<String>,
        deps: LoopDeps,
    ) -> Self {
        let site = config.site_params();
        let camera = CameraLink::new(deps.camera, deps.clock.clone(), &config.camera);
        let executor = ObservationExecutor::new(&config, deps.clock.clone(), deps.telescope.clone());
        let record_store = RecordStore::new(config.paths.record_file.clone());
        let history_log = HistoryLog::new(config.paths.history_file.clone());
        let obs_log = ObsLog::new(config.paths.obs_log_file.clone());

        Self {
            site,
            night,
            fields,
            filter,
            clock: deps.clock,
            ctx: deps.ctx,
            telescope: deps.telescope,
            camera,
            focus_solver: deps.focus_solver,
            offset_solver: deps.offset_solver,
            executor,
            record_store,
            history_log,
            obs_log,
            state: LoopState::Running,
            prev_index: None,
            focus_done: false,
            offset_done: false,
            first_exposure: true,
            stop_flag: false,
            stow_flag: false,
            telescope_ready: false,
            telescope_status: TelescopeStatus::default(),
            offsets: PointingOffsets::default(),
            last_exposure_ut: None,
            observable: 0,
            config,
        }
    }

    /// The run's lifecycle flags, for wiring external pause/terminate
    /// control.
    pub fn context(&self) -> Arc<RunContext> {
        Arc::clone(&self.ctx)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Current pointing offsets in effect.
    pub fn offsets(&self) -> PointingOffsets {
        self.offsets
    }

    /// Last telescope snapshot, however stale.
    pub fn telescope_status(&self) -> &TelescopeStatus {
        &self.telescope_status
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            loaded: self.fields.len(),
            observable: self.observable,
            completed: self.fields.iter().filter(|f| f.is_complete()).count(),
        }
    }

    /// Drive the whole night: wait for sunset, initialize the catalog, tick
    /// until sunrise or termination, then clean up.
    pub async fn run(&mut self) -> Result<RunStats, SchedulerError> {
        // Wait out the daylight.
        loop {
            let now = self.clock.now();
            if now >= self.night.sunset {
                break;
            }
            if self.ctx.terminating() {
                self.state = LoopState::Done;
                return Ok(self.stats());
            }
            log::info!(
                "waiting for sunset, {:.2} h to go",
                self.night.sunset.hours_since(now)
            );
            self.clock.sleep_secs(60.0).await;
        }

        let now = self.clock.now();
        if now > self.night.sunrise {
            log::warn!("sun is already up, nothing to do");
            self.state = LoopState::Done;
            return Ok(self.stats());
        }

        // The camera must respond before anything else happens.
        let camera_status = self.camera.refresh_status().await?;
        log::info!(
            "camera responding: ready={} state={}",
            camera_status.ready,
            camera_status.state
        );

        if !self.config.simulate {
            self.refresh_telescope().await;
        } else {
            self.telescope_ready = true;
        }

        let summary = initialize_fields(&mut self.fields, &self.night, &self.site, &self.config, now);
        self.observable = summary.observable;
        log::info!("starting observations, {} fields observable", self.observable);

        while self.clock.now() < self.night.sunrise && self.state != LoopState::Done {
            self.tick().await?;
        }

        self.finish().await
    }

    /// One pass of the control loop.
    pub async fn tick(&mut self) -> Result<(), SchedulerError> {
        if self.ctx.terminating() {
            log::info!("termination requested, shutting down");
            self.persist();
            self.state = LoopState::Done;
            return Ok(());
        }

        let now = self.clock.now();
        if now > self.night.sunrise {
            self.state = LoopState::Done;
            return Ok(());
        }

        // Weather check: a telescope that will not answer counts as bad
        // weather until it does. Skipped when paused or simulated.
        let mut bad_weather = false;
        if self.ctx.paused() {
            log::info!("paused, skipping telescope check");
        } else if !self.config.simulate {
            bad_weather = self.refresh_telescope().await;
        } else {
            self.telescope_ready = true;
        }

        if self.telescope_ready && bad_weather && !self.stop_flag {
            log::info!("bad weather, stopping telescope");
            self.do_stop().await;
        }

        if self.ctx.paused() {
            self.state = LoopState::Paused;
            if self.telescope_ready {
                if bad_weather && !self.stow_flag {
                    self.do_stow().await;
                } else if !self.stop_flag {
                    self.do_stop().await;
                }
            }
            self.idle().await;
            return Ok(());
        }
        self.state = LoopState::Running;

        // Completed calibration sequences hand off to their analysis before
        // any new field is selected.
        if let Some(prev) = self.prev_index {
            let f = &self.fields[prev];
            if !self.focus_done && f.shutter == ShutterCode::Focus && f.is_complete() {
                return self.complete_focus_sequence(prev).await;
            }
            if !self.offset_done && f.shutter == ShutterCode::Offset && f.is_complete() {
                return self.complete_offset_sequence(prev).await;
            }
        }

        let selected = select_next_field(&mut self.fields, now, bad_weather, &self.config.observing);

        let Some(index) = selected else {
            log::debug!("no fields ready to observe");
            if self.telescope_ready {
                if bad_weather && !self.stow_flag {
                    self.do_stow().await;
                } else if !self.stop_flag {
                    self.do_stop().await;
                }
            }
            if self.clock.now() > self.night.sunrise {
                log::info!("ending scheduled observations");
                self.state = LoopState::Done;
            } else {
                self.idle().await;
            }
            return Ok(());
        };

        let shutter = self.fields[index].shutter;
        log::info!(
            "selected field {} ({:?})",
            self.fields[index].index,
            self.fields[index].selection
        );

        // Darks and dome flats run regardless of weather; everything else
        // needs a good sky and a responsive telescope.
        let closed_dome_kind = matches!(shutter, ShutterCode::Dark | ShutterCode::DomeFlat);
        if !closed_dome_kind && (bad_weather || !self.telescope_ready) {
            if !self.telescope_ready {
                log::info!("waiting for telescope to come up");
            } else {
                log::info!("waiting for dome to open");
            }
            self.idle().await;
            return Ok(());
        }

        // A new calibration sequence re-arms its completion hand-off.
        if self.focus_done && shutter == ShutterCode::Focus {
            self.focus_done = false;
        } else if self.offset_done && shutter == ShutterCode::Offset {
            self.offset_done = false;
        }

        let mode = if self.first_exposure {
            ExposureMode::First
        } else {
            ExposureMode::Next
        };
        self.first_exposure = false;

        let result = self
            .executor
            .execute(
                &mut self.camera,
                &mut self.fields,
                index,
                self.prev_index,
                self.offsets,
                self.filter.as_deref(),
                mode,
                false,
                &mut self.last_exposure_ut,
            )
            .await;

        match result {
            Ok(_) => {
                self.persist();
                if let Some(record) = self.fields[index].history.last() {
                    if let Err(e) = self.obs_log.append(&self.fields[index], record) {
                        log::warn!("{e}");
                    }
                }
                if let Err(e) = self.history_log.append(self.clock.now(), &self.fields) {
                    log::warn!("{e}");
                }
                self.prev_index = Some(index);
                // The pointing moved the telescope; it is no longer stopped.
                self.stop_flag = false;
                self.stow_flag = false;
            }
            Err(e) => {
                log::error!("error observing field {}: {e}", self.fields[index].index);
                if self.telescope_ready && !self.stop_flag {
                    self.do_stop().await;
                }
            }
        }

        Ok(())
    }

    /// Focus hand-off: runs exactly once per completed focus sequence.
    async fn complete_focus_sequence(&mut self, prev: usize) -> Result<(), SchedulerError> {
        // The last exposure of the sequence may still be reading out.
        if let Err(e) = self.camera.wait_readout().await {
            log::warn!("bad readout of last focus exposure, repeating it: {e}");
            let now = self.clock.now();
            self.fields[prev].roll_back_exposure(now);
            return Ok(());
        }

        log::info!("focus sequence complete, getting best focus");
        let default_mm = self.fields[prev]
            .focus
            .map(|p| p.default_mm)
            .unwrap_or(self.config.telescope.default_focus_mm);

        let chosen = match self.focus_solver.best_focus(&self.fields[prev]).await {
            Err(e) => {
                log::error!("unable to analyze focus sequence: {e}");
                self.persist();
                return Err(SchedulerError::FocusFailure(e.to_string()));
            }
            Ok(Some(mm)) => {
                let tel = &self.config.telescope;
                if mm < tel.min_focus_mm
                    || mm > tel.max_focus_mm
                    || (mm - default_mm).abs() > tel.max_focus_change_mm
                {
                    log::warn!("best focus {mm:.3} mm out of range, default used: {default_mm:.3} mm");
                    default_mm
                } else {
                    mm
                }
            }
            Ok(None) => {
                log::warn!("bad focus sequence, default used: {default_mm:.3} mm");
                default_mm
            }
        };

        let timeout_secs = self.config.telescope.command_timeout_secs;
        if let Err(e) =
            with_timeout("set_focus", timeout_secs, self.telescope.set_focus(chosen)).await
        {
            log::error!("unable to focus telescope: {e}");
            self.persist();
            return Err(SchedulerError::FocusFailure(e.to_string()));
        }

        log::info!("telescope focus set to {chosen:.3} mm");
        self.focus_done = true;
        Ok(())
    }

    /// Offset hand-off: non-fatal, previous offsets survive any failure.
    async fn complete_offset_sequence(&mut self, prev: usize) -> Result<(), SchedulerError> {
        if let Err(e) = self.camera.wait_readout().await {
            log::warn!("bad readout of last offset exposure, repeating it: {e}");
            let now = self.clock.now();
            self.fields[prev].roll_back_exposure(now);
            return Ok(());
        }

        log::info!("offset sequence complete, measuring pointing offsets");
        match self.offset_solver.solve_offsets(&self.fields[prev]).await {
            Ok(Some(offsets)) => {
                log::info!(
                    "telescope offsets set to {:.5} {:.5} deg",
                    offsets.ra_deg,
                    offsets.dec_deg
                );
                self.offsets = offsets;
            }
            Ok(None) => {
                log::warn!("offset measurement unusable, keeping previous values");
            }
            Err(e) => {
                log::warn!("unable to measure offsets, keeping previous values: {e}");
            }
        }

        self.offset_done = true;
        Ok(())
    }

    /// End-of-night cleanup: drain the camera, stow, checkpoint, report.
    async fn finish(&mut self) -> Result<RunStats, SchedulerError> {
        if let Err(e) = self.camera.wait_readout().await {
            log::warn!("lost final readout: {e}");
            if let Some(prev) = self.prev_index {
                let now = self.clock.now();
                self.fields[prev].roll_back_exposure(now);
            }
        }

        log::info!("ending observations");
        if !self.config.simulate {
            self.do_stow().await;
        }
        self.persist();

        match write_completed(&self.config.paths.completed_file, &self.fields) {
            Ok(count) => log::info!("{count} completed field lines written"),
            Err(e) => log::warn!("{e}"),
        }

        let stats = self.stats();
        log::info!(
            "{} fields loaded, {} observable, {} completed",
            stats.loaded,
            stats.observable,
            stats.completed
        );
        self.state = LoopState::Done;
        Ok(stats)
    }

    /// Refresh the telescope snapshot. Returns whether conditions count as
    /// bad weather (closed dome or an unresponsive controller).
    async fn refresh_telescope(&mut self) -> bool {
        let timeout_secs = self.config.telescope.command_timeout_secs;
        match with_timeout("status", timeout_secs, self.telescope.refresh_status()).await {
            Ok(status) => {
                self.telescope_ready = true;
                let bad = !status.dome_open;
                if !bad {
                    // Once the dome is open the telescope cannot be stowed.
                    self.stow_flag = false;
                }
                self.telescope_status = status;
                bad
            }
            Err(e) => {
                log::warn!("cannot update telescope status: {e}");
                self.telescope_ready = false;
                true
            }
        }
    }

    async fn do_stop(&mut self) {
        let timeout_secs = self.config.telescope.command_timeout_secs;
        match with_timeout("stop", timeout_secs, self.telescope.stop()).await {
            Ok(()) => self.stop_flag = true,
            Err(e) => log::error!("error stopping telescope: {e}"),
        }
    }

    async fn do_stow(&mut self) {
        let timeout_secs = self.config.telescope.command_timeout_secs;
        match with_timeout("stow", timeout_secs, self.telescope.stow()).await {
            Ok(()) => {
                self.stow_flag = true;
                self.stop_flag = true;
            }
            Err(e) => log::error!("error stowing telescope: {e}"),
        }
    }

    /// Checkpoint the run. Persistence failures are logged, never fatal.
    fn persist(&self) {
        let record = ObservationRecord::new(
            self.site.name.clone(),
            self.filter.clone(),
            self.fields.clone(),
        );
        if let Err(e) = self.record_store.save(&record) {
            log::warn!("{e}");
        }
    }

    async fn idle(&self) {
        self.clock
            .sleep_secs(self.config.observing.loop_wait_secs as f64)
            .await;
    }
}

/// Run one hardware command under an explicit timeout.
async fn with_timeout<T>(
    name: &str,
    timeout_secs: f64,
    command: impl Future<Output = HardwareResult<T>>,
) -> HardwareResult<T> {
    match tokio::time::timeout(Duration::from_secs_f64(timeout_secs), command).await {
        Ok(result) => result,
        Err(_) => Err(HardwareError::Timeout {
            command: name.to_string(),
            timeout_secs,
        }),
    }
}
