//! Exposure execution: one field, one exposure, end to end.
//!
//! The executor points the telescope (except for darks and dome flats),
//! steps the focus for focus sequences, drains any in-flight readout,
//! clears the camera when it has sat idle, imprints the header and
//! dispatches the exposure. Bookkeeping lands on the field only after the
//! exposure command succeeds; a lost readout rolls the previous field back
//! one exposure instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::astro::{self, ModifiedJulianDate};
use crate::config::{CameraSettings, ObservingSettings, SchedulerConfig, TelescopeSettings};
use crate::core::{ExposureRecord, Field, ShutterCode, SiteParams};
use crate::errors::SchedulerError;
use crate::hardware::{
    CameraLink, ExposureMode, ExposureRequest, HardwareError, HardwareResult, PointingOffsets,
    TelescopeClient,
};
use crate::run::Clock;

/// Carries out single exposures against the hardware collaborators.
pub struct ObservationExecutor {
    site: SiteParams,
    observing: ObservingSettings,
    camera_cfg: CameraSettings,
    telescope_cfg: TelescopeSettings,
    clock: Arc<dyn Clock>,
    telescope: Arc<dyn TelescopeClient>,
}

impl ObservationExecutor {
    pub fn new(
        config: &SchedulerConfig,
        clock: Arc<dyn Clock>,
        telescope: Arc<dyn TelescopeClient>,
    ) -> Self {
        Self {
            site: config.site_params(),
            observing: config.observing.clone(),
            camera_cfg: config.camera.clone(),
            telescope_cfg: config.telescope.clone(),
            clock,
            telescope,
        }
    }

    /// Execute one exposure of `fields[index]`.
    ///
    /// `prev_index` names the field whose overlapped readout may still be in
    /// flight; a lost readout rolls that field back one exposure and makes
    /// it due again immediately. On success the executed field's history,
    /// done count and next-due time are updated and the elapsed time in
    /// hours is returned. On failure the executed field's counters are left
    /// unmodified.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        camera: &mut CameraLink,
        fields: &mut [Field],
        index: usize,
        prev_index: Option<usize>,
        offsets: PointingOffsets,
        filter: Option<&str>,
        mode: ExposureMode,
        wait: bool,
        last_exposure_ut: &mut Option<f64>,
    ) -> Result<f64, SchedulerError> {
        let started = self.clock.now();
        let shutter = fields[index].shutter;

        log::info!(
            "observing {} field {} iteration {}/{}",
            shutter.image_type(),
            fields[index].index,
            fields[index].n_done + 1,
            fields[index].n_required
        );

        // Current sidereal time: from the telescope when it is involved,
        // otherwise computed directly.
        let mut lst = astro::lst(started.to_jd(), self.site.longitude_hours_west());
        let mut telescope_status = None;
        if shutter.requires_pointing() {
            let status = self
                .telescope_command("status", self.telescope.refresh_status())
                .await?;
            lst = status.lst_hours;
            telescope_status = Some(status);
        }

        // Calibration sequences fix their pointing on the first iteration:
        // focus and offsets an hour east of the meridian on the equator,
        // twilight flats toward the dark horizon.
        if fields[index].n_done == 0 {
            let f = &mut fields[index];
            match shutter {
                ShutterCode::Focus | ShutterCode::Offset => {
                    f.ra_hours = astro::coords::normalize_ra(lst + 1.0);
                    f.dec_deg = 0.0;
                }
                ShutterCode::EveningFlat => {
                    f.ra_hours = astro::coords::normalize_ra(lst + 3.0);
                    f.dec_deg = 0.0;
                }
                ShutterCode::MorningFlat => {
                    f.ra_hours = astro::coords::normalize_ra(lst - 4.0);
                    f.dec_deg = 0.0;
                }
                _ => {}
            }
        }

        if shutter.requires_pointing() {
            let (target_ra, target_dec) = self.target_for(&fields[index], offsets);
            log::debug!(
                "pointing telescope to {target_ra:.6} {target_dec:.5} for field {}",
                fields[index].index
            );
            self.telescope_command("point", self.telescope.point(target_ra, target_dec))
                .await?;

            let status = self
                .telescope_command("status", self.telescope.refresh_status())
                .await?;
            lst = status.lst_hours;
            telescope_status = Some(status);
        }

        if shutter == ShutterCode::Focus {
            self.step_focus(&fields[index]).await?;
        }

        // Drain the previous overlapped readout before touching the camera
        // again. A lost readout un-counts the previous field's exposure and
        // makes it due again now; this attempt still proceeds.
        if let Err(e) = camera.wait_readout().await {
            log::warn!("{e}");
            if let Some(prev) = prev_index {
                if fields[prev].n_done > 0 {
                    let now = self.clock.now();
                    fields[prev].roll_back_exposure(now);
                    log::warn!(
                        "field {}: last exposure marked undone, due again immediately",
                        fields[prev].index
                    );
                }
            }
        }

        // Flush accumulated charge if the camera has been idle a while.
        let now_ut = self.clock.now().ut_hours();
        let needs_clear = match *last_exposure_ut {
            None => true,
            Some(prev_ut) => {
                astro::clock_difference(prev_ut, now_ut) > self.camera_cfg.clear_interval_hours
            }
        };
        if needs_clear && self.camera_cfg.num_clears > 0 {
            log::info!("clearing camera {} times", self.camera_cfg.num_clears);
            for _ in 0..self.camera_cfg.num_clears {
                camera.clear(self.camera_cfg.clear_secs).await?;
            }
        }

        let now = self.clock.now();
        let filename = make_filename(now, shutter);
        let entries = self.header_entries(&fields[index], &filename, lst, filter, telescope_status.as_ref());
        camera.imprint_header(&entries).await?;

        let exposure_secs = fields[index].exposure_hours * 3600.0;
        let reply = camera
            .start_exposure(
                ExposureRequest {
                    open_shutter: shutter.opens_shutter(),
                    exposure_secs,
                    filename: filename.clone(),
                },
                mode,
                wait,
            )
            .await?;

        let now = self.clock.now();
        let field = &mut fields[index];
        let hour_angle = astro::hour_angle(field.ra_hours, lst);
        let (altitude, _) =
            astro::altitude_azimuth(field.ra_hours, field.dec_deg, lst, self.site.latitude_deg);
        field.record_exposure(
            ExposureRecord {
                ut_hours: now.ut_hours(),
                mjd: now,
                lst_hours: lst,
                hour_angle_hours: hour_angle,
                airmass: astro::airmass(altitude),
                actual_exposure_secs: reply.actual_exposure_secs,
                filename,
            },
            now,
        );
        *last_exposure_ut = Some(now.ut_hours());

        log::info!(
            "exposed field {}: ra {:.6} dec {:.5} done {}/{} time_left {:.3} h",
            field.index,
            field.ra_hours,
            field.dec_deg,
            field.n_done,
            field.n_required,
            field.time_left_hours
        );

        Ok(self.clock.now().hours_since(started))
    }

    /// Target position for a pointing, kind-specific.
    fn target_for(&self, field: &Field, offsets: PointingOffsets) -> (f64, f64) {
        match field.shutter {
            // Flats dither across a small grid so defects average out.
            ShutterCode::EveningFlat | ShutterCode::MorningFlat => {
                let (dra_deg, ddec_deg) =
                    dither_offsets(field.n_done, self.observing.flat_dither_step_deg);
                (field.ra_hours + dra_deg / 15.0, field.dec_deg + ddec_deg)
            }
            // Sky pointings subtract the live pointing corrections.
            ShutterCode::Sky => (
                field.ra_hours - offsets.ra_deg / 15.0,
                field.dec_deg - offsets.dec_deg,
            ),
            _ => (field.ra_hours, field.dec_deg),
        }
    }

    /// Set the focus for the next step of a focus sequence.
    async fn step_focus(&self, field: &Field) -> Result<(), SchedulerError> {
        let params = field
            .focus
            .ok_or_else(|| SchedulerError::FocusFailure("focus field without focus parameters".to_string()))?;

        let setting = params.setting_for(field.n_done);
        if setting < self.telescope_cfg.min_focus_mm || setting > self.telescope_cfg.max_focus_mm {
            return Err(SchedulerError::FocusFailure(format!(
                "intended focus setting out of range: {setting:.3} mm"
            )));
        }

        log::info!("setting focus to {setting:.3} mm");
        self.telescope_command("set_focus", self.telescope.set_focus(setting))
            .await?;
        Ok(())
    }

    fn header_entries(
        &self,
        field: &Field,
        filename: &str,
        lst: f64,
        filter: Option<&str>,
        telescope_status: Option<&crate::hardware::TelescopeStatus>,
    ) -> Vec<(String, String)> {
        let mut entries = vec![
            ("sequence".to_string(), (field.n_done + 1).to_string()),
            ("imagetyp".to_string(), field.shutter.image_type().to_string()),
            ("fileroot".to_string(), filename.to_string()),
            (
                "comment".to_string(),
                field.comment().unwrap_or("no comment").to_string(),
            ),
            ("fieldid".to_string(), field.index.to_string()),
            ("lst".to_string(), format!("{lst:8.4}")),
            (
                "ha".to_string(),
                format!("{:8.4}", astro::hour_angle(field.ra_hours, lst)),
            ),
        ];
        if let Some(status) = telescope_status {
            entries.push(("tele-ra".to_string(), format!("{:8.4}", status.ra_hours)));
            entries.push(("tele-dec".to_string(), format!("{:8.4}", status.dec_deg)));
            entries.push(("focus".to_string(), format!("{:8.4}", status.focus_mm)));
        }
        if let Some(filter) = filter {
            entries.push(("filterna".to_string(), filter.to_string()));
        }
        entries
    }

    /// Run a telescope command under the configured timeout.
    async fn telescope_command<T>(
        &self,
        name: &str,
        command: impl Future<Output = HardwareResult<T>>,
    ) -> Result<T, SchedulerError> {
        let timeout_secs = self.telescope_cfg.command_timeout_secs;
        match tokio::time::timeout(Duration::from_secs_f64(timeout_secs), command).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(HardwareError::Timeout {
                command: name.to_string(),
                timeout_secs,
            }
            .into()),
        }
    }
}

/// Image filename root: UT timestamp plus the shutter letter.
fn make_filename(now: ModifiedJulianDate, shutter: ShutterCode) -> String {
    format!(
        "{}{}",
        now.to_datetime().format("%Y%m%d%H%M%S"),
        shutter.letter()
    )
}

/// Dither offset in degrees for the given iteration of a flat sequence.
///
/// Iteration 0 sits on the nominal pointing; later iterations walk the
/// perimeters of concentric squares around it, one step per exposure.
fn dither_offsets(iteration: u32, step_deg: f64) -> (f64, f64) {
    if iteration == 0 {
        return (0.0, 0.0);
    }

    let mut n = iteration;
    let mut ring = 1u32;
    while n > 8 * ring {
        n -= 8 * ring;
        ring += 1;
    }

    let side = 2 * ring;
    let pos = n - 1;
    let r = ring as i64;
    let along = (pos % side) as i64;
    let (dx, dy) = match pos / side {
        0 => (-r + along, -r),
        1 => (r, -r + along),
        2 => (r - along, r),
        _ => (-r, r - along),
    };
    (dx as f64 * step_deg, dy as f64 * step_deg)
}
