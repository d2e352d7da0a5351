//! Simulated hardware for tests and dry runs.
//!
//! The simulated camera and telescope honor the client traits, advance the
//! run's [`Clock`] instead of wall time, and can be scripted to fail so the
//! recovery paths can be exercised deterministically.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::camera::{CameraClient, ExposureMode, ExposureReply, ExposureRequest};
use super::telescope::{PointingOffsets, TelescopeClient};
use super::{CameraStatus, FocusSolver, HardwareError, HardwareResult, OffsetSolver, TelescopeStatus};
use crate::astro;
use crate::core::{Field, SiteParams};
use crate::run::Clock;

#[derive(Debug, Default)]
struct SimCameraState {
    exposures: u32,
    clears: u32,
    headers: Vec<(String, String)>,
    fail_next_exposures: u32,
    fail_next_readouts: u32,
    last_filename: Option<String>,
}

/// In-memory camera with scripted failures.
pub struct SimCamera {
    clock: Arc<dyn Clock>,
    readout_secs: f64,
    state: Mutex<SimCameraState>,
}

impl SimCamera {
    pub fn new(clock: Arc<dyn Clock>, readout_secs: f64) -> Arc<Self> {
        Arc::new(Self {
            clock,
            readout_secs,
            state: Mutex::new(SimCameraState::default()),
        })
    }

    /// Make the next `n` exposure commands fail outright.
    pub fn fail_next_exposures(&self, n: u32) {
        self.state.lock().fail_next_exposures = n;
    }

    /// Make the next `n` exposures fail during readout, after the exposure
    /// itself has completed.
    pub fn fail_next_readouts(&self, n: u32) {
        self.state.lock().fail_next_readouts = n;
    }

    pub fn exposures_taken(&self) -> u32 {
        self.state.lock().exposures
    }

    pub fn clears_issued(&self) -> u32 {
        self.state.lock().clears
    }

    pub fn header_entries(&self) -> Vec<(String, String)> {
        self.state.lock().headers.clone()
    }

    pub fn last_filename(&self) -> Option<String> {
        self.state.lock().last_filename.clone()
    }
}

#[async_trait]
impl CameraClient for SimCamera {
    async fn refresh_status(&self) -> HardwareResult<CameraStatus> {
        Ok(CameraStatus {
            ready: true,
            error: false,
            error_code: 0,
            state: "idle".to_string(),
            updated_at: Some(self.clock.now()),
        })
    }

    async fn clear(&self, clear_secs: f64) -> HardwareResult<()> {
        self.clock.sleep_secs(clear_secs).await;
        self.state.lock().clears += 1;
        Ok(())
    }

    async fn imprint_header(&self, entries: &[(String, String)]) -> HardwareResult<()> {
        self.state.lock().headers.extend_from_slice(entries);
        Ok(())
    }

    async fn expose(&self, request: ExposureRequest, mode: ExposureMode) -> HardwareResult<ExposureReply> {
        {
            let mut state = self.state.lock();
            if state.fail_next_exposures > 0 {
                state.fail_next_exposures -= 1;
                return Err(HardwareError::Protocol {
                    command: format!("expose {}", mode.as_str()),
                    reply: "ERROR shutter fault".to_string(),
                });
            }
        }

        self.clock.sleep_secs(request.exposure_secs).await;

        {
            let mut state = self.state.lock();
            if state.fail_next_readouts > 0 {
                state.fail_next_readouts -= 1;
                return Err(HardwareError::Protocol {
                    command: format!("expose {}", mode.as_str()),
                    reply: "ERROR readout".to_string(),
                });
            }
        }

        self.clock.sleep_secs(self.readout_secs).await;

        let mut state = self.state.lock();
        state.exposures += 1;
        state.last_filename = Some(request.filename.clone());
        Ok(ExposureReply {
            actual_exposure_secs: request.exposure_secs,
        })
    }
}

#[derive(Debug)]
struct SimTelescopeState {
    ra_hours: f64,
    dec_deg: f64,
    focus_mm: f64,
    dome_open: bool,
    stopped: bool,
    stowed: bool,
    fail_next_points: u32,
    points: u32,
}

/// In-memory telescope whose status reflects the simulated clock.
pub struct SimTelescope {
    site: SiteParams,
    clock: Arc<dyn Clock>,
    state: Mutex<SimTelescopeState>,
}

impl SimTelescope {
    pub fn new(site: SiteParams, clock: Arc<dyn Clock>, focus_mm: f64) -> Arc<Self> {
        Arc::new(Self {
            site,
            clock,
            state: Mutex::new(SimTelescopeState {
                ra_hours: 0.0,
                dec_deg: 0.0,
                focus_mm,
                dome_open: true,
                stopped: true,
                stowed: true,
                fail_next_points: 0,
                points: 0,
            }),
        })
    }

    pub fn set_dome_open(&self, open: bool) {
        self.state.lock().dome_open = open;
    }

    pub fn fail_next_points(&self, n: u32) {
        self.state.lock().fail_next_points = n;
    }

    pub fn points_commanded(&self) -> u32 {
        self.state.lock().points
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    pub fn is_stowed(&self) -> bool {
        self.state.lock().stowed
    }

    pub fn pointing(&self) -> (f64, f64) {
        let state = self.state.lock();
        (state.ra_hours, state.dec_deg)
    }
}

#[async_trait]
impl TelescopeClient for SimTelescope {
    async fn point(&self, ra_hours: f64, dec_deg: f64) -> HardwareResult<()> {
        {
            let mut state = self.state.lock();
            if state.fail_next_points > 0 {
                state.fail_next_points -= 1;
                return Err(HardwareError::Protocol {
                    command: format!("point {ra_hours:.4} {dec_deg:.4}"),
                    reply: "ERROR mount fault".to_string(),
                });
            }
        }

        // A short slew.
        self.clock.sleep_secs(5.0).await;

        let mut state = self.state.lock();
        state.ra_hours = ra_hours;
        state.dec_deg = dec_deg;
        state.stopped = false;
        state.stowed = false;
        state.points += 1;
        Ok(())
    }

    async fn stop(&self) -> HardwareResult<()> {
        self.state.lock().stopped = true;
        Ok(())
    }

    async fn stow(&self) -> HardwareResult<()> {
        let mut state = self.state.lock();
        state.stopped = true;
        state.stowed = true;
        Ok(())
    }

    async fn set_focus(&self, focus_mm: f64) -> HardwareResult<()> {
        self.state.lock().focus_mm = focus_mm;
        Ok(())
    }

    async fn get_focus(&self) -> HardwareResult<f64> {
        Ok(self.state.lock().focus_mm)
    }

    async fn refresh_status(&self) -> HardwareResult<TelescopeStatus> {
        let now = self.clock.now();
        let state = self.state.lock();
        Ok(TelescopeStatus {
            lst_hours: astro::lst(now.to_jd(), self.site.longitude_hours_west()),
            ut_hours: now.ut_hours(),
            ra_hours: state.ra_hours,
            dec_deg: state.dec_deg,
            dome_open: state.dome_open,
            focus_mm: state.focus_mm,
            ra_offset_deg: 0.0,
            dec_offset_deg: 0.0,
            weather: Default::default(),
            updated_at: Some(now),
        })
    }
}

enum SolverBehavior<T> {
    Measure(T),
    Unusable,
    Broken,
}

/// Scripted focus analysis.
pub struct SimFocusSolver {
    behavior: Mutex<SolverBehavior<f64>>,
}

impl SimFocusSolver {
    pub fn measuring(best_focus_mm: f64) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(SolverBehavior::Measure(best_focus_mm)),
        })
    }

    pub fn unusable() -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(SolverBehavior::Unusable),
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(SolverBehavior::Broken),
        })
    }
}

#[async_trait]
impl FocusSolver for SimFocusSolver {
    async fn best_focus(&self, _field: &Field) -> HardwareResult<Option<f64>> {
        match &*self.behavior.lock() {
            SolverBehavior::Measure(mm) => Ok(Some(*mm)),
            SolverBehavior::Unusable => Ok(None),
            SolverBehavior::Broken => Err(HardwareError::Link(
                "focus analysis pipeline unavailable".to_string(),
            )),
        }
    }
}

/// Scripted pointing-offset analysis.
pub struct SimOffsetSolver {
    behavior: Mutex<SolverBehavior<PointingOffsets>>,
}

impl SimOffsetSolver {
    pub fn measuring(offsets: PointingOffsets) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(SolverBehavior::Measure(offsets)),
        })
    }

    pub fn unusable() -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(SolverBehavior::Unusable),
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(SolverBehavior::Broken),
        })
    }
}

#[async_trait]
impl OffsetSolver for SimOffsetSolver {
    async fn solve_offsets(&self, _field: &Field) -> HardwareResult<Option<PointingOffsets>> {
        match &*self.behavior.lock() {
            SolverBehavior::Measure(offsets) => Ok(Some(*offsets)),
            SolverBehavior::Unusable => Ok(None),
            SolverBehavior::Broken => Err(HardwareError::Link(
                "astrometry pipeline unavailable".to_string(),
            )),
        }
    }
}
