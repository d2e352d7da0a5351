//! Hardware collaborators: the camera and telescope client seams, their
//! status snapshots, and the analysis hand-offs for focus and pointing
//! offsets.
//!
//! Real deployments implement these traits over the observatory's socket
//! protocols; the simulated implementations in [`sim`] back tests and dry
//! runs.

pub mod camera;
pub mod sim;
pub mod telescope;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::astro::ModifiedJulianDate;
use crate::core::Field;

pub use camera::{CameraClient, CameraLink, CameraTimings, ExposureMode, ExposureReply, ExposureRequest};
pub use telescope::{PointingOffsets, TelescopeClient};

/// Result type for hardware operations.
pub type HardwareResult<T> = Result<T, HardwareError>;

/// Error type for hardware operations.
///
/// No command is retried automatically; every failure is surfaced to the
/// control loop, which decides the recovery action.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("command timed out after {timeout_secs:.1} s: {command}")]
    Timeout { command: String, timeout_secs: f64 },

    #[error("protocol error from {command}: {reply}")]
    Protocol { command: String, reply: String },

    #[error("hardware link error: {0}")]
    Link(String),
}

/// Weather as reported by the telescope controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherInfo {
    pub temperature_c: f64,
    pub humidity: f64,
    pub wind_speed_ms: f64,
    pub wind_direction_deg: f64,
    pub dew_point_c: f64,
}

/// Last-known-good telescope snapshot. Refreshed explicitly; stale values
/// are served until the next refresh succeeds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelescopeStatus {
    /// Local sidereal time in hours.
    pub lst_hours: f64,
    /// UT in hours.
    pub ut_hours: f64,
    /// Current pointing.
    pub ra_hours: f64,
    pub dec_deg: f64,
    pub dome_open: bool,
    pub focus_mm: f64,
    /// Live pointing corrections in degrees.
    pub ra_offset_deg: f64,
    pub dec_offset_deg: f64,
    pub weather: WeatherInfo,
    /// When this snapshot was taken.
    pub updated_at: Option<ModifiedJulianDate>,
}

/// Last-known-good camera snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraStatus {
    pub ready: bool,
    pub error: bool,
    pub error_code: i32,
    pub state: String,
    pub updated_at: Option<ModifiedJulianDate>,
}

/// Focus-analysis hand-off run after a completed focus sequence.
#[async_trait]
pub trait FocusSolver: Send + Sync {
    /// Analyze the sequence's images and return the best focus in mm.
    ///
    /// `Ok(None)` means the sequence produced no usable measurement (the
    /// caller falls back to the default focus); `Err` means the analysis
    /// itself is broken, which is fatal for the run.
    async fn best_focus(&self, field: &Field) -> HardwareResult<Option<f64>>;
}

/// Pointing-offset hand-off run after a completed offset sequence.
#[async_trait]
pub trait OffsetSolver: Send + Sync {
    /// Measure pointing offsets from the sequence's images.
    ///
    /// `Ok(None)` or `Err` both leave the previous offsets in effect; an
    /// offset failure is never fatal.
    async fn solve_offsets(&self, field: &Field) -> HardwareResult<Option<PointingOffsets>>;
}
