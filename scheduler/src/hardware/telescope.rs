//! Telescope client seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{HardwareResult, TelescopeStatus};

/// Live pointing corrections in degrees, measured by the offset
/// calibration and subtracted from sky pointings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointingOffsets {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

/// Telescope controller operations.
///
/// Every command carries its own bounded timeout inside the implementation;
/// failures surface as [`super::HardwareError`] and are never retried here.
#[async_trait]
pub trait TelescopeClient: Send + Sync {
    /// Slew to the given equatorial position and track.
    async fn point(&self, ra_hours: f64, dec_deg: f64) -> HardwareResult<()>;

    /// Halt tracking where the telescope stands.
    async fn stop(&self) -> HardwareResult<()>;

    /// Drive to the stow position.
    async fn stow(&self) -> HardwareResult<()>;

    async fn set_focus(&self, focus_mm: f64) -> HardwareResult<()>;

    async fn get_focus(&self) -> HardwareResult<f64>;

    /// Fetch a fresh status snapshot (pointing, dome, focus, weather).
    async fn refresh_status(&self) -> HardwareResult<TelescopeStatus>;
}
