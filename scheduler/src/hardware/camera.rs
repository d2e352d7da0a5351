//! Camera client seam and the overlapped-readout handshake.
//!
//! An exposure may be dispatched non-blocking: the command runs on a worker
//! task while the caller returns as soon as the exposure itself has elapsed,
//! free to reposition the telescope during readout. The worker completes a
//! single-slot oneshot channel; whichever camera operation comes next waits
//! on that slot first, bounded by the readout timeout. Missing the timeout
//! is the lost-readout error the executor recovers from.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{CameraStatus, HardwareError, HardwareResult};
use crate::config::CameraSettings;
use crate::errors::SchedulerError;
use crate::run::Clock;

/// Exposure dispatch mode.
///
/// The mode selects how long the issuing side must wait: a `Single` exposure
/// blocks through readout and transfer, `First`/`Next` overlap the transfer
/// of the previous image with the next exposure, `Last` only drains the
/// final transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureMode {
    Single,
    First,
    Next,
    Last,
}

impl ExposureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::First => "first",
            Self::Next => "next",
            Self::Last => "last",
        }
    }
}

/// One exposure command.
#[derive(Debug, Clone)]
pub struct ExposureRequest {
    pub open_shutter: bool,
    pub exposure_secs: f64,
    /// Output filename root handed to the controller.
    pub filename: String,
}

/// Reply to a completed exposure command.
#[derive(Debug, Clone)]
pub struct ExposureReply {
    pub actual_exposure_secs: f64,
}

/// Camera controller operations.
#[async_trait]
pub trait CameraClient: Send + Sync {
    async fn refresh_status(&self) -> HardwareResult<CameraStatus>;

    /// Flush accumulated charge for `clear_secs`.
    async fn clear(&self, clear_secs: f64) -> HardwareResult<()>;

    /// Push keyword/value pairs into the controller's header store.
    async fn imprint_header(&self, entries: &[(String, String)]) -> HardwareResult<()>;

    /// Run one exposure to completion (shutter, readout, transfer as the
    /// mode requires) and return the achieved exposure time.
    async fn expose(&self, request: ExposureRequest, mode: ExposureMode) -> HardwareResult<ExposureReply>;
}

/// Timing model for exposure command timeouts.
#[derive(Debug, Clone, Copy)]
pub struct CameraTimings {
    pub readout_secs: f64,
    pub transfer_secs: f64,
    pub allowance_secs: f64,
}

impl From<&CameraSettings> for CameraTimings {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            readout_secs: settings.readout_secs,
            transfer_secs: settings.transfer_secs,
            allowance_secs: settings.command_allowance_secs,
        }
    }
}

/// Timeout in seconds for reading the reply to an exposure command.
///
/// Overlapped dispatch always waits out the exposure plus one readout; a
/// blocking dispatch depends on the mode: `single` adds the transfer,
/// `first` ends at readout, `next` overlaps the previous image's transfer
/// with the new exposure (the reply arrives when the exposure ends, unless
/// the transfer outlasts it), `last` only drains the transfer.
pub fn expose_timeout(mode: ExposureMode, exposure_secs: f64, wait: bool, timings: &CameraTimings) -> f64 {
    let t = if !wait {
        exposure_secs + timings.readout_secs
    } else {
        match mode {
            ExposureMode::Single => exposure_secs + timings.readout_secs + timings.transfer_secs,
            ExposureMode::First => exposure_secs + timings.readout_secs,
            ExposureMode::Next => {
                if exposure_secs + timings.readout_secs > timings.transfer_secs {
                    exposure_secs
                } else {
                    timings.transfer_secs
                }
            }
            ExposureMode::Last => timings.transfer_secs,
        }
    };
    t + timings.allowance_secs
}

struct PendingReadout {
    rx: oneshot::Receiver<HardwareResult<ExposureReply>>,
    timeout: Duration,
}

/// The camera link: a client plus the single in-flight readout slot.
///
/// At most one readout is ever pending. Ownership of the slot is the mutual
/// exclusion over the camera link; no other lock is involved.
pub struct CameraLink {
    client: Arc<dyn CameraClient>,
    clock: Arc<dyn Clock>,
    timings: CameraTimings,
    status_timeout_secs: f64,
    pending: Option<PendingReadout>,
}

impl CameraLink {
    pub fn new(client: Arc<dyn CameraClient>, clock: Arc<dyn Clock>, settings: &CameraSettings) -> Self {
        Self {
            client,
            clock,
            timings: CameraTimings::from(settings),
            status_timeout_secs: settings.status_timeout_secs,
            pending: None,
        }
    }

    /// Whether a dispatched readout has not been waited on yet.
    pub fn readout_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Wait for the in-flight readout, if any.
    ///
    /// Timeout expiry, a worker failure or a dropped worker all surface as
    /// [`SchedulerError::ReadoutLoss`]; the slot is cleared either way.
    pub async fn wait_readout(&mut self) -> Result<(), SchedulerError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };

        log::debug!("waiting up to {:?} for readout to complete", pending.timeout);
        match tokio::time::timeout(pending.timeout, pending.rx).await {
            Err(_) => Err(SchedulerError::ReadoutLoss(format!(
                "timed out after {:.1} s waiting for readout",
                pending.timeout.as_secs_f64()
            ))),
            Ok(Err(_)) => Err(SchedulerError::ReadoutLoss(
                "readout worker terminated without reply".to_string(),
            )),
            Ok(Ok(Err(e))) => Err(SchedulerError::ReadoutLoss(e.to_string())),
            Ok(Ok(Ok(_))) => Ok(()),
        }
    }

    /// Query camera status. Drains the readout slot first.
    pub async fn refresh_status(&mut self) -> Result<CameraStatus, SchedulerError> {
        self.wait_readout().await?;
        self.client.refresh_status().await.map_err(Into::into)
    }

    /// Clear the camera. Drains the readout slot first.
    pub async fn clear(&mut self, clear_secs: f64) -> Result<(), SchedulerError> {
        self.wait_readout().await?;
        self.client.clear(clear_secs).await.map_err(Into::into)
    }

    /// Imprint header entries. Drains the readout slot first.
    pub async fn imprint_header(&mut self, entries: &[(String, String)]) -> Result<(), SchedulerError> {
        self.wait_readout().await?;
        self.client.imprint_header(entries).await.map_err(Into::into)
    }

    /// Dispatch an exposure.
    ///
    /// With `wait` set, blocks until the command completes and returns the
    /// controller's reply. Otherwise the command runs on a worker task: this
    /// call returns once the exposure time itself has elapsed, leaving the
    /// readout in flight in the pending slot.
    pub async fn start_exposure(
        &mut self,
        request: ExposureRequest,
        mode: ExposureMode,
        wait: bool,
    ) -> Result<ExposureReply, SchedulerError> {
        self.wait_readout().await?;

        let timeout_secs = expose_timeout(mode, request.exposure_secs, wait, &self.timings);
        let command_timeout = Duration::from_secs_f64(timeout_secs);

        if wait {
            let command = format!("expose {} {:.3}", mode.as_str(), request.exposure_secs);
            let reply = tokio::time::timeout(command_timeout, self.client.expose(request, mode))
                .await
                .map_err(|_| HardwareError::Timeout {
                    command,
                    timeout_secs,
                })??;
            return Ok(reply);
        }

        let client = Arc::clone(&self.client);
        let exposure_secs = request.exposure_secs;
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let command = format!("expose {} {:.3}", mode.as_str(), exposure_secs);
            let result = match tokio::time::timeout(command_timeout, client.expose(request, mode)).await {
                Ok(result) => result,
                Err(_) => Err(HardwareError::Timeout {
                    command,
                    timeout_secs,
                }),
            };
            // The receiver may have been dropped on shutdown.
            let _ = tx.send(result);
        });

        self.pending = Some(PendingReadout {
            rx,
            timeout: Duration::from_secs_f64(self.timings.readout_secs + self.timings.allowance_secs),
        });

        // Sit out the exposure itself so the shutter is closed before the
        // caller starts the next telescope motion.
        self.clock.sleep_secs(exposure_secs).await;

        Ok(ExposureReply {
            actual_exposure_secs: exposure_secs,
        })
    }

    /// Timeout used for quick status-style commands.
    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.status_timeout_secs)
    }
}
