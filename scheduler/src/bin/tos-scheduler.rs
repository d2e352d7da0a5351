//! Scheduler entry point.
//!
//! Usage: `tos-scheduler <sequence-file> <yyyy-mm-dd> [config-file]`
//!
//! Loads the observation record if one exists (resuming a previous run of
//! the same night), otherwise the sequence file, then drives the
//! observation loop until sunrise or termination.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

use tos_rust::config::SchedulerConfig;
use tos_rust::hardware::sim::{SimCamera, SimFocusSolver, SimOffsetSolver, SimTelescope};
use tos_rust::io::{load_sequence, RecordStore};
use tos_rust::run::{Clock, RunContext, SimClock, SystemClock};
use tos_rust::services::{plan_night, LoopDeps, ObservationLoop};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("usage: tos-scheduler <sequence-file> <yyyy-mm-dd> [config-file]");
    }

    let config = match args.get(3) {
        Some(path) => SchedulerConfig::from_file(path)?,
        None => SchedulerConfig::from_default_location()?,
    };
    let site = config.site_params();

    let date: NaiveDate = args[2]
        .parse()
        .with_context(|| format!("bad date: {}", args[2]))?;

    let night = plan_night(date, &site, &config.observing)?;

    // A surviving record means a run of this night was interrupted; resume
    // it instead of starting over.
    let record_store = RecordStore::new(config.paths.record_file.clone());
    let (fields, filter) = match record_store.load()? {
        Some(record) => {
            log::info!("continuing observation of {} fields", record.num_fields);
            (record.fields, record.filter)
        }
        None => {
            let loaded = load_sequence(std::path::Path::new(&args[1]), &config, 0)?;
            if loaded.fields.is_empty() {
                bail!("no valid fields in sequence file {}", args[1]);
            }
            log::info!(
                "{} fields loaded from {} ({} rejected)",
                loaded.fields.len(),
                args[1],
                loaded.rejected
            );
            (loaded.fields, loaded.filter)
        }
    };

    let ctx = RunContext::new();
    let clock: Arc<dyn Clock> = if config.simulate {
        SimClock::new(night.sunset)
    } else {
        Arc::new(SystemClock)
    };

    // Simulated hardware stands in for the observatory collaborators; real
    // socket-backed clients plug into the same seams.
    let telescope = SimTelescope::new(site.clone(), clock.clone(), config.telescope.default_focus_mm);
    let camera = SimCamera::new(clock.clone(), config.camera.readout_secs);
    let focus_solver = SimFocusSolver::measuring(config.telescope.default_focus_mm);
    let offset_solver = SimOffsetSolver::unusable();

    let mut observation_loop = ObservationLoop::new(
        config,
        night,
        fields,
        filter,
        LoopDeps {
            clock,
            ctx,
            telescope,
            camera,
            focus_solver,
            offset_solver,
        },
    );

    let stats = observation_loop.run().await?;
    log::info!(
        "run complete: {} loaded, {} observable, {} completed",
        stats.loaded,
        stats.observable,
        stats.completed
    );
    Ok(())
}
