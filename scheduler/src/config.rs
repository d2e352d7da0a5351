//! Scheduler configuration file support.
//!
//! Settings are read from a TOML file with serde-supplied defaults for every
//! field, so a minimal file only needs to override what differs from the
//! stock setup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::SiteParams;
use crate::errors::SchedulerError;

/// Complete scheduler configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub site: SiteSettings,
    #[serde(default)]
    pub observing: ObservingSettings,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub telescope: TelescopeSettings,
    #[serde(default)]
    pub paths: PathSettings,
    /// Run against simulated hardware with a virtual clock.
    #[serde(default)]
    pub simulate: bool,
}

/// Observatory site settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSettings {
    #[serde(default = "default_site_name")]
    pub name: String,
    /// Degrees, east positive.
    #[serde(default = "default_longitude")]
    pub longitude_deg: f64,
    #[serde(default = "default_latitude")]
    pub latitude_deg: f64,
    #[serde(default = "default_elevation")]
    pub elevation_m: f64,
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: f64,
}

/// Scheduling policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservingSettings {
    /// Start at the 12-degree twilight instead of the 18-degree one.
    #[serde(default = "default_true")]
    pub use_nautical_start: bool,
    /// Hours to wait after the chosen twilight before observing.
    #[serde(default)]
    pub startup_delay_hours: f64,
    /// Minimum time needed to make any observation, hours.
    #[serde(default = "default_min_execution")]
    pub min_execution_hours: f64,
    /// Fields are only scheduled below this airmass.
    #[serde(default = "default_max_airmass")]
    pub max_airmass: f64,
    /// Shortened repeat intervals may not drop below this, hours.
    #[serde(default)]
    pub min_interval_hours: f64,
    /// Minimum pointing separation from a bright moon, degrees.
    #[serde(default = "default_moon_separation")]
    pub min_moon_separation_deg: f64,
    /// Moon illumination above which the separation cut applies.
    #[serde(default = "default_moon_bright")]
    pub moon_bright_fraction: f64,
    #[serde(default = "default_min_dec")]
    pub min_dec_deg: f64,
    #[serde(default = "default_max_dec")]
    pub max_dec_deg: f64,
    /// Supernova-survey fields closer to the galactic plane are rejected.
    #[serde(default = "default_sne_gal_lat")]
    pub sne_min_galactic_latitude_deg: f64,
    /// Wait after sunset (and before sunrise) for twilight flats, hours.
    #[serde(default = "default_flat_wait")]
    pub flat_wait_hours: f64,
    /// Idle wait between ticks when paused or nothing is ready, seconds.
    #[serde(default = "default_loop_wait")]
    pub loop_wait_secs: u64,
    /// Sequence-line validation bounds.
    #[serde(default = "default_max_exposure")]
    pub max_exposure_secs: f64,
    #[serde(default = "default_max_interval")]
    pub max_interval_secs: f64,
    #[serde(default = "default_max_obs")]
    pub max_obs_per_field: u32,
    /// Dither grid step for twilight flats, degrees (10 arcsec).
    #[serde(default = "default_flat_dither")]
    pub flat_dither_step_deg: f64,
}

/// Camera link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Full-frame readout time, seconds.
    #[serde(default = "default_readout")]
    pub readout_secs: f64,
    /// Image transfer time, seconds.
    #[serde(default = "default_transfer")]
    pub transfer_secs: f64,
    /// Fixed allowance added to every command timeout, seconds.
    #[serde(default = "default_allowance")]
    pub command_allowance_secs: f64,
    /// Duration of one clear cycle, seconds.
    #[serde(default = "default_clear_time")]
    pub clear_secs: f64,
    /// Clear cycles issued when flushing accumulated charge.
    #[serde(default = "default_num_clears")]
    pub num_clears: u32,
    /// Hours since the last exposure after which the camera is cleared.
    #[serde(default = "default_clear_interval")]
    pub clear_interval_hours: f64,
    /// Timeout for quick status/header commands, seconds.
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: f64,
}

/// Telescope link and focus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelescopeSettings {
    #[serde(default = "default_min_focus")]
    pub min_focus_mm: f64,
    #[serde(default = "default_max_focus")]
    pub max_focus_mm: f64,
    #[serde(default = "default_min_focus_increment")]
    pub min_focus_increment_mm: f64,
    #[serde(default = "default_max_focus_increment")]
    pub max_focus_increment_mm: f64,
    /// Largest accepted jump from the default focus, mm.
    #[serde(default = "default_max_focus_change")]
    pub max_focus_change_mm: f64,
    #[serde(default = "default_focus")]
    pub default_focus_mm: f64,
    /// Timeout for pointing/stow commands, seconds.
    #[serde(default = "default_telescope_timeout")]
    pub command_timeout_secs: f64,
}

/// Output and checkpoint file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_record_file")]
    pub record_file: PathBuf,
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,
    #[serde(default = "default_obs_log_file")]
    pub obs_log_file: PathBuf,
    #[serde(default = "default_completed_file")]
    pub completed_file: PathBuf,
}

fn default_site_name() -> String {
    "La Silla".to_string()
}
fn default_longitude() -> f64 {
    -70.73
}
fn default_latitude() -> f64 {
    -29.25
}
fn default_elevation() -> f64 {
    2400.0
}
fn default_utc_offset() -> f64 {
    -4.0
}
fn default_true() -> bool {
    true
}
fn default_min_execution() -> f64 {
    0.029
}
fn default_max_airmass() -> f64 {
    2.0
}
fn default_moon_separation() -> f64 {
    15.0
}
fn default_moon_bright() -> f64 {
    0.5
}
fn default_min_dec() -> f64 {
    -89.0
}
fn default_max_dec() -> f64 {
    30.0
}
fn default_sne_gal_lat() -> f64 {
    15.0
}
fn default_flat_wait() -> f64 {
    0.5
}
fn default_loop_wait() -> u64 {
    10
}
fn default_max_exposure() -> f64 {
    1000.0
}
fn default_max_interval() -> f64 {
    43_200.0
}
fn default_max_obs() -> u32 {
    100
}
fn default_flat_dither() -> f64 {
    0.002_778
}
fn default_readout() -> f64 {
    40.0
}
fn default_transfer() -> f64 {
    10.0
}
fn default_allowance() -> f64 {
    5.0
}
fn default_clear_time() -> f64 {
    20.0
}
fn default_num_clears() -> u32 {
    2
}
fn default_clear_interval() -> f64 {
    0.1
}
fn default_status_timeout() -> f64 {
    5.0
}
fn default_min_focus() -> f64 {
    24.0
}
fn default_max_focus() -> f64 {
    28.0
}
fn default_min_focus_increment() -> f64 {
    0.025
}
fn default_max_focus_increment() -> f64 {
    0.10
}
fn default_max_focus_change() -> f64 {
    0.3
}
fn default_focus() -> f64 {
    25.30
}
fn default_telescope_timeout() -> f64 {
    60.0
}
fn default_record_file() -> PathBuf {
    PathBuf::from("scheduler.rec")
}
fn default_history_file() -> PathBuf {
    PathBuf::from("survey.hist")
}
fn default_obs_log_file() -> PathBuf {
    PathBuf::from("log.obs")
}
fn default_completed_file() -> PathBuf {
    PathBuf::from("fields.completed")
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            longitude_deg: default_longitude(),
            latitude_deg: default_latitude(),
            elevation_m: default_elevation(),
            utc_offset_hours: default_utc_offset(),
        }
    }
}

impl Default for ObservingSettings {
    fn default() -> Self {
        Self {
            use_nautical_start: true,
            startup_delay_hours: 0.0,
            min_execution_hours: default_min_execution(),
            max_airmass: default_max_airmass(),
            min_interval_hours: 0.0,
            min_moon_separation_deg: default_moon_separation(),
            moon_bright_fraction: default_moon_bright(),
            min_dec_deg: default_min_dec(),
            max_dec_deg: default_max_dec(),
            sne_min_galactic_latitude_deg: default_sne_gal_lat(),
            flat_wait_hours: default_flat_wait(),
            loop_wait_secs: default_loop_wait(),
            max_exposure_secs: default_max_exposure(),
            max_interval_secs: default_max_interval(),
            max_obs_per_field: default_max_obs(),
            flat_dither_step_deg: default_flat_dither(),
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            readout_secs: default_readout(),
            transfer_secs: default_transfer(),
            command_allowance_secs: default_allowance(),
            clear_secs: default_clear_time(),
            num_clears: default_num_clears(),
            clear_interval_hours: default_clear_interval(),
            status_timeout_secs: default_status_timeout(),
        }
    }
}

impl Default for TelescopeSettings {
    fn default() -> Self {
        Self {
            min_focus_mm: default_min_focus(),
            max_focus_mm: default_max_focus(),
            min_focus_increment_mm: default_min_focus_increment(),
            max_focus_increment_mm: default_max_focus_increment(),
            max_focus_change_mm: default_max_focus_change(),
            default_focus_mm: default_focus(),
            command_timeout_secs: default_telescope_timeout(),
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            record_file: default_record_file(),
            history_file: default_history_file(),
            obs_log_file: default_obs_log_file(),
            completed_file: default_completed_file(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SchedulerError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            SchedulerError::Configuration(format!("Failed to read config file: {}", e))
        })?;

        let config: SchedulerConfig = toml::from_str(&content).map_err(|e| {
            SchedulerError::Configuration(format!("Failed to parse config file: {}", e))
        })?;

        Ok(config)
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `scheduler.toml` in the current directory and the parent
    /// directory; absence falls back to the built-in defaults.
    pub fn from_default_location() -> Result<Self, SchedulerError> {
        let search_paths = [
            PathBuf::from("scheduler.toml"),
            PathBuf::from("../scheduler.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Site parameters as the domain value type.
    pub fn site_params(&self) -> SiteParams {
        SiteParams {
            name: self.site.name.clone(),
            longitude_deg: self.site.longitude_deg,
            latitude_deg: self.site.latitude_deg,
            elevation_m: self.site.elevation_m,
            utc_offset_hours: self.site.utc_offset_hours,
        }
    }

    /// Minimum altitude in degrees implied by the airmass cutoff.
    pub fn min_altitude_deg(&self) -> f64 {
        (1.0 / self.observing.max_airmass).asin().to_degrees()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_setup() {
        let config = SchedulerConfig::default();
        assert_eq!(config.site.name, "La Silla");
        assert!(config.observing.use_nautical_start);
        assert!((config.observing.max_airmass - 2.0).abs() < 1e-12);
        assert_eq!(config.camera.num_clears, 2);
        assert!(!config.simulate);
        assert_eq!(config.paths.record_file, PathBuf::from("scheduler.rec"));
    }

    #[test]
    fn min_altitude_from_airmass() {
        let config = SchedulerConfig::default();
        // airmass 2.0 corresponds to altitude 30 degrees.
        assert!((config.min_altitude_deg() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
simulate = true

[site]
name = "Fake Site"
latitude_deg = 10.0

[observing]
use_nautical_start = false
loop_wait_secs = 1

[camera]
readout_secs = 0.5
"#;

        let config: SchedulerConfig = toml::from_str(toml).unwrap();
        assert!(config.simulate);
        assert_eq!(config.site.name, "Fake Site");
        // Unset fields fall back to defaults.
        assert!((config.site.longitude_deg + 70.73).abs() < 1e-12);
        assert!(!config.observing.use_nautical_start);
        assert_eq!(config.observing.loop_wait_secs, 1);
        assert!((config.camera.readout_secs - 0.5).abs() < 1e-12);
        assert!((config.telescope.default_focus_mm - 25.30).abs() < 1e-12);
    }

    #[test]
    fn parse_rejects_malformed_toml() {
        let result: Result<SchedulerConfig, _> = toml::from_str("site = \"not a table\"");
        assert!(result.is_err());
    }
}
