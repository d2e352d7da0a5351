//! Core domain models for the observation scheduler.
//!
//! This module defines the fundamental data structures used throughout the
//! system: schedulable fields with their progress and derived scheduling
//! quantities, the night timing envelope, and the observatory site.

pub mod domain;
pub mod night;

pub use domain::{ExposureRecord, Field, FieldStatus, FocusParams, SelectionCode, ShutterCode, SurveyCode};
pub use night::{NightTimes, SiteParams};
