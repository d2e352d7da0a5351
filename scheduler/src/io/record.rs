//! Observation-record persistence.
//!
//! The record is the run's checkpoint: run metadata plus the complete field
//! list with progress and history. It is rewritten after every successful
//! exposure and read back at start-up so an interrupted run resumes where it
//! stopped. A missing record file is a normal fresh start, not an error.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::Field;
use crate::errors::SchedulerError;

/// Persisted snapshot of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub num_fields: usize,
    pub saved_at: DateTime<Utc>,
    pub site_name: String,
    pub filter: Option<String>,
    pub fields: Vec<Field>,
}

impl ObservationRecord {
    pub fn new(site_name: String, filter: Option<String>, fields: Vec<Field>) -> Self {
        Self {
            num_fields: fields.len(),
            saved_at: Utc::now(),
            site_name,
            filter,
            fields,
        }
    }
}

/// File-backed store for the observation record.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the record, replacing any previous snapshot. The write goes to
    /// a sibling temp file first so a crash mid-write cannot corrupt the
    /// last good checkpoint.
    pub fn save(&self, record: &ObservationRecord) -> Result<(), SchedulerError> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| SchedulerError::Persistence(e.to_string()))?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &json).map_err(|e| SchedulerError::Persistence(e.to_string()))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| SchedulerError::Persistence(e.to_string()))?;

        log::debug!(
            "saved observation record: {} fields to {}",
            record.num_fields,
            self.path.display()
        );
        Ok(())
    }

    /// Read the previous snapshot. `Ok(None)` means no prior progress.
    pub fn load(&self) -> Result<Option<ObservationRecord>, SchedulerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no previous record of observations");
                return Ok(None);
            }
            Err(e) => return Err(SchedulerError::Persistence(e.to_string())),
        };

        let record: ObservationRecord = serde_json::from_str(&content)
            .map_err(|e| SchedulerError::Persistence(format!("bad record file: {e}")))?;

        let fresh = record.fields.iter().filter(|f| f.n_done == 0).count();
        let completed = record.fields.iter().filter(|f| f.is_complete()).count();
        let started = record.num_fields - fresh - completed;
        log::info!(
            "loaded observation record: {} total, {} fresh, {} started, {} completed",
            record.num_fields,
            fresh,
            started,
            completed
        );

        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::ModifiedJulianDate;
    use crate::core::{ExposureRecord, ShutterCode, SurveyCode};

    fn test_field(index: usize) -> Field {
        Field::new(
            index,
            index + 1,
            format!("{}.0 -20.0 Y 60.0 1800.0 3 2", index),
            index as f64,
            -20.0,
            ShutterCode::Sky,
            60.0 / 3600.0,
            0.5,
            3,
            SurveyCode::Tno,
            None,
        )
    }

    #[test]
    fn save_then_load_reproduces_progress() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("scheduler.rec"));

        let mut fields = vec![test_field(0), test_field(1)];
        let now = ModifiedJulianDate::new(60_000.0);
        fields[0].record_exposure(
            ExposureRecord {
                ut_hours: 2.0,
                mjd: now,
                lst_hours: 4.0,
                hour_angle_hours: -1.0,
                airmass: 1.4,
                actual_exposure_secs: 60.0,
                filename: "20241002020000Y".to_string(),
            },
            now,
        );
        fields[0].status = crate::core::FieldStatus::Ready;

        let record =
            ObservationRecord::new("La Silla".to_string(), Some("rgzz".to_string()), fields);
        store.save(&record).unwrap();

        let loaded = store.load().unwrap().expect("record should exist");
        assert_eq!(loaded.num_fields, 2);
        assert_eq!(loaded.site_name, "La Silla");
        assert_eq!(loaded.filter.as_deref(), Some("rgzz"));
        for (a, b) in loaded.fields.iter().zip(record.fields.iter()) {
            assert_eq!(a.n_done, b.n_done);
            assert_eq!(a.n_required, b.n_required);
            assert_eq!(a.status, b.status);
            assert_eq!(a.history.len(), b.history.len());
        }
        assert_eq!(loaded.fields[0].history[0].filename, "20241002020000Y");
    }

    #[test]
    fn missing_record_is_a_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("scheduler.rec"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.rec");
        fs::write(&path, "not json").unwrap();
        let store = RecordStore::new(path);
        assert!(store.load().is_err());
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("scheduler.rec"));

        let record = ObservationRecord::new("A".to_string(), None, vec![test_field(0)]);
        store.save(&record).unwrap();

        let record = ObservationRecord::new("B".to_string(), None, vec![test_field(0), test_field(1)]);
        store.save(&record).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.site_name, "B");
        assert_eq!(loaded.num_fields, 2);
    }
}
