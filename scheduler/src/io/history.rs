//! Append-only run logs: the per-tick completion strip, the per-exposure
//! observation log and the completed-fields list.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::astro::ModifiedJulianDate;
use crate::core::{ExposureRecord, Field};
use crate::errors::SchedulerError;

fn append_line(path: &Path, line: &str) -> Result<(), SchedulerError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SchedulerError::Persistence(e.to_string()))?;
    writeln!(file, "{line}").map_err(|e| SchedulerError::Persistence(e.to_string()))
}

/// Appends one line per observation to the history strip: a character per
/// field, `.` once complete, otherwise the number of exposures done.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, now: ModifiedJulianDate, fields: &[Field]) -> Result<(), SchedulerError> {
        let mut line = format!("{:12.6} ", now.value());
        for field in fields {
            if field.is_complete() {
                line.push('.');
            } else if field.n_done < 10 {
                line.push(char::from_digit(field.n_done, 10).unwrap_or('?'));
            } else {
                line.push('+');
            }
        }
        append_line(&self.path, &line)
    }
}

/// Appends one line per exposure to the observation log.
#[derive(Debug, Clone)]
pub struct ObsLog {
    path: PathBuf,
}

impl ObsLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, field: &Field, record: &ExposureRecord) -> Result<(), SchedulerError> {
        let line = format!(
            "{:10.6} {:10.6} {} {} {:6.1} {:10.6} {:12.6} {:10.3} {} # {} {}",
            field.ra_hours,
            field.dec_deg,
            field.shutter.letter(),
            field.n_done,
            field.exposure_hours * 3600.0,
            record.hour_angle_hours,
            record.mjd.value(),
            record.actual_exposure_secs,
            record.filename,
            field.shutter.image_type(),
            field.index,
        );
        append_line(&self.path, &line)
    }
}

/// Write the verbatim script lines of every completed field.
pub fn write_completed(path: &Path, fields: &[Field]) -> Result<usize, SchedulerError> {
    let mut count = 0;
    for field in fields.iter().filter(|f| f.is_complete()) {
        append_line(path, &field.script_line)?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ShutterCode, SurveyCode};

    fn test_field(index: usize, n_done: u32, n_required: u32) -> Field {
        let mut field = Field::new(
            index,
            index + 1,
            format!("{index}.0 -20.0 Y 60.0 1800.0 {n_required} 2"),
            index as f64,
            -20.0,
            ShutterCode::Sky,
            60.0 / 3600.0,
            0.5,
            n_required,
            SurveyCode::Tno,
            None,
        );
        field.n_done = n_done;
        field
    }

    #[test]
    fn history_strip_encodes_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.hist");
        let log = HistoryLog::new(&path);

        let fields = vec![
            test_field(0, 0, 3),
            test_field(1, 2, 3),
            test_field(2, 3, 3),
        ];
        log.append(ModifiedJulianDate::new(60_000.25), &fields).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let strip = content.trim().rsplit(' ').next().unwrap();
        assert_eq!(strip, "02.");
    }

    #[test]
    fn obs_log_line_contains_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.obs");
        let log = ObsLog::new(&path);

        let field = test_field(0, 1, 3);
        let record = ExposureRecord {
            ut_hours: 2.0,
            mjd: ModifiedJulianDate::new(60_000.1),
            lst_hours: 4.0,
            hour_angle_hours: -0.5,
            airmass: 1.3,
            actual_exposure_secs: 60.0,
            filename: "20241002020000Y".to_string(),
        };
        log.append(&field, &record).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("20241002020000Y"));
        assert!(content.contains("# sky 0"));
    }

    #[test]
    fn completed_file_lists_only_finished_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields.completed");

        let fields = vec![test_field(0, 3, 3), test_field(1, 1, 3)];
        let count = write_completed(&path, &fields).unwrap();
        assert_eq!(count, 1);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("0.0 -20.0 Y"));
        assert!(!content.contains("1.0 -20.0 Y"));
    }
}
