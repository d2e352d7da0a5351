//! Sequence-file parsing.
//!
//! One directive or field per line. Blank lines and `#` comments are
//! ignored; a `FILTER <name>` line sets the active filter; everything else
//! is a field line:
//!
//! ```text
//! RA_hours DEC_deg ShutterCode ExpTimeSec IntervalSec RepeatCount SurveyCode [FocusIncr FocusDefault]
//! ```
//!
//! Invalid lines are logged and skipped; a load never aborts on a bad line.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::SchedulerConfig;
use crate::core::{Field, FocusParams, ShutterCode, SurveyCode};
use crate::errors::SchedulerError;

/// Filter names the camera setup accepts.
pub const ACCEPTED_FILTERS: [&str; 4] = ["rgzz", "none", "fake", "clear"];

/// Result of loading a sequence file.
#[derive(Debug)]
pub struct SequenceLoadResult {
    pub fields: Vec<Field>,
    /// Filter selected by the last `FILTER` directive, if any.
    pub filter: Option<String>,
    /// Number of field lines rejected by validation.
    pub rejected: usize,
}

/// Load a sequence file from disk.
///
/// `start_index` is the index assigned to the first accepted field, letting
/// mid-run additions continue the numbering of an existing sequence.
pub fn load_sequence(
    path: &Path,
    config: &SchedulerConfig,
    start_index: usize,
) -> Result<SequenceLoadResult> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sequence file {}", path.display()))?;
    Ok(parse_sequence(&content, config, start_index))
}

/// Parse sequence text. Never fails: bad lines are logged and counted.
pub fn parse_sequence(
    content: &str,
    config: &SchedulerConfig,
    start_index: usize,
) -> SequenceLoadResult {
    let mut fields = Vec::new();
    let mut filter = None;
    let mut rejected = 0;

    for (line_no, raw_line) in content.lines().enumerate() {
        let line_no = line_no + 1;
        let line = raw_line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = strip_directive(line, "FILTER") {
            let name = rest.split_whitespace().next().unwrap_or("");
            if !ACCEPTED_FILTERS.contains(&name) {
                log::warn!("line {line_no}: unexpected filter name: {name}");
            }
            filter = Some(name.to_string());
            continue;
        }

        match parse_field_line(raw_line, line_no, start_index + fields.len(), config) {
            Ok(field) => fields.push(field),
            Err(e) => {
                log::warn!("{e}");
                rejected += 1;
            }
        }
    }

    SequenceLoadResult {
        fields,
        filter,
        rejected,
    }
}

fn strip_directive<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let first = line.split_whitespace().next()?;
    if first.eq_ignore_ascii_case(keyword) {
        Some(line[first.len()..].trim_start())
    } else {
        None
    }
}

fn invalid(line: usize, reason: impl Into<String>) -> SchedulerError {
    SchedulerError::Validation {
        line,
        reason: reason.into(),
    }
}

fn parse_field_line(
    raw_line: &str,
    line_no: usize,
    index: usize,
    config: &SchedulerConfig,
) -> Result<Field, SchedulerError> {
    // The comment part is free text for the header, not field parameters.
    let payload = raw_line.split('#').next().unwrap_or("");
    let tokens: Vec<&str> = payload.split_whitespace().collect();
    if tokens.len() < 7 {
        return Err(invalid(line_no, format!("expected 7 values, got {}", tokens.len())));
    }

    let num = |i: usize, name: &str| -> Result<f64, SchedulerError> {
        tokens[i]
            .parse::<f64>()
            .map_err(|_| invalid(line_no, format!("bad {name}: {}", tokens[i])))
    };

    let ra_hours = num(0, "RA")?;
    let dec_deg = num(1, "Dec")?;
    let shutter = ShutterCode::parse(tokens[2])
        .ok_or_else(|| invalid(line_no, format!("bad shutter code: {}", tokens[2])))?;
    let exposure_secs = num(3, "exposure time")?;
    let interval_secs = num(4, "interval")?;
    let n_required: u32 = tokens[5]
        .parse()
        .map_err(|_| invalid(line_no, format!("bad repeat count: {}", tokens[5])))?;
    let survey_code: i64 = tokens[6]
        .parse()
        .map_err(|_| invalid(line_no, format!("bad survey code: {}", tokens[6])))?;
    let survey = SurveyCode::from_code(survey_code)
        .ok_or_else(|| invalid(line_no, format!("survey code out of range: {survey_code}")))?;

    let obs = &config.observing;
    if !(0.0..24.0).contains(&ra_hours) {
        return Err(invalid(line_no, format!("RA out of range: {ra_hours}")));
    }
    if !(-90.0..=90.0).contains(&dec_deg) {
        return Err(invalid(line_no, format!("Dec out of range: {dec_deg}")));
    }
    if exposure_secs < 0.0 || exposure_secs > obs.max_exposure_secs {
        return Err(invalid(line_no, format!("exposure time out of range: {exposure_secs}")));
    }
    if interval_secs < obs.min_interval_hours * 3600.0 || interval_secs > obs.max_interval_secs {
        return Err(invalid(line_no, format!("interval out of range: {interval_secs}")));
    }
    if n_required < 1 || n_required > obs.max_obs_per_field {
        return Err(invalid(line_no, format!("repeat count out of range: {n_required}")));
    }

    let focus = if shutter == ShutterCode::Focus {
        if tokens.len() < 9 {
            return Err(invalid(line_no, "focus field needs increment and default columns"));
        }
        let increment_mm = num(7, "focus increment")?;
        let default_mm = num(8, "focus default")?;
        let params = FocusParams::new(increment_mm, default_mm, n_required);

        let tel = &config.telescope;
        if increment_mm < tel.min_focus_increment_mm || increment_mm > tel.max_focus_increment_mm {
            return Err(invalid(line_no, format!("focus increment out of range: {increment_mm}")));
        }
        if params.start_mm < tel.min_focus_mm
            || params.start_mm > tel.max_focus_mm
            || params.start_mm + n_required as f64 * increment_mm > tel.max_focus_mm
        {
            return Err(invalid(line_no, "focus sequence leaves the focus range"));
        }
        Some(params)
    } else {
        None
    };

    Ok(Field::new(
        index,
        line_no,
        raw_line.to_string(),
        ra_hours,
        dec_deg,
        shutter,
        exposure_secs / 3600.0,
        interval_secs / 3600.0,
        n_required,
        survey,
        focus,
    ))
}
