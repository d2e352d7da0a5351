//! Schedulable fields and their lifecycle state.
//!
//! A [`Field`] is one schedulable unit of the night: either a sky pointing or
//! a calibration sequence (darks, flats, focus runs, pointing offsets). Its
//! observability window is computed once per night; its progress and
//! [`FieldStatus`] are recomputed on every tick of the control loop.

use serde::{Deserialize, Serialize};

use crate::astro::ModifiedJulianDate;

/// Exposure kind parsed from the sequence-file shutter column.
///
/// The parse table is closed: an unrecognized token is a parse failure, never
/// silently mapped to one of the valid kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutterCode {
    /// Shutter stays closed (bias/dark current calibration).
    Dark,
    /// Ordinary survey sky field.
    Sky,
    /// Focus sequence stepping through focus settings.
    Focus,
    /// Pointing-offset calibration sequence.
    Offset,
    /// Twilight sky flat after sunset.
    EveningFlat,
    /// Twilight sky flat before sunrise.
    MorningFlat,
    /// Flat field against the illuminated dome.
    DomeFlat,
}

impl ShutterCode {
    /// Parse a sequence-file shutter token. Returns `None` for anything
    /// outside the accepted table.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "Y" | "y" => Some(Self::Sky),
            "N" | "n" => Some(Self::Dark),
            "F" | "f" => Some(Self::Focus),
            "P" | "p" | "O" => Some(Self::Offset),
            "E" | "e" => Some(Self::EveningFlat),
            "M" | "m" => Some(Self::MorningFlat),
            "L" | "l" => Some(Self::DomeFlat),
            _ => None,
        }
    }

    /// Single-letter code used in the sequence file and as the image
    /// filename suffix.
    pub fn letter(&self) -> char {
        match self {
            Self::Dark => 'N',
            Self::Sky => 'Y',
            Self::Focus => 'F',
            Self::Offset => 'P',
            Self::EveningFlat => 'E',
            Self::MorningFlat => 'M',
            Self::DomeFlat => 'L',
        }
    }

    /// Image-type label imprinted in the camera header.
    pub fn image_type(&self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Sky => "sky",
            Self::Focus => "focus",
            Self::Offset => "offset",
            Self::EveningFlat => "pmskyflat",
            Self::MorningFlat => "amskyflat",
            Self::DomeFlat => "domeskyflat",
        }
    }

    /// Whether the shutter opens for this kind.
    pub fn opens_shutter(&self) -> bool {
        !matches!(self, Self::Dark)
    }

    /// Whether executing this kind requires pointing the telescope first.
    /// Darks and dome flats are taken wherever the telescope happens to be.
    pub fn requires_pointing(&self) -> bool {
        !matches!(self, Self::Dark | Self::DomeFlat)
    }

    /// Calibration kinds whose exposure does not depend on a sky position;
    /// these are observable for the whole observing window.
    pub fn is_window_wide(&self) -> bool {
        matches!(self, Self::Dark | Self::DomeFlat | Self::Focus | Self::Offset)
    }
}

/// Survey classification of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurveyCode {
    None,
    Tno,
    Sne,
    /// Highest-priority tier, exempt from the time-budget rejection at
    /// night initialization.
    MustDo,
}

impl SurveyCode {
    /// Parse the numeric survey column. Code 4 (target-of-opportunity
    /// follow-up) folds into [`SurveyCode::MustDo`].
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Tno),
            2 => Some(Self::Sne),
            3 | 4 => Some(Self::MustDo),
            _ => None,
        }
    }
}

/// Scheduling status of a field, recomputed on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldStatus {
    /// Not observable right now (or permanently abandoned for the night).
    #[default]
    NotDoable,
    /// Observable, with enough time left to finish the remaining repeats.
    Ready,
    /// Calibration that must execute immediately once due.
    DoNow,
    /// Still observable but the remaining repeats no longer fit before set.
    TooLate,
}

/// How the selector last picked this field. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionCode {
    #[default]
    NotSelected,
    FirstDoNow,
    LeastTimeReadyMustDo,
    LeastTimeReady,
    MostTimeReadyLate,
}

/// One completed exposure of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureRecord {
    /// UT start time in hours.
    pub ut_hours: f64,
    /// Start time as MJD.
    pub mjd: ModifiedJulianDate,
    /// Local sidereal time at start, hours.
    pub lst_hours: f64,
    /// Hour angle at start, hours.
    pub hour_angle_hours: f64,
    /// Airmass at start.
    pub airmass: f64,
    /// Actual exposure length in seconds.
    pub actual_exposure_secs: f64,
    /// Output filename root assigned by the camera controller.
    pub filename: String,
}

/// Focus-sequence parameters from the trailing sequence-file columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusParams {
    /// Focus step between consecutive exposures, mm.
    pub increment_mm: f64,
    /// Default focus to fall back to, mm.
    pub default_mm: f64,
    /// First focus setting of the sequence, mm
    /// (default − (required/2) × increment).
    pub start_mm: f64,
}

impl FocusParams {
    /// Derive the sequence start from the default and increment.
    pub fn new(increment_mm: f64, default_mm: f64, n_required: u32) -> Self {
        let start_mm = default_mm - (n_required / 2) as f64 * increment_mm;
        Self {
            increment_mm,
            default_mm,
            start_mm,
        }
    }

    /// Focus setting for the given iteration of the sequence.
    pub fn setting_for(&self, iteration: u32) -> f64 {
        self.start_mm + self.increment_mm * iteration as f64
    }
}

/// One schedulable unit: a sky pointing or a calibration sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Position in the loaded sequence; the selector's tie-break key.
    pub index: usize,
    /// Line number in the sequence file.
    pub line_number: usize,
    /// Verbatim source line.
    pub script_line: String,

    /// Right ascension in hours.
    pub ra_hours: f64,
    /// Declination in degrees.
    pub dec_deg: f64,
    /// Galactic longitude/latitude, degrees; derived at load time.
    pub gal_lon_deg: f64,
    pub gal_lat_deg: f64,
    /// Ecliptic longitude/latitude, degrees; derived at load time.
    pub ecl_lon_deg: f64,
    pub ecl_lat_deg: f64,
    /// Epoch (Julian year) of the derived coordinates.
    pub epoch: f64,

    pub shutter: ShutterCode,
    /// Exposure duration in hours.
    pub exposure_hours: f64,
    /// Interval between repeats in hours. May be shortened by too-late
    /// recovery, never grown.
    pub interval_hours: f64,
    /// Requested number of exposures.
    pub n_required: u32,
    pub survey: SurveyCode,
    /// Present only for focus sequences.
    pub focus: Option<FocusParams>,

    /// False once the field is rejected or permanently abandoned.
    pub doable: bool,
    /// MJD when the field rises above the airmass threshold (clipped to the
    /// observing window).
    pub rise: Option<ModifiedJulianDate>,
    /// MJD when the field sets below the threshold (clipped likewise).
    pub set: Option<ModifiedJulianDate>,
    /// MJD the next exposure becomes due.
    pub next_due: Option<ModifiedJulianDate>,

    /// Number of exposures completed.
    pub n_done: u32,
    /// Remaining time the field is up, hours; refreshed with the status.
    pub time_up_hours: f64,
    /// Time required to finish the remaining repeats, hours.
    pub time_required_hours: f64,
    /// Margin: `time_up - time_required`, hours.
    pub time_left_hours: f64,

    pub status: FieldStatus,
    pub selection: SelectionCode,

    /// Completed-exposure records; grows up to `n_required` entries.
    pub history: Vec<ExposureRecord>,
}

impl Field {
    /// Create a freshly parsed field with no observability or progress state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        line_number: usize,
        script_line: String,
        ra_hours: f64,
        dec_deg: f64,
        shutter: ShutterCode,
        exposure_hours: f64,
        interval_hours: f64,
        n_required: u32,
        survey: SurveyCode,
        focus: Option<FocusParams>,
    ) -> Self {
        Self {
            index,
            line_number,
            script_line,
            ra_hours,
            dec_deg,
            gal_lon_deg: 0.0,
            gal_lat_deg: 0.0,
            ecl_lon_deg: 0.0,
            ecl_lat_deg: 0.0,
            epoch: 2000.0,
            shutter,
            exposure_hours,
            interval_hours,
            n_required,
            survey,
            focus,
            doable: false,
            rise: None,
            set: None,
            next_due: None,
            n_done: 0,
            time_up_hours: 0.0,
            time_required_hours: 0.0,
            time_left_hours: 0.0,
            status: FieldStatus::NotDoable,
            selection: SelectionCode::NotSelected,
            history: Vec::new(),
        }
    }

    /// Whether every required exposure has been taken.
    pub fn is_complete(&self) -> bool {
        self.n_done >= self.n_required
    }

    /// Exposures still outstanding.
    pub fn remaining(&self) -> u32 {
        self.n_required.saturating_sub(self.n_done)
    }

    /// Record one completed exposure and schedule the next repeat.
    ///
    /// A completed field is left untouched, preserving the invariant that
    /// the done count never exceeds the required count.
    pub fn record_exposure(&mut self, record: ExposureRecord, now: ModifiedJulianDate) {
        if self.is_complete() {
            log::warn!(
                "field {}: exposure recorded after completion, ignoring",
                self.index
            );
            return;
        }
        self.history.push(record);
        self.n_done += 1;
        self.next_due = Some(now.add_hours(self.interval_hours));
    }

    /// Undo the most recent exposure (lost readout) and make the field due
    /// again immediately.
    ///
    /// A field whose final exposure was lost may already have been marked
    /// complete by a status refresh; the roll-back reopens it. The next
    /// status refresh re-abandons it if it has set in the meantime.
    pub fn roll_back_exposure(&mut self, now: ModifiedJulianDate) {
        if self.n_done == 0 {
            return;
        }
        self.n_done -= 1;
        self.history.pop();
        self.next_due = Some(now);
        self.doable = true;
    }

    /// Mark the field permanently unobservable for the rest of the night.
    pub fn abandon(&mut self) {
        self.doable = false;
        self.status = FieldStatus::NotDoable;
    }

    /// Free-text comment: everything after `#` on the script line.
    pub fn comment(&self) -> Option<&str> {
        self.script_line.split_once('#').map(|(_, c)| c.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sky_field() -> Field {
        Field::new(
            0,
            1,
            "5.5 23.5 Y 60.0 1800.0 3 2 # m31-ref".to_string(),
            5.5,
            23.5,
            ShutterCode::Sky,
            60.0 / 3600.0,
            0.5,
            3,
            SurveyCode::Sne,
            None,
        )
    }

    fn record_at(mjd: f64) -> ExposureRecord {
        ExposureRecord {
            ut_hours: 3.0,
            mjd: ModifiedJulianDate::new(mjd),
            lst_hours: 6.0,
            hour_angle_hours: 0.5,
            airmass: 1.2,
            actual_exposure_secs: 60.0,
            filename: "20241002031500Y".to_string(),
        }
    }

    #[test]
    fn shutter_parse_table_is_closed() {
        assert_eq!(ShutterCode::parse("Y"), Some(ShutterCode::Sky));
        assert_eq!(ShutterCode::parse("n"), Some(ShutterCode::Dark));
        assert_eq!(ShutterCode::parse("O"), Some(ShutterCode::Offset));
        assert_eq!(ShutterCode::parse("l"), Some(ShutterCode::DomeFlat));
        assert_eq!(ShutterCode::parse("X"), None);
        assert_eq!(ShutterCode::parse(""), None);
        assert_eq!(ShutterCode::parse("YY"), None);
    }

    #[test]
    fn shutter_pointing_and_window_rules() {
        assert!(!ShutterCode::Dark.requires_pointing());
        assert!(!ShutterCode::DomeFlat.requires_pointing());
        assert!(ShutterCode::Sky.requires_pointing());
        assert!(ShutterCode::Dark.is_window_wide());
        assert!(ShutterCode::Focus.is_window_wide());
        assert!(!ShutterCode::EveningFlat.is_window_wide());
        assert!(!ShutterCode::Dark.opens_shutter());
        assert!(ShutterCode::DomeFlat.opens_shutter());
    }

    #[test]
    fn survey_code_four_folds_into_must_do() {
        assert_eq!(SurveyCode::from_code(3), Some(SurveyCode::MustDo));
        assert_eq!(SurveyCode::from_code(4), Some(SurveyCode::MustDo));
        assert_eq!(SurveyCode::from_code(0), Some(SurveyCode::None));
        assert_eq!(SurveyCode::from_code(5), None);
        assert_eq!(SurveyCode::from_code(-1), None);
    }

    #[test]
    fn focus_params_center_the_sequence() {
        let focus = FocusParams::new(0.05, 25.30, 5);
        assert!((focus.start_mm - 25.20).abs() < 1e-9);
        assert!((focus.setting_for(0) - 25.20).abs() < 1e-9);
        assert!((focus.setting_for(4) - 25.40).abs() < 1e-9);
    }

    #[test]
    fn record_exposure_updates_progress() {
        let mut field = sky_field();
        let now = ModifiedJulianDate::new(60_000.0);
        field.record_exposure(record_at(60_000.0), now);

        assert_eq!(field.n_done, 1);
        assert_eq!(field.history.len(), 1);
        let due = field.next_due.unwrap();
        assert!((due.hours_since(now) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn record_exposure_never_exceeds_required() {
        let mut field = sky_field();
        let now = ModifiedJulianDate::new(60_000.0);
        for i in 0..5 {
            field.record_exposure(record_at(60_000.0 + i as f64 * 0.02), now);
        }
        assert_eq!(field.n_done, field.n_required);
        assert_eq!(field.history.len(), field.n_required as usize);
    }

    #[test]
    fn roll_back_reschedules_immediately() {
        let mut field = sky_field();
        let t0 = ModifiedJulianDate::new(60_000.0);
        field.record_exposure(record_at(60_000.0), t0);

        let t1 = t0.add_hours(0.1);
        field.roll_back_exposure(t1);
        assert_eq!(field.n_done, 0);
        assert!(field.history.is_empty());
        assert_eq!(field.next_due, Some(t1));

        // Rolling back an untouched field is a no-op.
        field.roll_back_exposure(t1);
        assert_eq!(field.n_done, 0);
    }

    #[test]
    fn comment_extracts_text_after_hash() {
        let field = sky_field();
        assert_eq!(field.comment(), Some("m31-ref"));

        let mut no_comment = sky_field();
        no_comment.script_line = "5.5 23.5 Y 60.0 1800.0 3 2".to_string();
        assert_eq!(no_comment.comment(), None);
    }
}
