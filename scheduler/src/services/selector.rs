//! Field status recomputation and next-field selection.
//!
//! Status is a pure function of the field's current state and the time;
//! selection walks a strict priority cascade over the refreshed statuses.

use crate::astro::ModifiedJulianDate;
use crate::config::ObservingSettings;
use crate::core::{Field, FieldStatus, SelectionCode, ShutterCode, SurveyCode};

/// Recompute one field's status. The rules run in order; the first match
/// wins.
///
/// Completion and setting are one-way doors: both mark the field
/// permanently unobservable for the rest of the night.
pub fn update_field_status(
    field: &mut Field,
    now: ModifiedJulianDate,
    bad_weather: bool,
    min_execution_hours: f64,
) -> FieldStatus {
    let status = compute_status(field, now, bad_weather, min_execution_hours);
    field.status = status;
    status
}

fn compute_status(
    field: &mut Field,
    now: ModifiedJulianDate,
    bad_weather: bool,
    min_execution_hours: f64,
) -> FieldStatus {
    // 1. Abandoned or rejected.
    if !field.doable {
        return FieldStatus::NotDoable;
    }

    // 2. Completed: permanently done for the night.
    if field.is_complete() {
        field.doable = false;
        return FieldStatus::NotDoable;
    }

    // 3. Not yet risen.
    let (Some(rise), Some(set)) = (field.rise, field.set) else {
        return FieldStatus::NotDoable;
    };
    if now < rise {
        return FieldStatus::NotDoable;
    }

    // 4. Already set: permanently gone for the night.
    if now > set {
        field.doable = false;
        return FieldStatus::NotDoable;
    }

    // 5. Not yet due for the next repeat.
    let Some(next_due) = field.next_due else {
        return FieldStatus::NotDoable;
    };
    if next_due.hours_since(now) > min_execution_hours {
        return FieldStatus::NotDoable;
    }

    // 6. Darks and dome flats execute immediately once due.
    if matches!(field.shutter, ShutterCode::Dark | ShutterCode::DomeFlat) {
        return FieldStatus::DoNow;
    }

    // 7. The remaining calibrations need a usable sky.
    if matches!(
        field.shutter,
        ShutterCode::Focus | ShutterCode::Offset | ShutterCode::EveningFlat | ShutterCode::MorningFlat
    ) {
        return if bad_weather {
            FieldStatus::NotDoable
        } else {
            FieldStatus::DoNow
        };
    }

    // 8. Ordinary sky field: ready unless the remaining repeats no longer
    // fit before the field sets.
    field.time_required_hours = field.remaining() as f64 * field.interval_hours;
    field.time_up_hours = set.hours_since(now);
    field.time_left_hours = field.time_up_hours - field.time_required_hours;

    if field.time_left_hours < 0.0 {
        FieldStatus::TooLate
    } else {
        FieldStatus::Ready
    }
}

/// Shorten a too-late field's interval so its remaining repeats exactly fit
/// the time it has left above the airmass threshold.
///
/// The shortened interval is permanent. If it would drop below the
/// configured minimum, the field is abandoned for the night instead.
/// Returns whether the field survived.
pub fn shorten_interval(field: &mut Field, min_interval_hours: f64) -> bool {
    let remaining = field.remaining();
    if remaining == 0 {
        return false;
    }

    let new_interval = field.time_up_hours / remaining as f64;
    if new_interval > min_interval_hours {
        log::info!(
            "field {}: interval shortened {:.1} s -> {:.1} s",
            field.index,
            field.interval_hours * 3600.0,
            new_interval * 3600.0
        );
        field.interval_hours = new_interval;
        field.time_required_hours = field.time_up_hours;
        field.time_left_hours = 0.0;
        true
    } else {
        log::info!("field {}: cannot shorten interval further, abandoning", field.index);
        field.abandon();
        false
    }
}

/// Refresh every field's status and pick the next field to observe.
///
/// The cascade, first non-empty tier wins, lowest index breaking ties:
/// 1. any `DoNow` field;
/// 2. the `Ready` must-do field with the smallest margin;
/// 3. the `Ready` field with the smallest margin;
/// 4. the `TooLate` field with the largest margin, selected only if
///    interval shortening makes it `Ready` again.
///
/// `None` means nothing is ready this tick.
pub fn select_next_field(
    fields: &mut [Field],
    now: ModifiedJulianDate,
    bad_weather: bool,
    observing: &ObservingSettings,
) -> Option<usize> {
    let mut first_do_now: Option<usize> = None;
    let mut ready_must_do: Option<(usize, f64)> = None;
    let mut ready: Option<(usize, f64)> = None;
    let mut late: Option<(usize, f64)> = None;

    for i in 0..fields.len() {
        let status = update_field_status(&mut fields[i], now, bad_weather, observing.min_execution_hours);
        let margin = fields[i].time_left_hours;

        match status {
            FieldStatus::DoNow => {
                if first_do_now.is_none() {
                    first_do_now = Some(i);
                }
            }
            FieldStatus::Ready => {
                if fields[i].survey == SurveyCode::MustDo {
                    if ready_must_do.map_or(true, |(_, best)| margin < best) {
                        ready_must_do = Some((i, margin));
                    }
                } else if ready.map_or(true, |(_, best)| margin < best) {
                    ready = Some((i, margin));
                }
            }
            FieldStatus::TooLate => {
                if late.map_or(true, |(_, best)| margin > best) {
                    late = Some((i, margin));
                }
            }
            FieldStatus::NotDoable => {}
        }
    }

    if let Some(i) = first_do_now {
        fields[i].selection = SelectionCode::FirstDoNow;
        return Some(i);
    }

    if let Some((i, _)) = ready_must_do {
        fields[i].selection = SelectionCode::LeastTimeReadyMustDo;
        return Some(i);
    }

    if let Some((i, _)) = ready {
        fields[i].selection = SelectionCode::LeastTimeReady;
        return Some(i);
    }

    if let Some((i, _)) = late {
        // Least-overdue first: shortening its cadence may still save it.
        if shorten_interval(&mut fields[i], observing.min_interval_hours)
            && update_field_status(&mut fields[i], now, bad_weather, observing.min_execution_hours)
                == FieldStatus::Ready
        {
            fields[i].selection = SelectionCode::MostTimeReadyLate;
            return Some(i);
        }
    }

    None
}
