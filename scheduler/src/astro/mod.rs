//! In-repo astronomy collaborator.
//!
//! Everything the scheduling engine needs from positional astronomy lives
//! here: the Modified Julian Date time axis, sidereal time, coordinate
//! transforms, the altitude-threshold rise/set solver, twilight times and a
//! low-precision moon ephemeris. Accuracy targets are those of a scheduling
//! system (a minute or so), not an ephemeris service.

pub mod coords;
pub mod riset;
pub mod sun_moon;
pub mod time;

pub use coords::{airmass, altitude_azimuth, hour_angle, separation_deg};
pub use riset::rise_set_times;
pub use sun_moon::{moon_position, twilight_times, MoonEphemeris, TwilightTimes};
pub use time::{clock_difference, gmst, lst, ModifiedJulianDate};

/// Degrees per radian.
pub(crate) const DEG_PER_RAD: f64 = 57.295_779_513_082_32;
/// Hours of right ascension per radian.
pub(crate) const HOURS_PER_RAD: f64 = 3.819_718_634_205_488;
/// Julian Date of the J2000.0 epoch (2000-01-01 12:00 UT).
pub(crate) const JD_J2000: f64 = 2_451_545.0;
/// Length of the sidereal day in solar hours.
pub const SIDEREAL_DAY_IN_HOURS: f64 = 23.934_469_72;
