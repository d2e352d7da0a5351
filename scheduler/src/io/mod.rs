//! Sequence loading, observation-record persistence and run logs.

pub mod history;
pub mod record;
pub mod sequence;

pub use record::{ObservationRecord, RecordStore};
pub use sequence::{load_sequence, parse_sequence, SequenceLoadResult};
