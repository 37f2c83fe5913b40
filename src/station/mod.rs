//! Weather station domain data and pure algorithms.
//!
//! Everything in here is side-effect free: reading shapes, rain-count
//! conversion, and the base/overlay merge. The stateful pipeline that feeds
//! these lives in [`crate::link`].

pub mod data;
pub mod merge;
pub mod rain;

// Re-export commonly used items
pub use data::{ConditionRecord, DataSource, Envelope, StationReading};
pub use merge::merge;
pub use rain::{convert_rain_fields, convert_rain_value};
