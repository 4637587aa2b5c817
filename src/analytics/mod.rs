pub mod event;
pub mod roi;

pub use event::{AnalyticsEvent, EVENT_SCHEMA_VERSION};
pub use roi::{assemble, Roi, RoiGroup};
