pub mod detection;
pub mod parameters;
pub mod radio;
pub mod scripted;
pub mod tag_id;

pub use detection::{AccumulatedDetectionSet, DetectionSnapshot};
pub use parameters::{ParameterSnapshot, ReaderParameters};
pub use radio::{MemoryBank, RadioInterface, TagDataRequest};
pub use scripted::ScriptedRadio;
pub use tag_id::{normalize, TagId};
