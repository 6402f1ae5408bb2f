pub mod recorder;

pub use recorder::{EventRecorder, OutcomeEvent, OutcomeEventBuilder};
