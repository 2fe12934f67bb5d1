pub mod engine;
pub mod mailbox;
pub mod sink;
pub mod status;

pub use engine::{DecoderFactory, ImportEvent, Importer, MAX_CLIP_SAMPLES};
pub use sink::{ClipFactory, SampleSink, SinkFactory};
pub use status::{ImportStatus, StatusHandle, StatusSnapshot};
