use crate::audio::types::{AudioClip, StreamInfo};

/// Destination for decoded samples. Only ever touched on the owner thread.
pub trait SampleSink {
    /// Store `samples` starting at an interleaved sample offset.
    fn write_samples(&mut self, samples: &[f32], offset: u64);
}

/// Creates and discards sinks on behalf of the importer.
pub trait SinkFactory {
    type Sink: SampleSink;

    fn create(&mut self, name: &str, info: &StreamInfo) -> Self::Sink;

    /// Discard a sink that never became usable.
    fn destroy(&mut self, sink: Self::Sink) {
        drop(sink);
    }
}

impl SampleSink for AudioClip {
    fn write_samples(&mut self, samples: &[f32], offset: u64) {
        self.set_data(samples, offset as usize);
    }
}

/// Builds in-memory [`AudioClip`]s sized to the whole stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClipFactory;

impl SinkFactory for ClipFactory {
    type Sink = AudioClip;

    fn create(&mut self, name: &str, info: &StreamInfo) -> AudioClip {
        AudioClip::new(name, info)
    }
}
