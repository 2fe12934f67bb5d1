use std::fs::File;
use std::io::BufReader;

use hound::{SampleFormat, WavReader};
use tracing::debug;

use super::decoder::Decoder;
use super::types::{ImportSource, StreamInfo};
use crate::error::ImportError;

/// Reads local WAV files with hound, converting integer PCM to `f32`.
#[derive(Default)]
pub struct WavDecoder {
    reader: Option<WavReader<BufReader<File>>>,
}

impl WavDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for WavDecoder {
    fn open(&mut self, source: &ImportSource) -> Result<(), ImportError> {
        self.close();

        let ImportSource::Path(path) = source else {
            return Err(ImportError::Open("wav backend does not support URLs".into()));
        };
        let reader = WavReader::open(path)
            .map_err(|e| ImportError::Open(format!("Failed to open WAV file: {e}")))?;

        let spec = reader.spec();
        if spec.channels == 0 {
            return Err(ImportError::Open("WAV file declares zero channels".into()));
        }
        debug!(?spec, path = %path.display(), "Opened WAV stream");

        self.reader = Some(reader);
        Ok(())
    }

    fn stream_info(&self) -> Result<StreamInfo, ImportError> {
        let reader = self.reader.as_ref().ok_or(ImportError::NotOpen)?;
        let spec = reader.spec();
        Ok(StreamInfo {
            length_samples: reader.len() as u64,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    fn read_samples(&mut self, buf: &mut [f32]) -> Result<usize, ImportError> {
        let reader = self.reader.as_mut().ok_or(ImportError::NotOpen)?;
        let spec = reader.spec();
        let mut read = 0;

        match spec.sample_format {
            SampleFormat::Float => {
                for (slot, sample) in buf.iter_mut().zip(reader.samples::<f32>()) {
                    *slot = sample?;
                    read += 1;
                }
            }
            SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                for (slot, sample) in buf.iter_mut().zip(reader.samples::<i32>()) {
                    *slot = sample? as f32 * scale;
                    read += 1;
                }
            }
        }

        Ok(read)
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!("Closed WAV stream");
        }
    }
}
