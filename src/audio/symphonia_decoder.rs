use std::fs::File;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::decoder::Decoder;
use super::types::{ImportSource, StreamInfo};
use crate::error::ImportError;

/// An opened symphonia stream plus the decoded samples not yet handed out.
struct OpenStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn CodecDecoder>,
    track_id: u32,
    info: StreamInfo,
    sample_buf: Option<SampleBuffer<f32>>,
    pending: Vec<f32>,
    pending_pos: usize,
    finished: bool,
}

impl OpenStream {
    /// Decode the next packet of our track into `pending`.
    /// Returns false once the stream is exhausted.
    fn refill(&mut self) -> Result<bool, ImportError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Stream requested a decoder reset, ending import here");
                    return Ok(false);
                }
                Err(e) => {
                    return Err(ImportError::Decode(format!("Error reading packet: {e}")));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode warning: {e}");
                    continue;
                }
                Err(e) => return Err(ImportError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            let num_frames = decoded.capacity() as u64;
            let needed = decoded.capacity() * spec.channels.count();
            if self
                .sample_buf
                .as_ref()
                .is_some_and(|buf| buf.capacity() < needed)
            {
                self.sample_buf = None;
            }
            let sample_buf = self
                .sample_buf
                .get_or_insert_with(|| SampleBuffer::<f32>::new(num_frames, spec));
            sample_buf.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending.extend_from_slice(sample_buf.samples());
            self.pending_pos = 0;
            if !self.pending.is_empty() {
                return Ok(true);
            }
        }
    }
}

/// Decodes local files with symphonia's default format and codec registries.
#[derive(Default)]
pub struct SymphoniaDecoder {
    stream: Option<OpenStream>,
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe and prepare any media source. Shared with the HTTP backend.
    pub(crate) fn open_media(
        &mut self,
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
    ) -> Result<(), ImportError> {
        self.close();

        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| ImportError::Open(format!("Failed to probe format: {e}")))?;

        let format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| ImportError::Open("No default track found".into()))?
            .clone();

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| ImportError::Open("No sample rate in track".into()))?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| ImportError::Open("No channel layout in track".into()))?;
        let frames = track
            .codec_params
            .n_frames
            .ok_or_else(|| ImportError::Open("Stream length unknown".into()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| ImportError::Open(format!("Failed to create decoder: {e}")))?;

        let info = StreamInfo {
            length_samples: frames * channels as u64,
            sample_rate,
            channels,
        };
        debug!(?info, "Opened symphonia stream");

        self.stream = Some(OpenStream {
            format,
            decoder,
            track_id: track.id,
            info,
            sample_buf: None,
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
        });
        Ok(())
    }
}

impl Decoder for SymphoniaDecoder {
    fn open(&mut self, source: &ImportSource) -> Result<(), ImportError> {
        let ImportSource::Path(path) = source else {
            return Err(ImportError::Open(
                "symphonia backend only reads local files".into(),
            ));
        };
        let file = File::open(path)
            .map_err(|e| ImportError::Open(format!("Failed to open file: {e}")))?;
        let extension = source.extension();
        self.open_media(Box::new(file), extension.as_deref())
    }

    fn stream_info(&self) -> Result<StreamInfo, ImportError> {
        self.stream
            .as_ref()
            .map(|s| s.info)
            .ok_or(ImportError::NotOpen)
    }

    fn read_samples(&mut self, buf: &mut [f32]) -> Result<usize, ImportError> {
        let stream = self.stream.as_mut().ok_or(ImportError::NotOpen)?;
        let mut filled = 0;

        while filled < buf.len() {
            if stream.pending_pos < stream.pending.len() {
                let available = &stream.pending[stream.pending_pos..];
                let n = available.len().min(buf.len() - filled);
                buf[filled..filled + n].copy_from_slice(&available[..n]);
                stream.pending_pos += n;
                filled += n;
                continue;
            }
            if stream.finished {
                break;
            }
            if !stream.refill()? {
                stream.finished = true;
            }
        }

        Ok(filled)
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("Closed symphonia stream");
        }
    }
}
