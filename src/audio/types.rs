use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::Url;

use crate::error::ImportError;

/// Shape of an opened stream, reported once by a decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    /// Total interleaved samples (frames * channels).
    pub length_samples: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamInfo {
    /// Total number of frames (samples per channel).
    pub fn num_frames(&self) -> u64 {
        if self.channels == 0 {
            return 0;
        }
        self.length_samples / self.channels as u64
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_frames() as f64 / self.sample_rate as f64
    }
}

/// Where an import reads its audio from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportSource {
    Path(PathBuf),
    Url(Url),
}

impl ImportSource {
    /// Interpret a user-supplied locator.
    ///
    /// `http://` and `https://` locators are remote, `file://` URLs and
    /// everything else are local paths.
    pub fn parse(locator: &str) -> Result<Self, ImportError> {
        let trimmed = locator.trim();
        if trimmed.is_empty() {
            return Err(ImportError::Open("empty source".into()));
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let url = Url::parse(trimmed)
                .map_err(|e| ImportError::Open(format!("invalid URL {trimmed}: {e}")))?;
            return Ok(ImportSource::Url(url));
        }

        if lower.starts_with("file://") {
            let url = Url::parse(trimmed)
                .map_err(|e| ImportError::Open(format!("invalid URL {trimmed}: {e}")))?;
            let path = url
                .to_file_path()
                .map_err(|_| ImportError::Open(format!("not a local file URL: {trimmed}")))?;
            return Ok(ImportSource::Path(path));
        }

        Ok(ImportSource::Path(PathBuf::from(trimmed)))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ImportSource::Url(_))
    }

    /// Lowercased file extension, used as a probe hint.
    pub fn extension(&self) -> Option<String> {
        let ext = match self {
            ImportSource::Path(path) => path.extension()?.to_str()?.to_string(),
            ImportSource::Url(url) => {
                let segment = url.path_segments()?.next_back()?;
                Path::new(segment).extension()?.to_str()?.to_string()
            }
        };
        Some(ext.to_ascii_lowercase())
    }

    /// Deterministic clip name: the file stem of the path or last URL segment.
    pub fn name(&self) -> String {
        let stem = match self {
            ImportSource::Path(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string()),
            ImportSource::Url(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .and_then(|segment| Path::new(segment).file_stem())
                .map(|s| s.to_string_lossy().to_string()),
        };
        stem.filter(|s| !s.is_empty())
            .unwrap_or_else(|| "clip".to_string())
    }
}

impl fmt::Display for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSource::Path(path) => write!(f, "{}", path.display()),
            ImportSource::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Decoded audio stored entirely in memory, filled in chunk by chunk.
#[derive(Clone, Debug)]
pub struct AudioClip {
    pub name: String,
    /// Interleaved samples normalized to [-1.0, 1.0], sized up front.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    /// One past the last sample index written so far.
    written: usize,
}

impl AudioClip {
    pub fn new(name: impl Into<String>, info: &StreamInfo) -> Self {
        Self {
            name: name.into(),
            samples: vec![0.0; info.length_samples as usize],
            sample_rate: info.sample_rate,
            channels: info.channels,
            written: 0,
        }
    }

    /// Copy `data` into the clip at an interleaved sample offset.
    ///
    /// Samples that would land past the end of the clip are dropped.
    pub fn set_data(&mut self, data: &[f32], offset: usize) {
        if offset >= self.samples.len() {
            return;
        }
        let end = (offset + data.len()).min(self.samples.len());
        self.samples[offset..end].copy_from_slice(&data[..end - offset]);
        self.written = self.written.max(end);
    }

    /// End of the furthest write so far. Earlier samples may still be
    /// unwritten if chunks arrived out of order.
    pub fn samples_written(&self) -> usize {
        self.written
    }

    /// Total number of frames (samples per channel).
    pub fn num_frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_frames() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_remote_and_local_sources() {
        let remote = ImportSource::parse("https://example.com/music/Track%201.mp3").unwrap();
        assert!(remote.is_remote());
        assert_eq!(remote.extension().as_deref(), Some("mp3"));

        let local = ImportSource::parse("/tmp/song.FLAC").unwrap();
        assert_eq!(local, ImportSource::Path(PathBuf::from("/tmp/song.FLAC")));
        assert_eq!(local.extension().as_deref(), Some("flac"));
        assert_eq!(local.name(), "song");
    }

    #[test]
    fn file_urls_become_paths() {
        let source = ImportSource::parse("file:///tmp/loop.wav").unwrap();
        assert_eq!(source, ImportSource::Path(PathBuf::from("/tmp/loop.wav")));
    }

    #[test]
    fn empty_and_malformed_sources_are_rejected() {
        assert!(matches!(ImportSource::parse("  "), Err(ImportError::Open(_))));
        assert!(matches!(
            ImportSource::parse("http://"),
            Err(ImportError::Open(_))
        ));
    }

    #[test]
    fn name_falls_back_when_url_has_no_file() {
        let source = ImportSource::parse("https://example.com/").unwrap();
        assert_eq!(source.name(), "clip");
    }

    #[test]
    fn set_data_clamps_to_clip_length() {
        let info = StreamInfo {
            length_samples: 6,
            sample_rate: 8000,
            channels: 2,
        };
        let mut clip = AudioClip::new("c", &info);
        clip.set_data(&[0.5; 4], 4);
        assert_eq!(clip.samples, vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.5]);
        assert_eq!(clip.samples_written(), 6);
        assert_eq!(clip.num_frames(), 3);
    }

    #[test]
    fn samples_written_tracks_the_furthest_write() {
        let info = StreamInfo {
            length_samples: 8,
            sample_rate: 8000,
            channels: 1,
        };
        let mut clip = AudioClip::new("c", &info);
        clip.set_data(&[1.0; 2], 4);
        assert_eq!(clip.samples_written(), 6);
        clip.set_data(&[1.0; 2], 0);
        assert_eq!(clip.samples_written(), 6);
        assert_eq!(clip.samples[2], 0.0);
    }

    #[test]
    fn stream_duration_uses_frames() {
        let info = StreamInfo {
            length_samples: 88_200,
            sample_rate: 44_100,
            channels: 2,
        };
        assert_eq!(info.num_frames(), 44_100);
        assert_eq!(info.duration(), 1.0);
    }
}
