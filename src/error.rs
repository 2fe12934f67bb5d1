use thiserror::Error;

/// Failures surfaced by decoder backends and the import engine.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The source could not be opened: unreachable, unsupported, or malformed.
    #[error("{0}")]
    Open(String),
    /// The decoder failed after the stream was opened.
    #[error("decode failed: {0}")]
    Decode(String),
    /// The import was cancelled by the owner thread.
    #[error("import aborted")]
    Aborted,
    /// The sink went away while a write was pending.
    #[error("sink unavailable")]
    SinkUnavailable,
    /// A stream query was made before a successful `open`.
    #[error("decoder is not open")]
    NotOpen,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<symphonia::core::errors::Error> for ImportError {
    fn from(e: symphonia::core::errors::Error) -> Self {
        ImportError::Decode(e.to_string())
    }
}

impl From<hound::Error> for ImportError {
    fn from(e: hound::Error) -> Self {
        ImportError::Decode(e.to_string())
    }
}

/// Failures opening the audio output.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("No audio output device found")]
    NoDevice,
    #[error("Failed to get output config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("Failed to build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("Failed to start stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("Unsupported sample format: {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),
    #[error("Failed to spawn keepalive thread: {0}")]
    Thread(std::io::Error),
}
