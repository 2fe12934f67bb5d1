use std::fmt;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use super::http::HttpDecoder;
use super::symphonia_decoder::SymphoniaDecoder;
use super::types::{ImportSource, StreamInfo};
use super::wav::WavDecoder;
use crate::error::ImportError;

/// A pull-based decoder producing interleaved `f32` samples.
///
/// Every backend follows the same lifecycle: `open` once, query
/// `stream_info`, call `read_samples` until it returns 0, then `close`.
pub trait Decoder: Send {
    /// Receive the import's abort flag before `open`. Backends that can block
    /// for a long time inside one call poll it and bail out with
    /// [`ImportError::Aborted`].
    fn watch_abort(&mut self, _abort: Arc<AtomicBool>) {}

    fn open(&mut self, source: &ImportSource) -> Result<(), ImportError>;

    /// Only valid after a successful `open`.
    fn stream_info(&self) -> Result<StreamInfo, ImportError>;

    /// Fill `buf` with up to `buf.len()` samples. Returns 0 at end of stream.
    fn read_samples(&mut self, buf: &mut [f32]) -> Result<usize, ImportError>;

    /// Release the stream. Idempotent, safe after a failed `open`.
    fn close(&mut self);
}

/// Which decoder implementation handles a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderBackend {
    /// Local files in any format symphonia understands.
    Symphonia,
    /// Local WAV files read with hound.
    Wav,
    /// Remote locators fetched over HTTP, decoded with symphonia.
    Http,
}

impl DecoderBackend {
    /// Default backend for a source when none is configured.
    pub fn for_source(source: &ImportSource) -> Self {
        if source.is_remote() {
            DecoderBackend::Http
        } else {
            DecoderBackend::Symphonia
        }
    }

    pub fn create(self) -> Box<dyn Decoder> {
        match self {
            DecoderBackend::Symphonia => Box::new(SymphoniaDecoder::new()),
            DecoderBackend::Wav => Box::new(WavDecoder::new()),
            DecoderBackend::Http => Box::new(HttpDecoder::new()),
        }
    }
}

impl fmt::Display for DecoderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecoderBackend::Symphonia => "symphonia",
            DecoderBackend::Wav => "wav",
            DecoderBackend::Http => "http",
        };
        f.write_str(name)
    }
}

impl FromStr for DecoderBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "symphonia" => Ok(DecoderBackend::Symphonia),
            "wav" | "hound" => Ok(DecoderBackend::Wav),
            "http" => Ok(DecoderBackend::Http),
            other => Err(format!("unknown decoder backend: {other}")),
        }
    }
}

/// Time allowed to establish a connection to a remote source.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

static HTTP_CLIENT: Mutex<Option<reqwest::blocking::Client>> = Mutex::new(None);

/// One-time process setup for the decoder backends.
///
/// Builds the shared HTTP client and warms symphonia's registries. Calling it
/// again while already initialized does nothing. Must not be called from
/// inside an async runtime.
pub fn initialize() -> Result<(), ImportError> {
    let mut client = HTTP_CLIENT
        .lock()
        .map_err(|_| ImportError::Open("decoder registry poisoned".into()))?;
    if client.is_some() {
        debug!("Decoder backends already initialized");
        return Ok(());
    }

    let _ = symphonia::default::get_probe();
    let _ = symphonia::default::get_codecs();

    // No total timeout: long downloads are bounded by the HTTP backend's
    // stall detection and by aborts instead.
    let built = reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(Option::<Duration>::None)
        .build()
        .map_err(|e| ImportError::Open(format!("Failed to build HTTP client: {e}")))?;
    *client = Some(built);

    info!("Decoder backends initialized");
    Ok(())
}

/// Release what `initialize` set up. Idempotent.
pub fn shutdown() {
    let released = match HTTP_CLIENT.lock() {
        Ok(mut client) => client.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    if released.is_some() {
        info!("Decoder backends shut down");
    }
}

/// The shared HTTP client, if `initialize` has run.
pub(crate) fn http_client() -> Option<reqwest::blocking::Client> {
    HTTP_CLIENT.lock().ok().and_then(|client| client.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_from_config_strings() {
        assert_eq!("Symphonia".parse::<DecoderBackend>(), Ok(DecoderBackend::Symphonia));
        assert_eq!(" wav ".parse::<DecoderBackend>(), Ok(DecoderBackend::Wav));
        assert_eq!("http".parse::<DecoderBackend>(), Ok(DecoderBackend::Http));
        assert!("bass".parse::<DecoderBackend>().is_err());
    }

    #[test]
    fn default_backend_follows_source_kind() {
        let remote = ImportSource::parse("https://example.com/a.ogg").unwrap();
        let local = ImportSource::parse("a.ogg").unwrap();
        assert_eq!(DecoderBackend::for_source(&remote), DecoderBackend::Http);
        assert_eq!(DecoderBackend::for_source(&local), DecoderBackend::Symphonia);
    }
}
