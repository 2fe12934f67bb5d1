use std::io::{Cursor, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use reqwest::blocking::Client;
use reqwest::Url;
use tracing::{debug, info};

use super::decoder::{http_client, Decoder};
use super::symphonia_decoder::SymphoniaDecoder;
use super::types::{ImportSource, StreamInfo};
use crate::error::ImportError;

/// Default upper bound on a downloaded body.
pub const DEFAULT_MAX_BYTES: u64 = 512 * 1024 * 1024;
/// Largest read the fetch thread hands over at once.
const READ_CHUNK: usize = 64 * 1024;
/// How often the worker looks at the abort flag while waiting on the network.
const ABORT_POLL: Duration = Duration::from_millis(20);
/// A download that delivers nothing for this long is abandoned.
const STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Messages from the fetch thread to the decoder.
enum Fetched {
    Chunk(Vec<u8>),
    Done,
    Failed(ImportError),
}

/// Fetches a remote file into memory, then decodes it with symphonia.
///
/// The body is downloaded during `open`, so the stream length is known before
/// the first chunk is requested. The socket is read on a separate fetch
/// thread; the import worker only waits on a channel and checks its abort flag
/// between messages, so an abort never waits for the network.
pub struct HttpDecoder {
    inner: SymphoniaDecoder,
    max_bytes: u64,
    abort: Option<Arc<AtomicBool>>,
}

impl Default for HttpDecoder {
    fn default() -> Self {
        Self::with_max_bytes(DEFAULT_MAX_BYTES)
    }
}

impl HttpDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder refusing bodies larger than `max_bytes`.
    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self {
            inner: SymphoniaDecoder::new(),
            max_bytes,
            abort: None,
        }
    }

    fn aborted(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    fn download(&self, client: Client, url: &Url) -> Result<Vec<u8>, ImportError> {
        let (tx, rx) = crossbeam_channel::bounded(16);
        let max_bytes = self.max_bytes;
        let target = url.clone();
        thread::Builder::new()
            .name("clip-fetch".into())
            .spawn(move || fetch(&client, &target, max_bytes, &tx))
            .map_err(|e| ImportError::Open(format!("Failed to spawn fetch thread: {e}")))?;

        let mut body = Vec::new();
        let mut last_data = Instant::now();
        loop {
            if self.aborted() {
                debug!(%url, received = body.len(), "Download abandoned after abort");
                return Err(ImportError::Aborted);
            }
            match rx.recv_timeout(ABORT_POLL) {
                Ok(Fetched::Chunk(bytes)) => {
                    if (body.len() + bytes.len()) as u64 > max_bytes {
                        return Err(too_large(max_bytes));
                    }
                    body.extend_from_slice(&bytes);
                    last_data = Instant::now();
                }
                Ok(Fetched::Done) => return Ok(body),
                Ok(Fetched::Failed(e)) => return Err(e),
                Err(RecvTimeoutError::Timeout) => {
                    if last_data.elapsed() >= STALL_TIMEOUT {
                        return Err(ImportError::Open(format!(
                            "Download of {url} stalled for {}s",
                            STALL_TIMEOUT.as_secs()
                        )));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ImportError::Open(format!(
                        "Download of {url} ended unexpectedly"
                    )));
                }
            }
        }
    }
}

fn too_large(max_bytes: u64) -> ImportError {
    ImportError::Open(format!("Remote file exceeds the {max_bytes} byte limit"))
}

/// Body of the fetch thread. Stops as soon as the decoder hangs up.
fn fetch(client: &Client, url: &Url, max_bytes: u64, tx: &Sender<Fetched>) {
    let response = client
        .get(url.clone())
        .send()
        .and_then(|r| r.error_for_status());
    let mut response = match response {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.send(Fetched::Failed(ImportError::Open(format!(
                "Failed to fetch {url}: {e}"
            ))));
            return;
        }
    };

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            let _ = tx.send(Fetched::Failed(too_large(max_bytes)));
            return;
        }
    }

    loop {
        let mut buf = vec![0u8; READ_CHUNK];
        match response.read(&mut buf) {
            Ok(0) => {
                let _ = tx.send(Fetched::Done);
                return;
            }
            Ok(n) => {
                buf.truncate(n);
                if tx.send(Fetched::Chunk(buf)).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                let _ = tx.send(Fetched::Failed(ImportError::Open(format!(
                    "Failed to download {url}: {e}"
                ))));
                return;
            }
        }
    }
}

impl Decoder for HttpDecoder {
    fn watch_abort(&mut self, abort: Arc<AtomicBool>) {
        self.abort = Some(abort);
    }

    fn open(&mut self, source: &ImportSource) -> Result<(), ImportError> {
        let ImportSource::Url(url) = source else {
            return Err(ImportError::Open("http backend only reads URLs".into()));
        };
        let client = http_client()
            .ok_or_else(|| ImportError::Open("decoder backends are not initialized".into()))?;

        info!(%url, "Fetching remote audio");
        let body = self.download(client, url)?;
        debug!(bytes = body.len(), "Downloaded remote audio");

        let extension = source.extension();
        self.inner
            .open_media(Box::new(Cursor::new(body)), extension.as_deref())
    }

    fn stream_info(&self) -> Result<StreamInfo, ImportError> {
        self.inner.stream_info()
    }

    fn read_samples(&mut self, buf: &mut [f32]) -> Result<usize, ImportError> {
        self.inner.read_samples(buf)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_paths_are_refused() {
        let mut decoder = HttpDecoder::new();
        let source = ImportSource::parse("/tmp/a.mp3").unwrap();
        let err = decoder.open(&source).unwrap_err();
        assert_eq!(err.to_string(), "http backend only reads URLs");
        decoder.close();
    }

    #[test]
    fn raised_abort_flag_skips_the_download() {
        let mut decoder = HttpDecoder::new();
        decoder.watch_abort(Arc::new(AtomicBool::new(true)));
        assert!(decoder.aborted());

        let client = Client::new();
        let url = Url::parse("http://127.0.0.1:9/never.wav").unwrap();
        let err = decoder.download(client, &url).unwrap_err();
        assert!(matches!(err, ImportError::Aborted));
    }
}
