use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use super::mailbox::{self, Handled, Mailbox, Requester};
use super::sink::{SampleSink, SinkFactory};
use super::status::{ImportStatus, StatusCell, StatusHandle, StatusSnapshot};
use crate::audio::{Decoder, DecoderBackend, ImportSource, StreamInfo};
use crate::config::Config;
use crate::error::ImportError;

/// Largest stream the owner is asked to allocate a sink for, in samples.
/// Corrupt or placeholder length headers land above it.
pub const MAX_CLIP_SAMPLES: u64 = 1 << 30;

/// Builds the decoder for a source. Runs on the owner thread; the decoder
/// is then moved to the worker.
pub type DecoderFactory = Arc<dyn Fn(&ImportSource) -> Box<dyn Decoder> + Send + Sync>;

/// Notifications for the owner thread, drained from [`Importer::events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportEvent {
    /// The sink is usable. Sent once per import.
    Loaded { name: String },
    Finished,
    Failed(String),
    Aborted,
}

/// Work the worker asks the owner thread to perform.
enum Action {
    CreateSink(StreamInfo),
    /// The chunk buffer is lent to the owner and handed back in the reply.
    WriteChunk { samples: Vec<f32>, offset: u64 },
}

enum Reply {
    SinkCreated,
    Written(Vec<f32>),
}

/// One import in flight: the worker and the owner's end of its mailbox.
struct Session {
    source: ImportSource,
    mailbox: Mailbox<Action, Reply>,
    abort: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

/// Imports audio into sinks, decoding on a background thread.
///
/// All methods must be called from the thread that owns the sinks. The host
/// calls [`Importer::update`] regularly (once per frame or tick) to service
/// the worker's requests; nothing happens to the sink outside of it.
pub struct Importer<F: SinkFactory> {
    sinks: F,
    decoders: DecoderFactory,
    chunk_samples: usize,
    status: Arc<StatusCell>,
    session: Option<Session>,
    source: Option<ImportSource>,
    sink: Option<F::Sink>,
    initialized: bool,
    events_tx: Sender<ImportEvent>,
    events_rx: Receiver<ImportEvent>,
}

impl<F: SinkFactory> Importer<F> {
    /// Importer using the configured backend, or one picked per source.
    pub fn new(config: &Config, sinks: F) -> Self {
        let backend = config.backend;
        Self::with_decoders(sinks, config.chunk_samples, move |source: &ImportSource| {
            backend
                .unwrap_or_else(|| DecoderBackend::for_source(source))
                .create()
        })
    }

    /// Importer with a custom decoder factory.
    pub fn with_decoders<D>(sinks: F, chunk_samples: usize, decoders: D) -> Self
    where
        D: Fn(&ImportSource) -> Box<dyn Decoder> + Send + Sync + 'static,
    {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            sinks,
            decoders: Arc::new(decoders),
            chunk_samples: chunk_samples.max(1),
            status: Arc::new(StatusCell::default()),
            session: None,
            source: None,
            sink: None,
            initialized: false,
            events_tx,
            events_rx,
        }
    }

    /// Start importing `source`, aborting any import already in progress.
    ///
    /// Never blocks on decoding. A sink left from a previous import is
    /// released; call [`Importer::take_sink`] first to keep it.
    pub fn import(&mut self, source: ImportSource) {
        self.abort();
        self.reap();

        if let Some(old) = self.sink.take() {
            if !self.initialized {
                self.sinks.destroy(old);
            }
        }
        self.initialized = false;
        self.status.reset();
        self.source = Some(source.clone());

        let (requester, mailbox) = mailbox::mailbox();
        let abort = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            source: source.clone(),
            decoder: (self.decoders)(&source),
            requester,
            abort: abort.clone(),
            status: self.status.clone(),
            chunk_samples: self.chunk_samples,
        };

        info!(%source, "Starting import");
        let spawned = thread::Builder::new()
            .name("clip-import".into())
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                self.session = Some(Session {
                    source,
                    mailbox,
                    abort,
                    worker: Some(handle),
                });
            }
            Err(e) => {
                let message = format!("Failed to spawn import thread: {e}");
                error!("{message}");
                self.status.set(ImportStatus::Error(message.clone()));
                let _ = self.events_tx.send(ImportEvent::Failed(message));
            }
        }
    }

    /// Stop the active import as soon as possible and wait for its worker.
    ///
    /// Does nothing when no worker is running. A sink that never received
    /// samples is destroyed.
    pub fn abort(&mut self) {
        if !self.is_active() {
            self.reap();
            return;
        }

        self.stop_worker();

        if !self.status.status().is_terminal() {
            self.status.set(ImportStatus::Aborted);
            let _ = self.events_tx.send(ImportEvent::Aborted);
        }
        if let Some(source) = &self.source {
            info!(%source, "Import aborted");
        }
    }

    /// Flag the worker, release it from the mailbox and join it.
    fn stop_worker(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.abort.store(true, Ordering::Release);

        if !self.initialized {
            if let Some(sink) = self.sink.take() {
                debug!("Destroying sink that never received samples");
                self.sinks.destroy(sink);
            }
        }

        session.mailbox.cancel_all();
        if let Some(worker) = session.worker.take() {
            if worker.join().is_err() {
                error!(source = %session.source, "Import worker panicked during abort");
            }
        }
    }

    /// Service the worker: run its pending requests, then collect it if it
    /// has exited. Returns the number of requests run.
    pub fn update(&mut self) -> usize {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };

        let name = session.source.name();
        let sinks = &mut self.sinks;
        let sink = &mut self.sink;
        let initialized = &mut self.initialized;
        let status = &self.status;
        let events = &self.events_tx;
        let mut refused = false;

        let ran = session.mailbox.drain_pending(|action| match action {
            Action::CreateSink(info) => {
                debug!(?info, %name, "Creating sink");
                let created = sinks.create(&name, &info);
                if let Some(old) = sink.replace(created) {
                    sinks.destroy(old);
                }
                Handled::Reply(Reply::SinkCreated)
            }
            Action::WriteChunk { samples, offset } => match sink.as_mut() {
                Some(target) => {
                    target.write_samples(&samples, offset);
                    if !*initialized {
                        *initialized = true;
                        status.set(ImportStatus::Streaming);
                        let _ = events.send(ImportEvent::Loaded { name: name.clone() });
                    }
                    Handled::Reply(Reply::Written(samples))
                }
                None => {
                    refused = true;
                    Handled::Refuse
                }
            },
        });

        if refused {
            warn!("Sink disappeared while a write was pending, aborting import");
            let message = ImportError::SinkUnavailable.to_string();
            self.status.set(ImportStatus::Error(message.clone()));
            let _ = self.events_tx.send(ImportEvent::Failed(message));
            self.stop_worker();
            return ran;
        }

        self.reap();
        ran
    }

    /// Join a worker that exited on its own and report how it ended.
    fn reap(&mut self) {
        let finished = self
            .session
            .as_ref()
            .is_some_and(|s| !s.is_running());
        if !finished {
            return;
        }
        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Some(worker) = session.worker.take() {
            if worker.join().is_err() {
                error!("Import worker panicked");
                self.status
                    .set(ImportStatus::Error("import worker panicked".into()));
            }
        }
        session.mailbox.cancel_all();

        match self.status.status() {
            ImportStatus::Done => {
                if !self.initialized && self.sink.is_some() {
                    self.initialized = true;
                    let _ = self.events_tx.send(ImportEvent::Loaded {
                        name: session.source.name(),
                    });
                }
                info!(source = %session.source, "Import finished");
                let _ = self.events_tx.send(ImportEvent::Finished);
            }
            ImportStatus::Error(message) => {
                let _ = self.events_tx.send(ImportEvent::Failed(message));
            }
            _ => {}
        }
    }

    pub fn status(&self) -> ImportStatus {
        self.status.status()
    }

    pub fn progress(&self) -> f32 {
        self.status.progress()
    }

    pub fn error(&self) -> Option<String> {
        match self.status.status() {
            ImportStatus::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Status view that can be moved to other threads.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            cell: self.status.clone(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status.status() == ImportStatus::Done
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status.status(), ImportStatus::Error(_))
    }

    /// Has the sink received its first samples?
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Is a worker thread alive for the current import?
    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_running)
    }

    pub fn source(&self) -> Option<&ImportSource> {
        self.source.as_ref()
    }

    pub fn events(&self) -> Receiver<ImportEvent> {
        self.events_rx.clone()
    }

    pub fn sink(&self) -> Option<&F::Sink> {
        self.sink.as_ref()
    }

    /// Take the sink out of the importer.
    ///
    /// Taking it while an import is still streaming makes the next write
    /// fail and the import end with an error.
    pub fn take_sink(&mut self) -> Option<F::Sink> {
        self.sink.take()
    }
}

impl<F: SinkFactory> Drop for Importer<F> {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Closes the decoder on every exit path, including unwinding.
struct OpenDecoder(Box<dyn Decoder>);

impl Deref for OpenDecoder {
    type Target = dyn Decoder;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for OpenDecoder {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for OpenDecoder {
    fn drop(&mut self) {
        self.0.close();
    }
}

enum Outcome {
    Complete,
    Aborted,
}

/// Everything the background thread owns for one import.
struct Worker {
    source: ImportSource,
    decoder: Box<dyn Decoder>,
    requester: Requester<Action, Reply>,
    abort: Arc<AtomicBool>,
    status: Arc<StatusCell>,
    chunk_samples: usize,
}

impl Worker {
    fn run(self) {
        let Worker {
            source,
            decoder,
            requester,
            abort,
            status,
            chunk_samples,
        } = self;

        let mut decoder = OpenDecoder(decoder);
        decoder.watch_abort(abort.clone());
        let outcome = stream(
            &source,
            &mut decoder,
            &requester,
            &abort,
            &status,
            chunk_samples,
        );
        drop(decoder);

        let aborted = abort.load(Ordering::Acquire);
        match outcome {
            Ok(Outcome::Complete) if !aborted => {
                status.set(ImportStatus::Done);
            }
            Ok(_) => debug!(%source, "Import worker stopped after abort"),
            Err(e) if !aborted => {
                error!(%source, "Import failed: {e}");
                status.set(ImportStatus::Error(e.to_string()));
            }
            Err(e) => debug!(%source, "Import worker stopped after abort: {e}"),
        }
    }
}

/// The decode loop: open, size the sink, then hand over chunk after chunk.
fn stream(
    source: &ImportSource,
    decoder: &mut OpenDecoder,
    requester: &Requester<Action, Reply>,
    abort: &AtomicBool,
    status: &StatusCell,
    chunk_samples: usize,
) -> Result<Outcome, ImportError> {
    decoder.open(source)?;
    let info = decoder.stream_info()?;
    info!(
        %source,
        length_samples = info.length_samples,
        sample_rate = info.sample_rate,
        channels = info.channels,
        duration_secs = info.duration(),
        "Opened stream"
    );
    if info.length_samples > MAX_CLIP_SAMPLES {
        return Err(ImportError::Open(format!(
            "Stream too long: {} samples, limit is {MAX_CLIP_SAMPLES}",
            info.length_samples
        )));
    }

    if requester.request_and_wait(Action::CreateSink(info)).is_err() {
        return Ok(Outcome::Aborted);
    }

    let total = info.length_samples;
    let mut offset: u64 = 0;
    let mut chunk = vec![0.0f32; chunk_samples];

    while offset < total {
        let read = decoder.read_samples(&mut chunk)?;
        if read == 0 {
            warn!(
                %source,
                decoded = offset,
                expected = total,
                "Stream ended early, keeping what was decoded"
            );
            break;
        }

        if abort.load(Ordering::Acquire) {
            return Ok(Outcome::Aborted);
        }

        let len = (read as u64).min(total - offset) as usize;
        chunk.truncate(len);

        let Ok(Reply::Written(returned)) =
            requester.request_and_wait(Action::WriteChunk { samples: chunk, offset })
        else {
            return Ok(Outcome::Aborted);
        };
        chunk = returned;
        chunk.resize(chunk_samples, 0.0);

        offset += len as u64;
        status.advance_progress(offset as f32 / total as f32);
        debug!(offset, len, "Wrote chunk");
    }

    Ok(Outcome::Complete)
}
