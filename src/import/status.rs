use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

/// Publicly observable phase of an import.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportStatus {
    Idle,
    /// Worker is opening the source or waiting for the sink to exist.
    Initializing,
    /// The first chunk has been written; the sink is usable.
    Streaming,
    Done,
    Error(String),
    Aborted,
}

impl ImportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportStatus::Done | ImportStatus::Error(_) | ImportStatus::Aborted
        )
    }

    fn code(&self) -> u8 {
        match self {
            ImportStatus::Idle => IDLE,
            ImportStatus::Initializing => INITIALIZING,
            ImportStatus::Streaming => STREAMING,
            ImportStatus::Done => DONE,
            ImportStatus::Error(_) => ERROR,
            ImportStatus::Aborted => ABORTED,
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStatus::Idle => f.write_str("idle"),
            ImportStatus::Initializing => f.write_str("initializing"),
            ImportStatus::Streaming => f.write_str("streaming"),
            ImportStatus::Done => f.write_str("done"),
            ImportStatus::Error(message) => write!(f, "error: {message}"),
            ImportStatus::Aborted => f.write_str("aborted"),
        }
    }
}

const IDLE: u8 = 0;
const INITIALIZING: u8 = 1;
const STREAMING: u8 = 2;
const DONE: u8 = 3;
const ERROR: u8 = 4;
const ABORTED: u8 = 5;

/// Point-in-time view of an import, readable from any thread.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub status: ImportStatus,
    /// Fraction of samples decoded, in `[0, 1]`.
    pub progress: f32,
}

impl StatusSnapshot {
    pub fn is_done(&self) -> bool {
        self.status == ImportStatus::Done
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, ImportStatus::Error(_))
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            ImportStatus::Error(message) => Some(message.as_str()),
            _ => None,
        }
    }
}

/// Shared status storage.
///
/// The phase and progress are plain atomics. The error message is written
/// before the phase is published with release ordering, so a reader that
/// observes `Error` also observes its message.
#[derive(Debug, Default)]
pub(crate) struct StatusCell {
    state: AtomicU8,
    /// `f32` bits. Non-negative floats order like their bit patterns, so
    /// `fetch_max` keeps progress monotonic.
    progress: AtomicU32,
    error: Mutex<Option<String>>,
}

impl StatusCell {
    pub(crate) fn reset(&self) {
        self.set_error_message(None);
        self.progress.store(0f32.to_bits(), Ordering::Release);
        self.state.store(INITIALIZING, Ordering::Release);
    }

    pub(crate) fn set(&self, status: ImportStatus) {
        let code = status.code();
        if let ImportStatus::Error(message) = status {
            self.set_error_message(Some(message));
            self.advance_progress(1.0);
        }
        if code == DONE {
            self.advance_progress(1.0);
        }
        self.state.store(code, Ordering::Release);
    }

    /// Raise progress to `fraction`; lower values are ignored.
    pub(crate) fn advance_progress(&self, fraction: f32) {
        let clamped = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        self.progress
            .fetch_max(clamped.to_bits(), Ordering::AcqRel);
    }

    pub(crate) fn progress(&self) -> f32 {
        f32::from_bits(self.progress.load(Ordering::Acquire))
    }

    pub(crate) fn status(&self) -> ImportStatus {
        match self.state.load(Ordering::Acquire) {
            INITIALIZING => ImportStatus::Initializing,
            STREAMING => ImportStatus::Streaming,
            DONE => ImportStatus::Done,
            ERROR => ImportStatus::Error(self.error_message().unwrap_or_default()),
            ABORTED => ImportStatus::Aborted,
            _ => ImportStatus::Idle,
        }
    }

    pub(crate) fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status(),
            progress: self.progress(),
        }
    }

    fn error_message(&self) -> Option<String> {
        match self.error.lock() {
            Ok(error) => error.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_error_message(&self, message: Option<String>) {
        match self.error.lock() {
            Ok(mut error) => *error = message,
            Err(poisoned) => *poisoned.into_inner() = message,
        }
    }
}

/// Cloneable read-only view of an importer's status for other threads.
#[derive(Clone, Debug)]
pub struct StatusHandle {
    pub(crate) cell: Arc<StatusCell>,
}

impl StatusHandle {
    pub fn status(&self) -> ImportStatus {
        self.cell.status()
    }

    pub fn progress(&self) -> f32 {
        self.cell.progress()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.cell.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_with_no_progress() {
        let cell = StatusCell::default();
        assert_eq!(
            cell.snapshot(),
            StatusSnapshot {
                status: ImportStatus::Idle,
                progress: 0.0,
            }
        );
    }

    #[test]
    fn progress_never_moves_backwards() {
        let cell = StatusCell::default();
        cell.advance_progress(0.5);
        cell.advance_progress(0.25);
        assert_eq!(cell.progress(), 0.5);
        cell.advance_progress(3.0);
        assert_eq!(cell.progress(), 1.0);
    }

    #[test]
    fn error_carries_message_and_completes_progress() {
        let cell = StatusCell::default();
        cell.reset();
        cell.set(ImportStatus::Error("unsupported format".into()));
        let snapshot = cell.snapshot();
        assert!(snapshot.is_error());
        assert_eq!(snapshot.error(), Some("unsupported format"));
        assert_eq!(snapshot.progress, 1.0);
    }

    #[test]
    fn reset_clears_previous_error() {
        let cell = StatusCell::default();
        cell.set(ImportStatus::Error("boom".into()));
        cell.reset();
        assert_eq!(cell.status(), ImportStatus::Initializing);
        assert_eq!(cell.progress(), 0.0);
    }

    #[test]
    fn terminal_states() {
        assert!(ImportStatus::Done.is_terminal());
        assert!(ImportStatus::Aborted.is_terminal());
        assert!(ImportStatus::Error(String::new()).is_terminal());
        assert!(!ImportStatus::Streaming.is_terminal());
        assert!(!ImportStatus::Idle.is_terminal());
    }
}
