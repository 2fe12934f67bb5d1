pub mod audio;
pub mod config;
pub mod error;
pub mod import;

pub use config::Config;
pub use error::{ImportError, PlaybackError};
pub use import::{ClipFactory, ImportEvent, ImportStatus, Importer};
