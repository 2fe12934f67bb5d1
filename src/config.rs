use serde::Deserialize;
use tracing::{info, warn};

use crate::audio::DecoderBackend;

/// Interleaved samples moved per handoff unless configured otherwise.
pub const DEFAULT_CHUNK_SAMPLES: usize = 2048 * 128;

/// Import tuning.
///
/// Loaded from a `.env` file and the environment by [`Config::load`];
/// hosts with their own config file can deserialize it directly.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Forced decoder backend. `None` picks one per source.
    pub backend: Option<DecoderBackend>,
    /// Capacity of the reused chunk buffer, in interleaved samples.
    pub chunk_samples: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: None,
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
        }
    }
}

impl Config {
    /// Load configuration from `.env` (if present) and the environment.
    pub fn load() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            info!(path = %path.display(), "Loaded .env file");
        }
        Self::from_vars(
            std::env::var("CLIPSTREAM_BACKEND").ok(),
            std::env::var("CLIPSTREAM_CHUNK_SAMPLES").ok(),
        )
    }

    /// Build from raw variable values. Invalid values fall back to defaults.
    pub fn from_vars(backend: Option<String>, chunk_samples: Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = backend.filter(|v| !v.trim().is_empty()) {
            match raw.parse::<DecoderBackend>() {
                Ok(backend) => config.backend = Some(backend),
                Err(e) => warn!("Ignoring CLIPSTREAM_BACKEND: {e}"),
            }
        }

        if let Some(raw) = chunk_samples {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.chunk_samples = n,
                _ => warn!("Ignoring CLIPSTREAM_CHUNK_SAMPLES={raw}: expected a positive integer"),
            }
        }

        info!(
            backend = ?config.backend,
            chunk_samples = config.chunk_samples,
            "Import configuration"
        );
        config
    }
}
