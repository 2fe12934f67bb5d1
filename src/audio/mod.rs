pub mod decoder;
pub mod http;
pub mod playback;
pub mod symphonia_decoder;
pub mod types;
pub mod wav;

pub use decoder::{initialize, shutdown, Decoder, DecoderBackend};
pub use http::HttpDecoder;
pub use playback::{PlayableClip, PlaybackFactory, Player};
pub use types::{AudioClip, ImportSource, StreamInfo};
