// ABOUTME: Audio decoder trait and implementations
// ABOUTME: Only uncompressed PCM is decoded; compressed codecs are rejected at stream start

/// PCM decoder implementation
pub mod pcm;

pub use pcm::{PcmDecoder, PcmEndian};

use crate::audio::Sample;
use crate::error::Error;
use std::sync::Arc;

/// Turns a raw audio chunk payload into interleaved samples.
pub trait Decoder: Send {
    /// Decode one chunk.
    fn decode(&self, data: &[u8]) -> Result<Arc<[Sample]>, Error>;
}
