//! LSB bit-plane embedding and extraction.
//!
//! The only place that knows how payload bits are laid out in a carrier:
//! envelope bits, MSB first, one per raw carrier byte, starting at the
//! first byte of the first frame.

pub mod capacity;
pub mod embed;
pub mod envelope;
pub mod error;
pub mod extract;

pub use capacity::CapacityEstimate;
pub use embed::{embed_stream, BitEmbedder, FrameTransform};
pub use envelope::{EnvelopeBits, PayloadEnvelope};
pub use error::StegoError;
pub use extract::{extract_stream, BitExtractor};
