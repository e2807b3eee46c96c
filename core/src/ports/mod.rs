//! ports: boundary contracts of the external collaborators.
//!
//! The pipeline only ever talks to blobs, keys and crypto through these
//! traits. The local implementations back the tests and the worker binary.

pub mod blob;
pub mod keys;
pub mod crypto;
pub mod seal;

pub use blob::*;
pub use keys::*;
pub use crypto::*;
pub use seal::*;
