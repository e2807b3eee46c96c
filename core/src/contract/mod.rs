//! Request/completion contract and the topic transport it travels on.

pub mod messages;
pub mod transport;

pub use messages::*;
pub use transport::*;
