//! Pipeline orchestration.
//!
//! Every invocation owns one `ProcessGroup` and one thread scope. Stage
//! tasks are joined by OS pipes and bounded channels, so producers and
//! consumers overlap and backpressure flows end to end.

pub mod decode;
pub mod encode;
pub mod error;
pub mod io;
pub mod supervisor;

pub use decode::{run_decode_pipeline, ExtractReport};
pub use encode::{estimate_capacity, run_encode_pipeline, run_transform_pipeline, PipelineReport};
pub use error::PipelineError;
pub use io::{byte_channel, pump, read_frame, ChannelReader, ChannelWriter, InputSource};
pub use supervisor::CancelFlag;
