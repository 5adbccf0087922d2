pub mod errors;
pub mod logger;
pub mod types;

pub use errors::{EnqueueError, PipelineError, ResolveError, SinkError};
pub use types::SessionId;
