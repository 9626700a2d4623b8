//! The content pipeline: four status-driven stages, single passes recorded
//! as pipeline runs, and the daemon loop that repeats them.

pub mod daemon;
pub mod error;
pub mod pass;
pub mod pipeline;
pub mod report;
mod stages;

pub use daemon::run_daemon;
pub use error::{PipelineError, StageError};
pub use pass::{PassRunner, StageSelection, TriggerSource};
pub use pipeline::{BuildError, DefaultPipeline, Pipeline, PipelineSettings};
pub use report::{PassSummary, StageReport};
pub use stages::publish::publish_post;
