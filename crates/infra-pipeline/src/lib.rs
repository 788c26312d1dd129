// JD Match Infrastructure - Pipeline Adapters
// Implements: ExecutionFunction (subprocess pipeline, stub pipeline)

pub mod stub;
pub mod subprocess;

pub use stub::StubPipeline;
pub use subprocess::{PipelineCommand, SubprocessPipeline, DEFAULT_ENV_ALLOWLIST};
