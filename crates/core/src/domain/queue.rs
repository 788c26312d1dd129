// Queue routing

use crate::domain::job::JobKind;

/// Logical queue for all language-model jobs
pub const LLM_QUEUE: &str = "llm";

/// Queue for model preload tasks
pub const WARMUP_QUEUE: &str = "warmup";

/// Task executing the agent pipeline
pub const RUN_AGENT_TASK: &str = "run_agent_job";

/// Task preloading the model
pub const WARMUP_TASK: &str = "warmup_model";

/// Queues a worker consumes by default
pub const DEFAULT_QUEUES: [&str; 2] = [LLM_QUEUE, WARMUP_QUEUE];

/// Routing decision for a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub task_name: &'static str,
    pub queue: &'static str,
    pub routing_key: String,
}

/// Compute the route for a job kind.
///
/// Depends on the kind only, so the decision never changes after submission.
pub fn route(kind: JobKind) -> Route {
    let (task_name, queue) = match kind {
        JobKind::Match | JobKind::Enhance | JobKind::CoverLetter => (RUN_AGENT_TASK, LLM_QUEUE),
        JobKind::Warmup => (WARMUP_TASK, WARMUP_QUEUE),
    };
    Route {
        task_name,
        queue,
        routing_key: format!("{}.{}", queue, kind.as_str()),
    }
}
