// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod queue;
pub mod result;

// Re-exports
pub use error::DomainError;
pub use job::{Job, JobId, JobKind, JobPayload, JobState, JD_FIELD, RESUME_FIELD};
pub use queue::{route, Route};
pub use result::{
    CoverLetterReport, DocumentKind, EnhanceReport, JobResult, MatchReport, ResultDocument,
    StatusReport, TaskOutcome,
};
