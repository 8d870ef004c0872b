// Workflow Automation Engine
//
// Tag/status/event triggered workflows for the InspectOS dashboard.
// Runs execute their action pipeline sequentially and can suspend on a
// wait, persisting a checkpoint that the run sweep resumes later.

pub mod conditions;
pub mod engine;
pub mod executor;
pub mod lead_conversion;
pub mod postgres;
pub mod store;
pub mod triggers;

use thiserror::Error;

use crate::database::StoreError;

pub use engine::{ResumeReport, RunTarget, WorkflowEngine};
pub use executor::{ActionExecutor, RunContext};
pub use postgres::{PgEntityStore, PgWorkflowStore};
pub use store::{EntityStore, WorkflowStore};
pub use triggers::TriggerContext;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An action hit a storage failure; the run was rescheduled or parked
    #[error("action {index} ({kind}) failed: {source}")]
    Action {
        index: usize,
        kind: String,
        #[source]
        source: StoreError,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;
