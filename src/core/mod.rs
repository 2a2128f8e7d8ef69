pub mod dispatch;
pub mod engine;
pub mod install;
pub mod matrix;
pub mod notify;
pub mod report;

pub use crate::domain::model::{Job, JobOutcome, JobStatus, RunSummary};
pub use crate::domain::ports::{ExecPlan, ExecResult, JobRunner, Workspace};
pub use crate::utils::error::Result;
