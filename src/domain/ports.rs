use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Fully resolved command for one job: driver program, arguments, child
/// environment and working directory. Built by dispatch, consumed by a
/// runner backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecPlan {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
}

/// Raw result of executing a plan. The engine turns this into a
/// JobOutcome once the log has been persisted.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub output: Vec<u8>,
    pub timed_out: bool,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

pub trait Workspace: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Execute the plan, capturing combined stdout/stderr. A non-zero
    /// exit is an ordinary ExecResult; Err is reserved for spawn and IO
    /// failures.
    async fn run(&self, plan: &ExecPlan) -> Result<ExecResult>;

    /// Isolation method name ("local", "docker").
    fn method(&self) -> &str;
}
