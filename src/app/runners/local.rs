use crate::domain::ports::{ExecPlan, ExecResult, JobRunner};
use crate::utils::error::{CiError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Runs job commands directly on the host via tokio::process.
pub struct LocalRunner {
    timeout: Option<Duration>,
}

impl LocalRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

/// Spawn the plan's command and wait for it, honoring an optional
/// timeout. kill_on_drop reaps the child when the timeout wins.
pub(crate) async fn execute_plan(plan: &ExecPlan, timeout: Option<Duration>) -> Result<ExecResult> {
    let mut command = Command::new(&plan.program);
    command
        .args(&plan.args)
        .envs(&plan.env)
        .current_dir(&plan.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(
        "Spawning: {} {} (cwd: {})",
        plan.program,
        plan.args.join(" "),
        plan.cwd.display()
    );

    let start = Instant::now();
    let output_future = command.output();

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, output_future).await {
            Ok(result) => result,
            Err(_) => {
                return Ok(ExecResult {
                    exit_code: None,
                    duration: start.elapsed(),
                    output: format!("*** job timed out after {:?} ***\n", limit).into_bytes(),
                    timed_out: true,
                });
            }
        },
        None => output_future.await,
    };

    let output = outcome.map_err(|e| CiError::ExecutionError {
        message: format!("failed to spawn '{}': {}", plan.program, e),
    })?;

    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);

    Ok(ExecResult {
        exit_code: output.status.code(),
        duration: start.elapsed(),
        output: combined,
        timed_out: false,
    })
}

#[async_trait]
impl JobRunner for LocalRunner {
    async fn run(&self, plan: &ExecPlan) -> Result<ExecResult> {
        execute_plan(plan, self.timeout).await
    }

    fn method(&self) -> &str {
        "local"
    }
}
