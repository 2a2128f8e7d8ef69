use crate::config::matrix_config::MatrixConfig;
use crate::core::dispatch::Dispatcher;
use crate::core::{install, matrix};
use crate::domain::model::{Job, JobOutcome, JobStatus, RunSummary};
use crate::domain::ports::{JobRunner, Workspace};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Options resolved from the command line, narrowing and overriding the
/// configured matrix.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode_filter: Option<String>,
    pub interpreter_filter: Option<String>,
    pub parallelism_override: Option<usize>,
    pub no_install: bool,
    pub dry_run: bool,
}

/// Expands the matrix and drives job execution with bounded concurrency.
/// Jobs are independent; there is no data flow between them.
pub struct RunEngine<W: Workspace> {
    config: MatrixConfig,
    options: RunOptions,
    runner: Arc<dyn JobRunner>,
    workspace: W,
    monitor: Option<SystemMonitor>,
}

impl<W: Workspace + Clone + 'static> RunEngine<W> {
    pub fn new(
        config: MatrixConfig,
        options: RunOptions,
        runner: Arc<dyn JobRunner>,
        workspace: W,
    ) -> Self {
        Self {
            config,
            options,
            runner,
            workspace,
            monitor: None,
        }
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        if enabled {
            self.monitor = Some(SystemMonitor::new(true));
        }
        self
    }

    /// Expand and filter the matrix without executing anything.
    pub fn selected_jobs(&self) -> Result<Vec<Job>> {
        let jobs = matrix::expand(&self.config)?;
        Ok(matrix::filter_jobs(
            jobs,
            self.options.mode_filter.as_deref(),
            self.options.interpreter_filter.as_deref(),
        ))
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = chrono::Utc::now();
        let execution_id = format!("run-{}", started_at.format("%Y%m%d-%H%M%S"));

        let jobs = self.selected_jobs()?;
        tracing::info!(
            "🚀 Matrix '{}': {} job(s) selected via {} isolation",
            self.config.matrix.name,
            jobs.len(),
            self.runner.method()
        );

        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Run started");
        }

        if jobs.is_empty() {
            tracing::warn!("No jobs match the current filters");
            return Ok(RunSummary::from_outcomes(
                self.config.matrix.name.clone(),
                execution_id,
                started_at,
                Vec::new(),
            ));
        }

        self.run_install_step(&jobs).await?;

        let dispatcher = Dispatcher::new(self.config.scripts_dir(), self.config.build_dir());

        let outcomes = if self.options.dry_run {
            self.dry_run_outcomes(&dispatcher, jobs)
        } else {
            self.execute_jobs(&dispatcher, jobs).await?
        };

        if let Some(monitor) = &self.monitor {
            monitor.log_final_stats();
        }

        let summary = RunSummary::from_outcomes(
            self.config.matrix.name.clone(),
            execution_id,
            started_at,
            outcomes,
        );

        tracing::info!(
            "🏁 {} passed, {} failed, {} allowed failures, {} skipped ({:?})",
            summary.passed,
            summary.failed,
            summary.failed_allowed,
            summary.skipped,
            summary.total_duration
        );

        Ok(summary)
    }

    async fn run_install_step(&self, jobs: &[Job]) -> Result<()> {
        if self.options.no_install || self.options.dry_run {
            return Ok(());
        }
        // Docker images are expected to come provisioned
        if self.config.isolation() == "docker" {
            return Ok(());
        }
        let Some(install_cfg) = &self.config.install else {
            return Ok(());
        };

        install::install_dependencies(install_cfg, jobs, Path::new(self.config.build_dir())).await
    }

    /// Resolve every driver and report each job as skipped. Resolution
    /// failures surface the same way a real run would report them.
    fn dry_run_outcomes(&self, dispatcher: &Dispatcher, jobs: Vec<Job>) -> Vec<JobOutcome> {
        jobs.into_iter()
            .map(|job| match dispatcher.plan(&job) {
                Ok(plan) => {
                    tracing::info!(
                        "🔍 Would run {}: {} {}",
                        job.display_name(),
                        plan.program,
                        plan.args.join(" ")
                    );
                    JobOutcome {
                        driver: Some(format!("{} {}", plan.program, plan.args.join(" "))),
                        job,
                        status: JobStatus::Skipped,
                        exit_code: None,
                        duration: std::time::Duration::ZERO,
                        log_path: None,
                    }
                }
                Err(e) => {
                    tracing::error!("❌ {}: {}", job.display_name(), e);
                    let status = if job.allow_failure {
                        JobStatus::FailedAllowed
                    } else {
                        JobStatus::Failed
                    };
                    JobOutcome {
                        job,
                        status,
                        exit_code: None,
                        duration: std::time::Duration::ZERO,
                        log_path: None,
                        driver: None,
                    }
                }
            })
            .collect()
    }

    async fn execute_jobs(&self, dispatcher: &Dispatcher, jobs: Vec<Job>) -> Result<Vec<JobOutcome>> {
        let parallelism = self
            .options
            .parallelism_override
            .unwrap_or_else(|| self.config.parallelism())
            .max(1);
        let fail_fast = self.config.fail_fast();

        // Sequential execution keeps matrix order and gives fail-fast
        // exact semantics; the concurrent path is best-effort about which
        // jobs were already in flight.
        if parallelism == 1 {
            let mut outcomes = Vec::new();
            let mut aborted = false;
            for job in jobs {
                if aborted {
                    tracing::info!("⏭️ Skipping {} (fail-fast triggered)", job.display_name());
                    outcomes.push(JobOutcome {
                        job,
                        status: JobStatus::Skipped,
                        exit_code: None,
                        duration: std::time::Duration::ZERO,
                        log_path: None,
                        driver: None,
                    });
                    continue;
                }
                let outcome =
                    run_single_job(dispatcher, self.runner.as_ref(), &self.workspace, job).await;
                if fail_fast && outcome.status == JobStatus::Failed {
                    aborted = true;
                }
                outcomes.push(outcome);
            }
            return Ok(outcomes);
        }

        let semaphore = Arc::new(Semaphore::new(parallelism));
        let abort = Arc::new(AtomicBool::new(false));

        let mut tasks: JoinSet<JobOutcome> = JoinSet::new();

        for job in jobs {
            let semaphore = Arc::clone(&semaphore);
            let abort = Arc::clone(&abort);
            let runner = Arc::clone(&self.runner);
            let workspace = self.workspace.clone();
            let dispatcher = dispatcher.clone();

            tasks.spawn(async move {
                // Semaphore is never closed while tasks run
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");

                if abort.load(Ordering::SeqCst) {
                    tracing::info!("⏭️ Skipping {} (fail-fast triggered)", job.display_name());
                    return JobOutcome {
                        job,
                        status: JobStatus::Skipped,
                        exit_code: None,
                        duration: std::time::Duration::ZERO,
                        log_path: None,
                        driver: None,
                    };
                }

                let outcome = run_single_job(&dispatcher, runner.as_ref(), &workspace, job).await;

                if fail_fast && outcome.status == JobStatus::Failed {
                    abort.store(true, Ordering::SeqCst);
                }
                outcome
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    return Err(crate::utils::error::CiError::ExecutionError {
                        message: format!("job task panicked: {}", e),
                    })
                }
            }
        }

        // Report in matrix order regardless of completion order
        outcomes.sort_by_key(|o| o.job.index);
        Ok(outcomes)
    }
}

async fn run_single_job<W: Workspace>(
    dispatcher: &Dispatcher,
    runner: &dyn JobRunner,
    workspace: &W,
    job: Job,
) -> JobOutcome {
    let name = job.display_name();
    tracing::info!("▶️ Running {}", name);

    let plan = match dispatcher.plan(&job) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::error!("❌ {}: {}", name, e);
            let log_path = write_log(workspace, &job, e.to_string().as_bytes()).await;
            let status = failure_status(&job);
            return JobOutcome {
                job,
                status,
                exit_code: None,
                duration: std::time::Duration::ZERO,
                log_path,
                driver: None,
            };
        }
    };
    let driver = Some(format!("{} {}", plan.program, plan.args.join(" ")));

    match runner.run(&plan).await {
        Ok(result) => {
            let log_path = write_log(workspace, &job, &result.output).await;
            let status = if result.success() {
                tracing::info!("✅ {} passed ({:?})", name, result.duration);
                JobStatus::Passed
            } else {
                let reason = if result.timed_out {
                    "timed out".to_string()
                } else {
                    format!("exit code {:?}", result.exit_code)
                };
                if job.allow_failure {
                    tracing::warn!("⚠️ {} failed ({}) - failure allowed", name, reason);
                } else {
                    tracing::error!("❌ {} failed ({})", name, reason);
                }
                failure_status(&job)
            };
            JobOutcome {
                job,
                status,
                exit_code: result.exit_code,
                duration: result.duration,
                log_path,
                driver,
            }
        }
        Err(e) => {
            tracing::error!("❌ {}: {}", name, e);
            let log_path = write_log(workspace, &job, e.to_string().as_bytes()).await;
            let status = failure_status(&job);
            JobOutcome {
                job,
                status,
                exit_code: None,
                duration: std::time::Duration::ZERO,
                log_path,
                driver,
            }
        }
    }
}

fn failure_status(job: &Job) -> JobStatus {
    if job.allow_failure {
        JobStatus::FailedAllowed
    } else {
        JobStatus::Failed
    }
}

async fn write_log<W: Workspace>(workspace: &W, job: &Job, output: &[u8]) -> Option<String> {
    let rel_path = format!("logs/{}", job.log_name());
    match workspace.write_file(&rel_path, output).await {
        Ok(()) => Some(rel_path),
        Err(e) => {
            tracing::warn!("Could not write log for {}: {}", job.display_name(), e);
            None
        }
    }
}
