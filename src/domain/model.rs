use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One concrete cell of the expanded test matrix.
///
/// `env` holds the raw axis variables (MODE, VER, DISTROS, STRATEGY, ...);
/// insertion order is not significant so a BTreeMap keeps job display and
/// report output stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub index: usize,
    pub mode: String,
    pub interpreter: String,
    pub env: BTreeMap<String, String>,
    pub allow_failure: bool,
}

impl Job {
    /// Stable human-readable name: "mode/interpreter" plus the distro
    /// selector when one is present.
    pub fn display_name(&self) -> String {
        let distro = self
            .env
            .get("DISTRO")
            .or_else(|| self.env.get("DISTROS"))
            .cloned();
        match distro {
            Some(d) => format!("{}/{}/{}", self.mode, self.interpreter, d),
            None => format!("{}/{}", self.mode, self.interpreter),
        }
    }

    /// Filename-safe identifier used for per-job log files.
    pub fn log_name(&self) -> String {
        let sanitized: String = self
            .display_name()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        format!("{:03}_{}.log", self.index, sanitized)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Passed,
    Failed,
    /// Failed, but the job was marked allow_failure in the matrix.
    FailedAllowed,
    Skipped,
}

impl JobStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Passed => "passed",
            JobStatus::Failed => "failed",
            JobStatus::FailedAllowed => "failed_allowed",
            JobStatus::Skipped => "skipped",
        }
    }
}

/// Result of running a single job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job: Job,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub log_path: Option<String>,
    pub driver: Option<String>,
}

/// Aggregate view over all job outcomes of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub matrix_name: String,
    pub execution_id: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub total_jobs: usize,
    pub passed: usize,
    pub failed: usize,
    pub failed_allowed: usize,
    pub skipped: usize,
    #[serde(with = "duration_millis")]
    pub total_duration: Duration,
    pub outcomes: Vec<JobOutcome>,
}

impl RunSummary {
    pub fn from_outcomes(
        matrix_name: String,
        execution_id: String,
        started_at: chrono::DateTime<chrono::Utc>,
        outcomes: Vec<JobOutcome>,
    ) -> Self {
        let total_duration = outcomes.iter().map(|o| o.duration).sum();
        Self {
            matrix_name,
            execution_id,
            started_at,
            total_jobs: outcomes.len(),
            passed: outcomes
                .iter()
                .filter(|o| o.status == JobStatus::Passed)
                .count(),
            failed: outcomes
                .iter()
                .filter(|o| o.status == JobStatus::Failed)
                .count(),
            failed_allowed: outcomes
                .iter()
                .filter(|o| o.status == JobStatus::FailedAllowed)
                .count(),
            skipped: outcomes
                .iter()
                .filter(|o| o.status == JobStatus::Skipped)
                .count(),
            total_duration,
            outcomes,
        }
    }

    /// Allowed failures never fail the run.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
