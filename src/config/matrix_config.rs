use crate::utils::error::{CiError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    pub matrix: MatrixInfo,
    pub install: Option<InstallConfig>,
    pub runner: Option<RunnerConfig>,
    pub report: Option<ReportConfig>,
    pub notify: Option<NotifyConfig>,
    pub monitoring: Option<MonitoringConfig>,
    pub error_handling: Option<ErrorHandlingConfig>,
    pub include: Option<Vec<IncludeEntry>>,
    pub exclude: Option<Vec<JobMatcher>>,
    pub allow_failures: Option<Vec<JobMatcher>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixInfo {
    pub name: String,
    pub description: Option<String>,
    /// Interpreter axis, e.g. ["python2.7", "python3.6"]. Entries may
    /// carry arguments ("python3 -u").
    pub interpreters: Option<Vec<String>>,
    /// Environment axis: one entry per row, Travis style
    /// ("MODE=ansible VER=2.10.0 DISTROS='centos7 debian9'").
    pub env: Option<Vec<String>>,
    /// Variables applied to every job, overridden by per-row values.
    pub global_env: Option<HashMap<String, String>>,
}

/// An extra job appended after the interpreter x env product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncludeEntry {
    pub env: String,
    pub interpreter: Option<String>,
    pub allow_failure: Option<bool>,
}

/// Matches expanded jobs for [[exclude]] and [[allow_failures]]. All
/// present fields must match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMatcher {
    pub mode: Option<String>,
    pub interpreter: Option<String>,
    pub env: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Requirements file installed per distinct interpreter before any
    /// job runs (the dev_requirements.txt convention).
    pub requirements: Option<String>,
    pub packages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub scripts_dir: Option<String>,
    pub build_dir: Option<String>,
    /// "local" or "docker".
    pub isolation: Option<String>,
    /// DISTRO value -> container image.
    pub images: Option<HashMap<String, String>>,
    pub default_image: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub parallelism: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub output_path: Option<String>,
    pub formats: Option<Vec<String>>,
    pub archive_filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook_url: String,
    pub on_success: Option<bool>,
    pub on_failure: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
    pub system_stats: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    /// "continue" (default) or "fail_fast".
    pub on_job_failure: Option<String>,
}

impl MatrixConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(CiError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| CiError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replace ${VAR} references with values from the process environment.
    /// Unset variables are left verbatim so validation can point at them.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").unwrap();

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("matrix.name", &self.matrix.name)?;

        let axis_len = self.matrix.env.as_ref().map(|e| e.len()).unwrap_or(0);
        let include_len = self.include.as_ref().map(|i| i.len()).unwrap_or(0);
        if axis_len == 0 && include_len == 0 {
            return Err(CiError::MissingConfigError {
                field: "matrix.env".to_string(),
            });
        }

        if let Some(global_env) = &self.matrix.global_env {
            for name in global_env.keys() {
                validation::validate_env_name("matrix.global_env", name)?;
            }
        }

        if let Some(runner) = &self.runner {
            if let Some(isolation) = &runner.isolation {
                let valid_methods = ["local", "docker"];
                if !valid_methods.contains(&isolation.as_str()) {
                    return Err(CiError::InvalidConfigValueError {
                        field: "runner.isolation".to_string(),
                        value: isolation.clone(),
                        reason: format!(
                            "Unsupported isolation method. Valid methods: {}",
                            valid_methods.join(", ")
                        ),
                    });
                }
            }
            if let Some(scripts_dir) = &runner.scripts_dir {
                validation::validate_path("runner.scripts_dir", scripts_dir)?;
            }
            if let Some(parallelism) = runner.parallelism {
                validation::validate_positive_number("runner.parallelism", parallelism, 1)?;
            }
        }

        if let Some(report) = &self.report {
            let valid_formats = ["json", "csv"];
            for format in report.formats.as_deref().unwrap_or(&[]) {
                if !valid_formats.contains(&format.as_str()) {
                    return Err(CiError::InvalidConfigValueError {
                        field: "report.formats".to_string(),
                        value: format.clone(),
                        reason: format!(
                            "Unsupported format. Valid formats: {}",
                            valid_formats.join(", ")
                        ),
                    });
                }
            }
        }

        if let Some(notify) = &self.notify {
            validation::validate_url("notify.webhook_url", &notify.webhook_url)?;
        }

        if let Some(handling) = &self.error_handling {
            if let Some(policy) = &handling.on_job_failure {
                if policy != "continue" && policy != "fail_fast" {
                    return Err(CiError::InvalidConfigValueError {
                        field: "error_handling.on_job_failure".to_string(),
                        value: policy.clone(),
                        reason: "Valid policies: continue, fail_fast".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn scripts_dir(&self) -> &str {
        self.runner
            .as_ref()
            .and_then(|r| r.scripts_dir.as_deref())
            .unwrap_or(".ci")
    }

    pub fn build_dir(&self) -> &str {
        self.runner
            .as_ref()
            .and_then(|r| r.build_dir.as_deref())
            .unwrap_or(".")
    }

    pub fn isolation(&self) -> &str {
        self.runner
            .as_ref()
            .and_then(|r| r.isolation.as_deref())
            .unwrap_or("local")
    }

    pub fn parallelism(&self) -> usize {
        self.runner
            .as_ref()
            .and_then(|r| r.parallelism)
            .unwrap_or(1)
    }

    pub fn timeout_seconds(&self) -> Option<u64> {
        self.runner.as_ref().and_then(|r| r.timeout_seconds)
    }

    pub fn report_dir(&self) -> &str {
        self.report
            .as_ref()
            .and_then(|r| r.output_path.as_deref())
            .unwrap_or("./ci-report")
    }

    pub fn report_formats(&self) -> Vec<String> {
        self.report
            .as_ref()
            .and_then(|r| r.formats.clone())
            .unwrap_or_else(|| vec!["json".to_string(), "csv".to_string()])
    }

    pub fn archive_filename(&self) -> &str {
        self.report
            .as_ref()
            .and_then(|r| r.archive_filename.as_deref())
            .unwrap_or("ci-artifacts.zip")
    }

    pub fn fail_fast(&self) -> bool {
        self.error_handling
            .as_ref()
            .and_then(|h| h.on_job_failure.as_deref())
            == Some("fail_fast")
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }
}

impl Validate for MatrixConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
