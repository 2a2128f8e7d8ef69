use thiserror::Error;

#[derive(Error, Debug)]
pub enum CiError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Webhook request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV report error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("No test driver for mode '{mode}' under {scripts_dir} (tried {mode}_tests.sh and {mode}_tests.py)")]
    ScriptNotFound { mode: String, scripts_dir: String },

    #[error("Dependency installation failed for {interpreter}: {message}")]
    InstallError {
        interpreter: String,
        message: String,
    },

    #[error("Job execution error: {message}")]
    ExecutionError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Execution,
    Io,
    Network,
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CiError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CiError::ConfigValidationError { .. }
            | CiError::InvalidConfigValueError { .. }
            | CiError::MissingConfigError { .. } => ErrorCategory::Configuration,
            CiError::ScriptNotFound { .. }
            | CiError::InstallError { .. }
            | CiError::ExecutionError { .. } => ErrorCategory::Execution,
            CiError::HttpError(_) => ErrorCategory::Network,
            CiError::ZipError(_) | CiError::CsvError(_) | CiError::SerializationError(_) => {
                ErrorCategory::Report
            }
            CiError::IoError(_) => ErrorCategory::Io,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Notification failures never fail a run
            CiError::HttpError(_) => ErrorSeverity::Low,
            CiError::ZipError(_) | CiError::CsvError(_) | CiError::SerializationError(_) => {
                ErrorSeverity::Medium
            }
            CiError::ScriptNotFound { .. }
            | CiError::ExecutionError { .. }
            | CiError::IoError(_) => ErrorSeverity::High,
            CiError::ConfigValidationError { .. }
            | CiError::InvalidConfigValueError { .. }
            | CiError::MissingConfigError { .. }
            | CiError::InstallError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            CiError::ConfigValidationError { field, .. }
            | CiError::MissingConfigError { field } => {
                format!("Check the '{}' section of your matrix file", field)
            }
            CiError::InvalidConfigValueError { field, .. } => {
                format!("Fix the value of '{}' in your matrix file", field)
            }
            CiError::ScriptNotFound { mode, scripts_dir } => format!(
                "Create {dir}/{mode}_tests.sh or {dir}/{mode}_tests.py, or remove the '{mode}' axis entry",
                dir = scripts_dir,
                mode = mode
            ),
            CiError::InstallError { interpreter, .. } => format!(
                "Run '{} -m pip install -r <requirements>' manually to see the full error",
                interpreter
            ),
            CiError::ExecutionError { .. } => {
                "Re-run with --verbose and inspect the job log files".to_string()
            }
            CiError::HttpError(_) => "Check the webhook URL and network connectivity".to_string(),
            CiError::ZipError(_) | CiError::CsvError(_) | CiError::SerializationError(_) => {
                "Check that the report directory is writable".to_string()
            }
            CiError::IoError(_) => {
                "Check file permissions and that all configured paths exist".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Execution => format!("Execution problem: {}", self),
            ErrorCategory::Network => format!("Network problem: {}", self),
            ErrorCategory::Report => format!("Report problem: {}", self),
            ErrorCategory::Io => format!("File system problem: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, CiError>;
