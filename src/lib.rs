pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalWorkspace, matrix_config::MatrixConfig};

pub use app::runners::{runner_for, DockerRunner, LocalRunner};
pub use core::engine::{RunEngine, RunOptions};
pub use utils::error::{CiError, Result};
