pub mod cli;
pub mod matrix_config;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "small-ci")]
#[command(about = "Run a CI test matrix locally")]
pub struct CliConfig {
    /// Path to the matrix configuration file
    #[arg(short, long, default_value = "ci-matrix.toml")]
    pub config: String,

    /// Only run jobs with this MODE
    #[arg(long)]
    pub mode: Option<String>,

    /// Only run jobs with this interpreter
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Number of jobs to run concurrently (overrides runner.parallelism)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Print the expanded job matrix and exit
    #[arg(long)]
    pub list: bool,

    /// Resolve drivers and show what would run without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the dependency installation step
    #[arg(long)]
    pub no_install: bool,

    /// Bundle report and job logs into a zip archive
    #[arg(long)]
    pub archive: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable system resource monitoring
    #[arg(long)]
    pub monitor: bool,
}
