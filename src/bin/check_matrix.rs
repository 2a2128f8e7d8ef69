use anyhow::Result;
use clap::Parser;
use small_ci::core::matrix;
use small_ci::utils::{logger, validation::Validate};
use small_ci::MatrixConfig;

#[derive(Parser)]
#[command(name = "check-matrix")]
#[command(about = "Validate a matrix file and print the expanded jobs")]
struct Args {
    /// Path to the matrix configuration file
    #[arg(short, long, default_value = "ci-matrix.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    logger::init_cli_logger(args.verbose);

    tracing::info!("📁 Loading matrix file: {}", args.config);

    let config = match MatrixConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load matrix file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    let jobs = match matrix::expand(&config) {
        Ok(jobs) => jobs,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    println!("✅ Matrix '{}' is valid", config.matrix.name);
    if let Some(description) = &config.matrix.description {
        println!("   {}", description);
    }
    println!();
    println!("Isolation: {}", config.isolation());
    println!("Scripts:   {}", config.scripts_dir());
    println!("Jobs:      {}", jobs.len());
    println!();

    for job in &jobs {
        let marker = if job.allow_failure { " (allow_failure)" } else { "" };
        let env: Vec<String> = job
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        println!("[{:03}] {}{}", job.index, job.display_name(), marker);
        println!("      {}", env.join(" "));
    }

    Ok(())
}
