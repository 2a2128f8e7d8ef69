use clap::Parser;
use small_ci::core::{notify, report};
use small_ci::utils::{logger, validation::Validate};
use small_ci::{CliConfig, LocalWorkspace, MatrixConfig, RunEngine, RunOptions};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    logger::init_cli_logger(cli.verbose);

    tracing::info!("Starting small-ci");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let config = match MatrixConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load matrix file '{}': {}", cli.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let options = RunOptions {
        mode_filter: cli.mode.clone(),
        interpreter_filter: cli.interpreter.clone(),
        parallelism_override: cli.jobs,
        no_install: cli.no_install,
        dry_run: cli.dry_run,
    };

    let monitor_enabled = cli.monitor || config.monitoring_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let workspace = LocalWorkspace::new(config.report_dir().to_string());
    let runner = match small_ci::runner_for(&config) {
        Ok(runner) => Arc::from(runner),
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    let engine =
        RunEngine::new(config.clone(), options, runner, workspace.clone()).with_monitoring(monitor_enabled);

    if cli.list {
        let jobs = match engine.selected_jobs() {
            Ok(jobs) => jobs,
            Err(e) => {
                eprintln!("❌ {}", e.user_friendly_message());
                std::process::exit(1);
            }
        };
        println!("{} job(s):", jobs.len());
        for job in jobs {
            let marker = if job.allow_failure { " (allow_failure)" } else { "" };
            println!("  [{:03}] {}{}", job.index, job.display_name(), marker);
        }
        return Ok(());
    }

    match engine.run().await {
        Ok(summary) => {
            // Reports are written for failed runs too
            match report::write_reports(&workspace, &summary, &config.report_formats()).await {
                Ok(written) => {
                    for file in &written {
                        tracing::info!("📁 Report written: {}/{}", workspace.base_path(), file);
                    }
                    if cli.archive {
                        match report::archive_artifacts(
                            &workspace,
                            &summary,
                            &written,
                            config.archive_filename(),
                        )
                        .await
                        {
                            Ok(archive) => tracing::info!(
                                "📦 Artifacts archived: {}/{}",
                                workspace.base_path(),
                                archive
                            ),
                            Err(e) => tracing::error!("❌ Could not archive artifacts: {}", e),
                        }
                    }
                }
                Err(e) => tracing::error!("❌ Could not write reports: {}", e),
            }

            if let Some(notify_cfg) = &config.notify {
                if let Err(e) = notify::send_webhook(notify_cfg, &summary).await {
                    tracing::warn!("⚠️ Webhook notification failed: {}", e);
                    tracing::warn!("💡 {}", e.recovery_suggestion());
                }
            }

            if summary.is_success() {
                println!(
                    "✅ Matrix run passed: {}/{} job(s) ok",
                    summary.passed, summary.total_jobs
                );
            } else {
                eprintln!(
                    "❌ Matrix run failed: {} of {} job(s) failed",
                    summary.failed, summary.total_jobs
                );
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ Matrix run aborted: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                small_ci::utils::error::ErrorSeverity::Low => 0,
                small_ci::utils::error::ErrorSeverity::Medium => 2,
                small_ci::utils::error::ErrorSeverity::High => 1,
                small_ci::utils::error::ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
