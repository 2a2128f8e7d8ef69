use crate::app::runners::local::execute_plan;
use crate::config::matrix_config::InstallConfig;
use crate::core::dispatch::split_interpreter;
use crate::domain::model::Job;
use crate::domain::ports::ExecPlan;
use crate::utils::error::{CiError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Install dependencies before any job runs: for each distinct
/// interpreter in the selected job set, `<interpreter> -m pip install -r
/// <requirements> [packages...]` in the build dir. A failure here aborts
/// the run.
pub async fn install_dependencies(
    install: &InstallConfig,
    jobs: &[Job],
    build_dir: &Path,
) -> Result<()> {
    let mut interpreters: Vec<&str> = Vec::new();
    for job in jobs {
        if !interpreters.contains(&job.interpreter.as_str()) {
            interpreters.push(&job.interpreter);
        }
    }

    let mut install_args: Vec<String> = vec![
        "-m".to_string(),
        "pip".to_string(),
        "install".to_string(),
    ];
    if let Some(requirements) = &install.requirements {
        install_args.push("-r".to_string());
        install_args.push(requirements.clone());
    }
    install_args.extend(install.packages.clone().unwrap_or_default());

    if install_args.len() == 3 {
        tracing::debug!("Install section present but empty, skipping");
        return Ok(());
    }

    for interpreter in interpreters {
        tracing::info!("📦 Installing dependencies for {}", interpreter);

        let (program, mut args) = split_interpreter(interpreter);
        args.extend(install_args.iter().cloned());

        let plan = ExecPlan {
            program,
            args,
            env: BTreeMap::new(),
            cwd: build_dir.to_path_buf(),
        };

        let result = execute_plan(&plan, None)
            .await
            .map_err(|e| CiError::InstallError {
                interpreter: interpreter.to_string(),
                message: e.to_string(),
            })?;

        if !result.success() {
            let output = String::from_utf8_lossy(&result.output);
            let tail: String = output
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(CiError::InstallError {
                interpreter: interpreter.to_string(),
                message: format!("exit code {:?}: {}", result.exit_code, tail),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn job(interpreter: &str) -> Job {
        let mut env = BTreeMap::new();
        env.insert("MODE".to_string(), "unit".to_string());
        Job {
            index: 0,
            mode: "unit".to_string(),
            interpreter: interpreter.to_string(),
            env,
            allow_failure: false,
        }
    }

    fn install_config(requirements: Option<&str>) -> InstallConfig {
        InstallConfig {
            requirements: requirements.map(|s| s.to_string()),
            packages: None,
        }
    }

    #[tokio::test]
    async fn test_install_success() {
        // `true` swallows the pip arguments and exits zero
        let dir = TempDir::new().unwrap();
        let jobs = vec![job("true"), job("true")];
        install_dependencies(
            &install_config(Some("dev_requirements.txt")),
            &jobs,
            dir.path(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_install_failure_aborts() {
        let dir = TempDir::new().unwrap();
        let jobs = vec![job("false")];
        let err = install_dependencies(
            &install_config(Some("dev_requirements.txt")),
            &jobs,
            dir.path(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CiError::InstallError { .. }));
    }

    #[tokio::test]
    async fn test_empty_install_section_is_a_noop() {
        let dir = TempDir::new().unwrap();
        // Interpreter does not exist, but nothing should be spawned
        let jobs = vec![job("no-such-interpreter-xyz")];
        install_dependencies(&install_config(None), &jobs, dir.path())
            .await
            .unwrap();
    }
}
