use small_ci::{LocalRunner, LocalWorkspace, MatrixConfig, RunEngine, RunOptions};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), format!("#!/bin/sh\n{}\n", body)).unwrap();
}

fn engine_for(
    config: MatrixConfig,
    report_dir: &Path,
    options: RunOptions,
) -> RunEngine<LocalWorkspace> {
    let workspace = LocalWorkspace::new(report_dir.to_str().unwrap().to_string());
    RunEngine::new(config, options, Arc::new(LocalRunner::new(None)), workspace)
}

#[tokio::test]
async fn test_end_to_end_matrix_run_with_real_scripts() {
    let scripts = TempDir::new().unwrap();
    let report = TempDir::new().unwrap();

    write_script(scripts.path(), "mitogen_tests.sh", "echo mitogen suite ok");
    write_script(scripts.path(), "ansible_tests.sh", "echo ansible suite ok");

    let config = MatrixConfig::from_toml_str(&format!(
        r#"
[matrix]
name = "mitogen"
interpreters = ["python2.7", "python3.6"]
env = ["MODE=mitogen", "MODE=ansible VER=2.10.0"]

[runner]
scripts_dir = "{}"
"#,
        scripts.path().display()
    ))
    .unwrap();

    let engine = engine_for(config, report.path(), RunOptions::default());
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.total_jobs, 4);
    assert_eq!(summary.passed, 4);
    assert!(summary.is_success());

    // Each job left a log with the script output
    for outcome in &summary.outcomes {
        let log_path = report.path().join(outcome.log_path.as_ref().unwrap());
        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("suite ok"));
    }
}

#[tokio::test]
async fn test_contract_env_vars_reach_the_driver() {
    let scripts = TempDir::new().unwrap();
    let report = TempDir::new().unwrap();
    let build = TempDir::new().unwrap();

    write_script(
        scripts.path(),
        "ansible_tests.sh",
        "echo MODE=$MODE VER=$VER STRATEGY=$STRATEGY BUILD=$TRAVIS_BUILD_DIR",
    );

    let config = MatrixConfig::from_toml_str(&format!(
        r#"
[matrix]
name = "env-contract"
interpreters = ["python3.6"]
env = ["MODE=ansible VER=2.10.0 STRATEGY=mitogen_linear"]

[runner]
scripts_dir = "{}"
build_dir = "{}"
"#,
        scripts.path().display(),
        build.path().display()
    ))
    .unwrap();

    let engine = engine_for(config, report.path(), RunOptions::default());
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.passed, 1);
    let log_path = report
        .path()
        .join(summary.outcomes[0].log_path.as_ref().unwrap());
    let content = std::fs::read_to_string(log_path).unwrap();
    assert!(content.contains("MODE=ansible"));
    assert!(content.contains("VER=2.10.0"));
    assert!(content.contains("STRATEGY=mitogen_linear"));
    let canonical_build = std::fs::canonicalize(build.path()).unwrap();
    assert!(content.contains(&format!("BUILD={}", canonical_build.display())));
}

#[tokio::test]
async fn test_relative_scripts_dir_with_separate_build_dir() {
    // Scripts live under the invocation directory, the build dir is
    // elsewhere; the driver must still be found and executed
    let scripts = TempDir::new_in(".").unwrap();
    let report = TempDir::new().unwrap();
    let build = TempDir::new().unwrap();

    write_script(scripts.path(), "demo_tests.sh", "echo ran in $PWD");

    let relative = scripts.path().file_name().unwrap().to_str().unwrap();
    let config = MatrixConfig::from_toml_str(&format!(
        r#"
[matrix]
name = "relative-scripts"
env = ["MODE=demo"]

[runner]
scripts_dir = "{}"
build_dir = "{}"
"#,
        relative,
        build.path().display()
    ))
    .unwrap();

    let engine = engine_for(config, report.path(), RunOptions::default());
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.passed, 1);
    let log_path = report
        .path()
        .join(summary.outcomes[0].log_path.as_ref().unwrap());
    let content = std::fs::read_to_string(log_path).unwrap();
    let canonical_build = std::fs::canonicalize(build.path()).unwrap();
    assert!(content.contains(&format!("ran in {}", canonical_build.display())));
}

#[tokio::test]
async fn test_failing_job_fails_the_run_but_all_jobs_execute() {
    let scripts = TempDir::new().unwrap();
    let report = TempDir::new().unwrap();

    write_script(scripts.path(), "good_tests.sh", "echo fine");
    write_script(scripts.path(), "bad_tests.sh", "echo broken >&2; exit 4");

    let config = MatrixConfig::from_toml_str(&format!(
        r#"
[matrix]
name = "partial"
env = ["MODE=good", "MODE=bad"]

[runner]
scripts_dir = "{}"
"#,
        scripts.path().display()
    ))
    .unwrap();

    let engine = engine_for(config, report.path(), RunOptions::default());
    let summary = engine.run().await.unwrap();

    assert!(!summary.is_success());
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 1);

    let failed = summary.outcomes.iter().find(|o| o.job.mode == "bad").unwrap();
    assert_eq!(failed.exit_code, Some(4));
    let log_path = report.path().join(failed.log_path.as_ref().unwrap());
    let content = std::fs::read_to_string(log_path).unwrap();
    assert!(content.contains("broken"));
}

#[tokio::test]
async fn test_allow_failure_job_does_not_fail_the_run() {
    let scripts = TempDir::new().unwrap();
    let report = TempDir::new().unwrap();

    write_script(scripts.path(), "stable_tests.sh", "exit 0");
    write_script(scripts.path(), "experimental_tests.sh", "exit 1");

    let config = MatrixConfig::from_toml_str(&format!(
        r#"
[matrix]
name = "allowed"
env = ["MODE=stable", "MODE=experimental"]

[runner]
scripts_dir = "{}"

[[allow_failures]]
mode = "experimental"
"#,
        scripts.path().display()
    ))
    .unwrap();

    let engine = engine_for(config, report.path(), RunOptions::default());
    let summary = engine.run().await.unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.failed_allowed, 1);
}

#[tokio::test]
async fn test_parallel_execution_completes_all_jobs() {
    let scripts = TempDir::new().unwrap();
    let report = TempDir::new().unwrap();

    for mode in ["a", "b", "c", "d"] {
        write_script(
            scripts.path(),
            &format!("{}_tests.sh", mode),
            &format!("sleep 0.1; echo {} done", mode),
        );
    }

    let config = MatrixConfig::from_toml_str(&format!(
        r#"
[matrix]
name = "parallel"
env = ["MODE=a", "MODE=b", "MODE=c", "MODE=d"]

[runner]
scripts_dir = "{}"
parallelism = 4
"#,
        scripts.path().display()
    ))
    .unwrap();

    let engine = engine_for(config, report.path(), RunOptions::default());
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.passed, 4);
    // Outcomes come back in matrix order even with concurrent execution
    let modes: Vec<&str> = summary.outcomes.iter().map(|o| o.job.mode.as_str()).collect();
    assert_eq!(modes, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_reports_written_for_failed_run() {
    let scripts = TempDir::new().unwrap();
    let report = TempDir::new().unwrap();

    write_script(scripts.path(), "bad_tests.sh", "exit 1");

    let config = MatrixConfig::from_toml_str(&format!(
        r#"
[matrix]
name = "reported"
env = ["MODE=bad"]

[runner]
scripts_dir = "{}"
"#,
        scripts.path().display()
    ))
    .unwrap();

    let workspace = LocalWorkspace::new(report.path().to_str().unwrap().to_string());
    let engine = engine_for(config.clone(), report.path(), RunOptions::default());
    let summary = engine.run().await.unwrap();
    assert!(!summary.is_success());

    let written =
        small_ci::core::report::write_reports(&workspace, &summary, &config.report_formats())
            .await
            .unwrap();
    assert_eq!(written.len(), 2);
    assert!(report.path().join("report.json").exists());
    assert!(report.path().join("report.csv").exists());

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report.path().join("report.json")).unwrap())
            .unwrap();
    assert_eq!(json["failed"], 1);
    assert_eq!(json["outcomes"][0]["status"], "failed");
}
