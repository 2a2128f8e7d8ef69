use crate::config::matrix_config::{IncludeEntry, JobMatcher, MatrixConfig};
use crate::domain::model::Job;
use crate::utils::error::{CiError, Result};
use std::collections::BTreeMap;

/// Interpreter used when the matrix declares no interpreter axis.
pub const DEFAULT_INTERPRETER: &str = "python";

/// Parse one environment axis entry ("MODE=ansible VER=2.10.0
/// DISTROS='centos6 centos7'") into ordered KEY=VALUE pairs. Values may
/// be single- or double-quoted to contain spaces.
pub fn parse_env_line(line: &str) -> Result<Vec<(String, String)>> {
    use regex::Regex;
    let re = Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)=(?:'([^']*)'|"([^"]*)"|(\S*))"#).unwrap();

    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut cursor = 0usize;

    for caps in re.captures_iter(line) {
        let whole = caps.get(0).unwrap();

        // Everything between tokens must be whitespace, otherwise the
        // entry contains something we silently dropped.
        if !line[cursor..whole.start()].trim().is_empty() {
            return Err(invalid_env_entry(line, "unparseable text between assignments"));
        }
        cursor = whole.end();

        let key = caps.get(1).unwrap().as_str().to_string();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        if pairs.iter().any(|(k, _)| k == &key) {
            return Err(invalid_env_entry(
                line,
                &format!("duplicate variable '{}'", key),
            ));
        }

        pairs.push((key, value));
    }

    if !line[cursor..].trim().is_empty() {
        return Err(invalid_env_entry(line, "trailing unparseable text"));
    }
    if pairs.is_empty() {
        return Err(invalid_env_entry(line, "no KEY=VALUE assignments found"));
    }

    Ok(pairs)
}

fn invalid_env_entry(line: &str, reason: &str) -> CiError {
    CiError::InvalidConfigValueError {
        field: "matrix.env".to_string(),
        value: line.to_string(),
        reason: reason.to_string(),
    }
}

/// Expand the configured matrix into concrete jobs: the interpreter x env
/// product in declaration order, minus [[exclude]] matches, plus
/// [[include]] entries, with [[allow_failures]] tags applied. Pure and
/// deterministic.
pub fn expand(config: &MatrixConfig) -> Result<Vec<Job>> {
    let interpreters: Vec<String> = match config.matrix.interpreters.as_deref() {
        Some([]) | None => vec![DEFAULT_INTERPRETER.to_string()],
        Some(list) => list.to_vec(),
    };

    let global_env = config.matrix.global_env.clone().unwrap_or_default();

    let mut jobs = Vec::new();

    for line in config.matrix.env.as_deref().unwrap_or(&[]) {
        let pairs = parse_env_line(line)?;
        for interpreter in &interpreters {
            jobs.push(build_job(&global_env, &pairs, interpreter, false, line)?);
        }
    }

    if let Some(excludes) = &config.exclude {
        jobs.retain(|job| !excludes.iter().any(|m| matches_job(m, job)));
    }

    for entry in config.include.as_deref().unwrap_or(&[]) {
        jobs.push(expand_include(&global_env, &interpreters, entry)?);
    }

    if let Some(allowed) = &config.allow_failures {
        for job in &mut jobs {
            if allowed.iter().any(|m| matches_job(m, job)) {
                job.allow_failure = true;
            }
        }
    }

    for (index, job) in jobs.iter_mut().enumerate() {
        job.index = index;
    }

    Ok(jobs)
}

fn expand_include(
    global_env: &std::collections::HashMap<String, String>,
    interpreters: &[String],
    entry: &IncludeEntry,
) -> Result<Job> {
    let pairs = parse_env_line(&entry.env)?;
    let interpreter = entry
        .interpreter
        .as_deref()
        .unwrap_or_else(|| interpreters[0].as_str());
    build_job(
        global_env,
        &pairs,
        interpreter,
        entry.allow_failure.unwrap_or(false),
        &entry.env,
    )
}

fn build_job(
    global_env: &std::collections::HashMap<String, String>,
    pairs: &[(String, String)],
    interpreter: &str,
    allow_failure: bool,
    source_line: &str,
) -> Result<Job> {
    let mut env: BTreeMap<String, String> = global_env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (key, value) in pairs {
        env.insert(key.clone(), value.clone());
    }

    let mode = env
        .get("MODE")
        .cloned()
        .ok_or_else(|| CiError::ConfigValidationError {
            field: "matrix.env".to_string(),
            message: format!("entry '{}' does not set MODE", source_line),
        })?;

    Ok(Job {
        index: 0,
        mode,
        interpreter: interpreter.to_string(),
        env,
        allow_failure,
    })
}

fn matches_job(matcher: &JobMatcher, job: &Job) -> bool {
    if let Some(mode) = &matcher.mode {
        if mode != &job.mode {
            return false;
        }
    }
    if let Some(interpreter) = &matcher.interpreter {
        if interpreter != &job.interpreter {
            return false;
        }
    }
    if let Some(env) = &matcher.env {
        for (key, value) in env {
            if job.env.get(key) != Some(value) {
                return false;
            }
        }
    }
    true
}

/// Apply CLI --mode / --interpreter filters. Job indices are preserved so
/// log names stay stable regardless of filtering.
pub fn filter_jobs(jobs: Vec<Job>, mode: Option<&str>, interpreter: Option<&str>) -> Vec<Job> {
    jobs.into_iter()
        .filter(|job| mode.map(|m| job.mode == m).unwrap_or(true))
        .filter(|job| interpreter.map(|i| job.interpreter == i).unwrap_or(true))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::matrix_config::MatrixConfig;

    fn config_from(toml_content: &str) -> MatrixConfig {
        MatrixConfig::from_toml_str(toml_content).unwrap()
    }

    #[test]
    fn test_parse_env_line_simple() {
        let pairs = parse_env_line("MODE=ansible VER=2.10.0").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("MODE".to_string(), "ansible".to_string()),
                ("VER".to_string(), "2.10.0".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_env_line_quoted_values() {
        let pairs = parse_env_line("MODE=debops_common DISTROS='centos6 centos7'").unwrap();
        assert_eq!(pairs[1].1, "centos6 centos7");

        let pairs = parse_env_line(r#"MODE=ansible STRATEGY="mitogen_linear""#).unwrap();
        assert_eq!(pairs[1].1, "mitogen_linear");
    }

    #[test]
    fn test_parse_env_line_empty_value() {
        let pairs = parse_env_line("MODE=mitogen VER=").unwrap();
        assert_eq!(pairs[1].1, "");
    }

    #[test]
    fn test_parse_env_line_rejects_duplicates() {
        assert!(parse_env_line("MODE=a MODE=b").is_err());
    }

    #[test]
    fn test_parse_env_line_rejects_garbage() {
        assert!(parse_env_line("MODE=a and then some").is_err());
        assert!(parse_env_line("   ").is_err());
        assert!(parse_env_line("2BAD=x").is_err());
    }

    #[test]
    fn test_expand_product_order() {
        let config = config_from(
            r#"
[matrix]
name = "m"
interpreters = ["python2.7", "python3.6"]
env = ["MODE=mitogen", "MODE=ansible VER=2.10.0"]
"#,
        );

        let jobs = expand(&config).unwrap();
        assert_eq!(jobs.len(), 4);
        // Axis rows in declaration order, interpreters within each row
        assert_eq!(jobs[0].display_name(), "mitogen/python2.7");
        assert_eq!(jobs[1].display_name(), "mitogen/python3.6");
        assert_eq!(jobs[2].display_name(), "ansible/python2.7");
        assert_eq!(jobs[3].display_name(), "ansible/python3.6");
        assert_eq!(jobs[3].env.get("VER").unwrap(), "2.10.0");
        assert_eq!(
            jobs.iter().map(|j| j.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_expand_without_interpreters_uses_default() {
        let config = config_from(
            r#"
[matrix]
name = "m"
env = ["MODE=unit"]
"#,
        );

        let jobs = expand(&config).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].interpreter, DEFAULT_INTERPRETER);
    }

    #[test]
    fn test_expand_global_env_is_overridden_by_axis() {
        let config = config_from(
            r#"
[matrix]
name = "m"
env = ["MODE=ansible STRATEGY=mitogen_linear"]

[matrix.global_env]
STRATEGY = "linear"
TZ = "UTC"
"#,
        );

        let jobs = expand(&config).unwrap();
        assert_eq!(jobs[0].env.get("STRATEGY").unwrap(), "mitogen_linear");
        assert_eq!(jobs[0].env.get("TZ").unwrap(), "UTC");
    }

    #[test]
    fn test_expand_exclude_removes_combination() {
        let config = config_from(
            r#"
[matrix]
name = "m"
interpreters = ["python2.7", "python3.6"]
env = ["MODE=mitogen", "MODE=ansible"]

[[exclude]]
mode = "ansible"
interpreter = "python2.7"
"#,
        );

        let jobs = expand(&config).unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(!jobs
            .iter()
            .any(|j| j.mode == "ansible" && j.interpreter == "python2.7"));
    }

    #[test]
    fn test_expand_exclude_matching_nothing_is_fine() {
        let config = config_from(
            r#"
[matrix]
name = "m"
env = ["MODE=unit"]

[[exclude]]
mode = "nonexistent"
"#,
        );

        assert_eq!(expand(&config).unwrap().len(), 1);
    }

    #[test]
    fn test_expand_include_appended_after_product() {
        let config = config_from(
            r#"
[matrix]
name = "m"
interpreters = ["python3.6"]
env = ["MODE=mitogen"]

[[include]]
env = "MODE=ansible VER=dev"
interpreter = "python3.7"
allow_failure = true
"#,
        );

        let jobs = expand(&config).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].mode, "ansible");
        assert_eq!(jobs[1].interpreter, "python3.7");
        assert!(jobs[1].allow_failure);
        assert_eq!(jobs[1].index, 1);
    }

    #[test]
    fn test_expand_allow_failures_by_env_value() {
        let config = config_from(
            r#"
[matrix]
name = "m"
interpreters = ["python3.6"]
env = ["MODE=ansible VER=2.10.0", "MODE=ansible VER=dev"]

[[allow_failures]]
[allow_failures.env]
VER = "dev"
"#,
        );

        let jobs = expand(&config).unwrap();
        assert!(!jobs[0].allow_failure);
        assert!(jobs[1].allow_failure);
    }

    #[test]
    fn test_expand_missing_mode_is_config_error() {
        let config = config_from(
            r#"
[matrix]
name = "m"
env = ["VER=2.10.0"]
"#,
        );

        let err = expand(&config).unwrap_err();
        assert!(err.to_string().contains("MODE"));
    }

    #[test]
    fn test_filter_jobs_preserves_indices() {
        let config = config_from(
            r#"
[matrix]
name = "m"
interpreters = ["python2.7", "python3.6"]
env = ["MODE=mitogen", "MODE=ansible"]
"#,
        );

        let jobs = expand(&config).unwrap();
        let filtered = filter_jobs(jobs, Some("ansible"), Some("python3.6"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].index, 3);
    }
}
