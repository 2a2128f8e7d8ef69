pub mod docker;
pub mod local;

pub use docker::DockerRunner;
pub use local::LocalRunner;

use crate::config::matrix_config::MatrixConfig;
use crate::domain::ports::JobRunner;
use crate::utils::error::{CiError, Result};
use std::time::Duration;

/// Map the configured isolation method name to a backend, the dispatch
/// table pattern for connection methods.
pub fn runner_for(config: &MatrixConfig) -> Result<Box<dyn JobRunner>> {
    let timeout = config.timeout_seconds().map(Duration::from_secs);

    match config.isolation() {
        "local" => Ok(Box::new(LocalRunner::new(timeout))),
        "docker" => {
            let runner_cfg = config.runner.as_ref();
            Ok(Box::new(DockerRunner::new(
                runner_cfg
                    .and_then(|r| r.images.clone())
                    .unwrap_or_default(),
                runner_cfg.and_then(|r| r.default_image.clone()),
                timeout,
            )))
        }
        method => Err(CiError::InvalidConfigValueError {
            field: "runner.isolation".to_string(),
            value: method.to_string(),
            reason: "Valid methods: local, docker".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_for_maps_methods() {
        let config = MatrixConfig::from_toml_str(
            r#"
[matrix]
name = "m"
env = ["MODE=unit"]

[runner]
isolation = "docker"
"#,
        )
        .unwrap();

        assert_eq!(runner_for(&config).unwrap().method(), "docker");
    }

    #[test]
    fn test_runner_for_defaults_to_local() {
        let config = MatrixConfig::from_toml_str(
            r#"
[matrix]
name = "m"
env = ["MODE=unit"]
"#,
        )
        .unwrap();

        assert_eq!(runner_for(&config).unwrap().method(), "local");
    }
}
