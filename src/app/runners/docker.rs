use crate::app::runners::local::execute_plan;
use crate::domain::ports::{ExecPlan, ExecResult, JobRunner};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const FALLBACK_IMAGE: &str = "debian:stable";

/// Runs job commands inside a disposable Docker container. The build dir
/// is bind-mounted read-write and used as the container workdir, so the
/// driver scripts see the same tree a local run would.
pub struct DockerRunner {
    /// DISTRO value -> image name.
    images: HashMap<String, String>,
    default_image: String,
    docker_path: String,
    timeout: Option<Duration>,
}

impl DockerRunner {
    pub fn new(
        images: HashMap<String, String>,
        default_image: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            images,
            default_image: default_image.unwrap_or_else(|| FALLBACK_IMAGE.to_string()),
            docker_path: "docker".to_string(),
            timeout,
        }
    }

    pub fn with_docker_path(mut self, path: String) -> Self {
        self.docker_path = path;
        self
    }

    /// Image for a plan: the DISTRO variable wins, else the first token
    /// of DISTROS, else the configured default.
    fn image_for(&self, plan: &ExecPlan) -> String {
        let distro = plan
            .env
            .get("DISTRO")
            .cloned()
            .or_else(|| {
                plan.env
                    .get("DISTROS")
                    .and_then(|d| d.split_whitespace().next().map(|s| s.to_string()))
            });

        match distro {
            Some(d) => self
                .images
                .get(&d)
                .cloned()
                .unwrap_or_else(|| self.default_image.clone()),
            None => self.default_image.clone(),
        }
    }

    /// Wrap the plan in `docker run --rm`. The container sees the build
    /// dir at /build and the job env via -e flags; the inner command is
    /// the original program and arguments, with host paths under the
    /// build dir rewritten to their /build equivalents.
    pub fn wrap_plan(&self, plan: &ExecPlan) -> ExecPlan {
        let build_dir = std::fs::canonicalize(&plan.cwd)
            .unwrap_or_else(|_| plan.cwd.clone())
            .display()
            .to_string();

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:/build", build_dir),
            "-w".to_string(),
            "/build".to_string(),
        ];

        for (key, value) in &plan.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(self.image_for(plan));
        args.push(translate_path(&plan.program, &build_dir));
        args.extend(plan.args.iter().map(|a| translate_path(a, &build_dir)));

        ExecPlan {
            program: self.docker_path.clone(),
            args,
            // The docker client itself needs no job environment
            env: std::collections::BTreeMap::new(),
            cwd: plan.cwd.clone(),
        }
    }
}

/// Only the build dir is mounted, so a host path under it maps to the
/// /build mount point; anything else passes through untouched.
fn translate_path(arg: &str, build_dir: &str) -> String {
    match Path::new(arg).strip_prefix(build_dir) {
        Ok(rest) => Path::new("/build").join(rest).display().to_string(),
        Err(_) => arg.to_string(),
    }
}

#[async_trait]
impl JobRunner for DockerRunner {
    async fn run(&self, plan: &ExecPlan) -> Result<ExecResult> {
        let wrapped = self.wrap_plan(plan);
        tracing::debug!("Docker invocation: {} {}", wrapped.program, wrapped.args.join(" "));
        execute_plan(&wrapped, self.timeout).await
    }

    fn method(&self) -> &str {
        "docker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn plan_with_env(env: &[(&str, &str)]) -> ExecPlan {
        ExecPlan {
            program: "sh".to_string(),
            args: vec![".ci/ansible_tests.sh".to_string()],
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            cwd: PathBuf::from("/tmp"),
        }
    }

    fn runner() -> DockerRunner {
        let mut images = HashMap::new();
        images.insert("centos7".to_string(), "centos:7".to_string());
        images.insert("debian9".to_string(), "debian:9".to_string());
        DockerRunner::new(images, Some("ubuntu:22.04".to_string()), None)
    }

    #[test]
    fn test_image_selection_by_distro() {
        let r = runner();
        assert_eq!(r.image_for(&plan_with_env(&[("DISTRO", "centos7")])), "centos:7");
    }

    #[test]
    fn test_image_selection_uses_first_of_distros() {
        let r = runner();
        assert_eq!(
            r.image_for(&plan_with_env(&[("DISTROS", "debian9 centos7")])),
            "debian:9"
        );
    }

    #[test]
    fn test_image_selection_falls_back_to_default() {
        let r = runner();
        assert_eq!(r.image_for(&plan_with_env(&[])), "ubuntu:22.04");
        assert_eq!(
            r.image_for(&plan_with_env(&[("DISTRO", "unknown")])),
            "ubuntu:22.04"
        );
    }

    #[test]
    fn test_wrap_plan_maps_build_dir_paths_to_mount() {
        let r = runner();
        let build = tempfile::TempDir::new().unwrap();
        let build_dir = std::fs::canonicalize(build.path()).unwrap();

        let mut plan = plan_with_env(&[("MODE", "ansible")]);
        plan.cwd = build_dir.clone();
        plan.args = vec![build_dir.join(".ci/ansible_tests.sh").display().to_string()];

        let wrapped = r.wrap_plan(&plan);
        assert_eq!(wrapped.args.last().unwrap(), "/build/.ci/ansible_tests.sh");
        // The program is not under the build dir and passes through
        assert!(wrapped.args.contains(&"sh".to_string()));
    }

    #[test]
    fn test_wrap_plan_shape() {
        let r = runner();
        let wrapped = r.wrap_plan(&plan_with_env(&[("DISTRO", "centos7"), ("MODE", "ansible")]));

        assert_eq!(wrapped.program, "docker");
        assert_eq!(wrapped.args[0], "run");
        assert_eq!(wrapped.args[1], "--rm");
        assert!(wrapped.args.contains(&"-w".to_string()));
        assert!(wrapped.args.contains(&"/build".to_string()));
        assert!(wrapped.args.contains(&"MODE=ansible".to_string()));
        assert!(wrapped.args.contains(&"DISTRO=centos7".to_string()));

        // Image comes before the inner command
        let image_pos = wrapped.args.iter().position(|a| a == "centos:7").unwrap();
        let cmd_pos = wrapped.args.iter().position(|a| a == "sh").unwrap();
        assert!(image_pos < cmd_pos);
        assert_eq!(wrapped.args.last().unwrap(), ".ci/ansible_tests.sh");
    }
}
