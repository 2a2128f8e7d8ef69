use crate::domain::model::Job;
use crate::domain::ports::ExecPlan;
use crate::utils::error::{CiError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Test driver resolved for a job's MODE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Driver {
    /// `<scripts_dir>/<mode>_tests.sh`, run via sh.
    Shell(PathBuf),
    /// `<scripts_dir>/<mode>_tests.py`, run via the job's interpreter.
    Python(PathBuf),
}

impl Driver {
    pub fn path(&self) -> &Path {
        match self {
            Driver::Shell(p) | Driver::Python(p) => p,
        }
    }
}

/// Resolves driver scripts and builds the concrete command for a job.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    scripts_dir: PathBuf,
    build_dir: PathBuf,
}

impl Dispatcher {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(scripts_dir: P, build_dir: Q) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            build_dir: build_dir.into(),
        }
    }

    /// The dispatch convention: `<mode>_tests.sh` wins when both drivers
    /// exist, `<mode>_tests.py` is the fallback. A relative scripts dir
    /// is resolved against the process cwd, but the driver runs from the
    /// build dir, so the returned path is always absolute.
    pub fn resolve_driver(&self, mode: &str) -> Result<Driver> {
        let shell = self.scripts_dir.join(format!("{}_tests.sh", mode));
        if shell.is_file() {
            return Ok(Driver::Shell(absolutize(shell)));
        }

        let python = self.scripts_dir.join(format!("{}_tests.py", mode));
        if python.is_file() {
            return Ok(Driver::Python(absolutize(python)));
        }

        Err(CiError::ScriptNotFound {
            mode: mode.to_string(),
            scripts_dir: self.scripts_dir.display().to_string(),
        })
    }

    /// Build the full command plan: driver program and arguments, the
    /// job's axis variables, and the build-dir contract variables.
    pub fn plan(&self, job: &Job) -> Result<ExecPlan> {
        let driver = self.resolve_driver(&job.mode)?;
        let env = self.job_env(job);

        let (program, args) = match &driver {
            Driver::Shell(path) => (
                "sh".to_string(),
                vec![path.display().to_string()],
            ),
            Driver::Python(path) => {
                let (program, mut args) = split_interpreter(&job.interpreter);
                args.push(path.display().to_string());
                (program, args)
            }
        };

        Ok(ExecPlan {
            program,
            args,
            env,
            cwd: self.build_dir.clone(),
        })
    }

    /// Child environment: the job's axis variables plus the build dir
    /// under both its compatibility name and the plain one. Runners
    /// layer this on top of the inherited process environment.
    fn job_env(&self, job: &Job) -> BTreeMap<String, String> {
        let mut env = job.env.clone();

        let build_dir = std::fs::canonicalize(&self.build_dir)
            .unwrap_or_else(|_| self.build_dir.clone())
            .display()
            .to_string();
        env.insert("TRAVIS_BUILD_DIR".to_string(), build_dir.clone());
        env.insert("BUILD_DIR".to_string(), build_dir);
        env.insert("MODE".to_string(), job.mode.clone());

        env
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

/// Interpreter settings may carry arguments ("python3 -u"); the first
/// whitespace-separated token is the program.
pub fn split_interpreter(interpreter: &str) -> (String, Vec<String>) {
    let mut parts = interpreter.split_whitespace();
    let program = parts.next().unwrap_or("python").to_string();
    let args = parts.map(|s| s.to_string()).collect();
    (program, args)
}
