//! Typed requests for the `func` CLI.
//!
//! Only argument construction lives here; execution goes through
//! [`CommandExecutor`](crate::io::executor::CommandExecutor) and
//! [`ProcessLauncher`](crate::io::executor::ProcessLauncher).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::types::{BuilderKind, Target};
use crate::io::executor::{CommandRequest, LaunchRequest};

/// File `func create` must leave in the function directory.
pub const MANIFEST_FILE: &str = "func.yaml";

/// `func` invocations for one target directory.
#[derive(Debug, Clone, Copy)]
pub struct FuncCli<'a> {
    pub binary: &'a Path,
    pub target_dir: &'a Path,
    pub log_path: &'a Path,
}

impl<'a> FuncCli<'a> {
    pub fn new(binary: &'a Path, target_dir: &'a Path, log_path: &'a Path) -> Self {
        Self {
            binary,
            target_dir,
            log_path,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.target_dir.join(MANIFEST_FILE)
    }

    /// `func create <dir> --language <l> --template <t> --repository <uri>`.
    pub fn create(&self, target: &Target, repository: &str, timeout: Duration) -> CommandRequest {
        self.request(
            vec![
                "create".to_string(),
                self.target_dir.display().to_string(),
                "--language".to_string(),
                target.language.clone(),
                "--template".to_string(),
                target.template.clone(),
                "--repository".to_string(),
                repository.to_string(),
            ],
            timeout,
        )
    }

    /// `func build --builder <kind> --registry <registry>`.
    pub fn build(&self, builder: BuilderKind, registry: &str, timeout: Duration) -> CommandRequest {
        self.request(
            vec![
                "build".to_string(),
                "--builder".to_string(),
                builder.as_str().to_string(),
                "--registry".to_string(),
                registry.to_string(),
            ],
            timeout,
        )
    }

    /// `func run --build=false`, started in the background.
    pub fn run(&self) -> LaunchRequest {
        LaunchRequest {
            program: self.binary.to_path_buf(),
            args: vec!["run".to_string(), "--build=false".to_string()],
            workdir: self.target_dir.to_path_buf(),
            log_path: self.log_path.to_path_buf(),
        }
    }

    /// `func invoke --request-type <type>`.
    pub fn invoke(&self, request_type: &str, timeout: Duration) -> CommandRequest {
        self.request(
            vec![
                "invoke".to_string(),
                "--request-type".to_string(),
                request_type.to_string(),
            ],
            timeout,
        )
    }

    fn request(&self, args: Vec<String>, timeout: Duration) -> CommandRequest {
        CommandRequest {
            program: self.binary.to_path_buf(),
            args,
            workdir: self.target_dir.to_path_buf(),
            timeout,
            log_path: self.log_path.to_path_buf(),
        }
    }
}

/// Template repository URI for `func create --repository`.
pub fn repository_uri(root: &Path) -> String {
    format!("file://{}", root.display())
}
