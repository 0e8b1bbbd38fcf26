//! Rebuilding a missing tool-server artifact.
//!
//! The build itself belongs to the tool server's project. This module only
//! runs whatever command produces the artifact and reports what happened.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::artifact;

/// Default bound on a rebuild command.
pub const DEFAULT_REBUILD_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a completed rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildOutcome {
    pub build_output: String,
    pub build_error: Option<String>,
    /// Whether the artifact exists after the build.
    pub artifact_exists: bool,
}

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("no rebuild command configured")]
    NotConfigured,

    #[error("failed to run `{command}`: {source}")]
    Exec {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` did not finish within {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` failed with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Produces the tool-server artifact on demand.
#[async_trait]
pub trait RebuildHook: Send + Sync {
    async fn rebuild(&self, artifact: &Path) -> Result<RebuildOutcome, RebuildError>;
}

/// Runs a build command, e.g. `pnpm build:mcp-server`.
#[derive(Debug, Clone)]
pub struct CommandRebuild {
    argv: Vec<String>,
    cwd: Option<PathBuf>,
    timeout: Duration,
}

impl CommandRebuild {
    /// `argv[0]` is the program. An empty argv fails with [`RebuildError::NotConfigured`].
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: None,
            timeout: DEFAULT_REBUILD_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    fn display(&self) -> String {
        self.argv.join(" ")
    }
}

#[async_trait]
impl RebuildHook for CommandRebuild {
    async fn rebuild(&self, artifact: &Path) -> Result<RebuildOutcome, RebuildError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(RebuildError::NotConfigured);
        };
        let command = self.display();
        info!(command = %command, "rebuilding tool server");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(RebuildError::Timeout {
                    command,
                    timeout: self.timeout,
                });
            }
            Ok(result) => result.map_err(|source| RebuildError::Exec {
                command: command.clone(),
                source,
            })?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            warn!(command = %command, status = %output.status, "rebuild failed");
            return Err(RebuildError::Failed {
                command,
                status: output.status,
                stderr,
            });
        }

        let report = artifact::inspect(artifact);
        if !report.exists {
            warn!(path = %artifact.display(), "build finished but artifact is still missing");
        }

        Ok(RebuildOutcome {
            build_output: stdout,
            build_error: (!stderr.is_empty()).then_some(stderr),
            artifact_exists: report.exists,
        })
    }
}
