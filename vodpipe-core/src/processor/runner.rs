use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use super::error::{ProcessorError, ProcessorResult};
use super::types::{ToolCommand, ToolOutput};

/// Executes external tool commands.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, command: &ToolCommand, cwd: &Path) -> ProcessorResult<ToolOutput>;
}

/// Runs commands as child processes. Stdout goes to the terminal so tool
/// progress stays visible; stderr is echoed and captured for classification.
#[derive(Debug, Clone, Default)]
pub struct ProcessToolRunner;

impl ProcessToolRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, command: &ToolCommand, cwd: &Path) -> ProcessorResult<ToolOutput> {
        debug!(command = %command, cwd = %cwd.display(), "launching tool");
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessorError::Launch {
                program: command.program.clone(),
                source,
            })?;

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let mut buffer = Vec::new();
            pipe.read_to_end(&mut buffer)
                .await
                .map_err(|source| ProcessorError::Io {
                    source,
                    path: cwd.to_path_buf(),
                })?;
            stderr = String::from_utf8_lossy(&buffer).into_owned();
            if !stderr.is_empty() {
                eprint!("{stderr}");
            }
        }
        let status = child.wait().await.map_err(|source| ProcessorError::Io {
            source,
            path: cwd.to_path_buf(),
        })?;
        Ok(ToolOutput {
            exit_code: status.code(),
            stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn captures_exit_code_and_stderr() {
        let dir = tempdir().unwrap();
        let command = ToolCommand::new(
            "sh",
            vec!["-c".into(), "echo boom >&2; exit 3".into()],
        );
        let output = ProcessToolRunner::new()
            .run(&command, dir.path())
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr.trim(), "boom");
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let dir = tempdir().unwrap();
        let command = ToolCommand::new("definitely-not-a-real-tool-4821", Vec::new());
        let err = ProcessToolRunner::new()
            .run(&command, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Launch { .. }));
    }
}
