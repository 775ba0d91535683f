//! External tool execution.
//!
//! Provides the narrow trait the pipeline uses to run the modification and
//! signing tools, and a process-based implementation.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{Result, SideloadError};

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code of the process (`None` if it was killed by a signal).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for running an external tool to completion.
///
/// Implementations can be:
/// - ProcessRunner: spawns the tool on the host
/// - test fakes that record invocations and simulate output
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs `program` with `args` and waits for it to exit.
    ///
    /// A non-zero exit is reported through [`ToolOutput::exit_code`], not as an
    /// error; errors are reserved for failing to launch the tool at all.
    async fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput>;
}

/// Runs tools as child processes.
///
/// There is no timeout and no cancellation: once started, a tool runs until
/// it exits.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SideloadError::ExternalTool {
                tool: program.to_string(),
                status: None,
                stderr: format!("failed to launch: {}", e),
            })?;

        let result = ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };

        if !result.stdout.is_empty() {
            tracing::debug!("{} stdout: {}", program, result.stdout);
        }
        if !result.stderr.is_empty() {
            tracing::debug!("{} stderr: {}", program, result.stderr);
        }

        Ok(result)
    }
}

/// Runs a tool and turns a non-zero exit into [`SideloadError::ExternalTool`].
///
/// Values following any of `secret_switches` are masked in the log line.
pub async fn run_checked(
    runner: &dyn ToolRunner,
    program: &str,
    args: &[String],
    secret_switches: &[&str],
) -> Result<ToolOutput> {
    tracing::info!(
        "Executing {} {}",
        program,
        redact_args(args, secret_switches).join(" ")
    );

    let output = runner.run(program, args).await?;
    if !output.success() {
        return Err(SideloadError::ExternalTool {
            tool: program.to_string(),
            status: output.exit_code,
            stderr: output.stderr,
        });
    }

    Ok(output)
}

/// Masks the value following each of `secret_switches`.
pub fn redact_args(args: &[String], secret_switches: &[&str]) -> Vec<String> {
    let mut redacted = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            redacted.push("********".to_string());
            mask_next = false;
        } else {
            mask_next = secret_switches.contains(&arg.as_str());
            redacted.push(arg.clone());
        }
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_redact_args_masks_password() {
        let redacted = redact_args(
            &args(&["-k", "cert.p12", "-p", "s3cret", "-m", "a.mobileprovision"]),
            &["-p"],
        );
        assert_eq!(
            redacted,
            args(&["-k", "cert.p12", "-p", "********", "-m", "a.mobileprovision"])
        );
    }

    #[test]
    fn test_redact_args_without_password() {
        let original = args(&["-i", "in.ipa", "-o", "out.ipa"]);
        assert_eq!(redact_args(&original, &["-p"]), original);
    }

    #[test]
    fn test_redact_args_leaves_values_equal_to_switch_alone() {
        // A modification value that happens to read "-p" is not a password.
        let original = args(&["-i", "in.ipa", "-o", "out.ipa", "-n", "-p", "-b", "com.example.app"]);
        assert_eq!(redact_args(&original, &[]), original);
    }

    #[test]
    fn test_tool_output_success() {
        let ok = ToolOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        let failed = ToolOutput {
            exit_code: Some(1),
            ..Default::default()
        };
        let killed = ToolOutput::default();

        assert!(ok.success());
        assert!(!failed.success());
        assert!(!killed.success());
    }

    #[tokio::test]
    async fn test_process_runner_captures_stdout() {
        let runner = ProcessRunner::new();
        let output = runner
            .run("/bin/sh", &args(&["-c", "echo hello"]))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn test_run_checked_reports_stderr_on_failure() {
        let runner = ProcessRunner::new();
        let err = run_checked(&runner, "/bin/sh", &args(&["-c", "echo broken >&2; exit 3"]), &[])
            .await
            .unwrap_err();

        match err {
            SideloadError::ExternalTool { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_process_runner_missing_binary() {
        let runner = ProcessRunner::new();
        let err = runner
            .run("/nonexistent/sideload-test-tool", &[])
            .await
            .unwrap_err();

        assert!(matches!(err, SideloadError::ExternalTool { status: None, .. }));
    }
}
