//! Command step execution.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use capstan_domain::JobSpec;
use tokio::process::Command;

/// Result of one external command invocation.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the invocation succeeded.
    pub success: bool,
}

/// Executes one opaque command action on behalf of a job step.
///
/// The runner performs no retries and no condition evaluation; it is
/// invoked exactly once per step per execution attempt. Errors returned
/// here (spawn failure, timeout) are folded into a step failure by the
/// executor.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn invoke(
        &self,
        job: &JobSpec,
        step_name: &str,
        argv: &[String],
        env: &HashMap<String, String>,
        timeout_secs: u64,
    ) -> anyhow::Result<ActionResult>;
}

/// Runs commands as real child processes via `tokio::process`.
pub struct CommandRunner;

#[async_trait]
impl ActionRunner for CommandRunner {
    async fn invoke(
        &self,
        _job: &JobSpec,
        step_name: &str,
        argv: &[String],
        env: &HashMap<String, String>,
        timeout_secs: u64,
    ) -> anyhow::Result<ActionResult> {
        let start = Instant::now();

        if argv.is_empty() {
            anyhow::bail!("Step {} has empty command", step_name);
        }

        let exe = &argv[0];
        let args = &argv[1..];

        let child = Command::new(exe)
            .args(args)
            .envs(env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let output = if timeout_secs > 0 {
            tokio::time::timeout(
                std::time::Duration::from_secs(timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                anyhow::anyhow!("Step {} timed out after {} seconds", step_name, timeout_secs)
            })??
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let success = output.status.success();

        Ok(ActionResult {
            exit_code,
            stdout,
            stderr,
            duration_ms,
            success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobSpec {
        JobSpec::default_job()
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let result = CommandRunner
            .invoke(
                &job(),
                "echo_test",
                &["echo".to_string(), "hello".to_string()],
                &HashMap::new(),
                60,
            )
            .await
            .expect("invoke failed");
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let result = CommandRunner
            .invoke(&job(), "false_test", &["false".to_string()], &HashMap::new(), 60)
            .await
            .expect("invoke failed");
        assert!(!result.success);
        assert_ne!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_environment_passed_through() {
        let mut env = HashMap::new();
        env.insert("MATRIX_VERSION".to_string(), "3.9".to_string());
        let result = CommandRunner
            .invoke(
                &job(),
                "env_test",
                &[
                    "sh".to_string(),
                    "-c".to_string(),
                    "echo $MATRIX_VERSION".to_string(),
                ],
                &env,
                60,
            )
            .await
            .expect("invoke failed");
        assert!(result.stdout.contains("3.9"));
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let result = CommandRunner
            .invoke(
                &job(),
                "sleep_test",
                &["sleep".to_string(), "5".to_string()],
                &HashMap::new(),
                1,
            )
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let result = CommandRunner
            .invoke(&job(), "empty", &[], &HashMap::new(), 60)
            .await;
        assert!(result.is_err());
    }
}
