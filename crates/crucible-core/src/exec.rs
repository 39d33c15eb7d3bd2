//! Low-level command runner against a container
//!
//! Commands always go through `/bin/sh -c` so compile/run pipelines
//! containing `&&`, pipes or redirections are interpreted by the shell, and
//! stdout/stderr are captured as separate streams with the exec TTY
//! disabled. Output bytes are decoded with replacement on invalid UTF-8;
//! malformed program output is never a hard failure.

use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::time::Duration;

use crate::errors::ExecError;

/// Captured result of one shell invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` through a shell inside the container, draining both output
/// streams under a hard wall-clock timeout.
pub async fn run_shell(
    docker: &Docker,
    container_id: &str,
    command: &str,
    work_dir: &str,
    timeout: Duration,
) -> Result<ExecOutput, ExecError> {
    log::debug!("exec in {}: {}", container_id, command);

    let exec = docker
        .create_exec(
            container_id,
            CreateExecOptions {
                cmd: Some(vec![
                    "/bin/sh".to_string(),
                    "-c".to_string(),
                    command.to_string(),
                ]),
                working_dir: Some(work_dir.to_string()),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                tty: Some(false),
                ..Default::default()
            },
        )
        .await?;

    let mut stdout = String::new();
    let mut stderr = String::new();

    if let StartExecResults::Attached { mut output, .. } =
        docker.start_exec(&exec.id, None::<StartExecOptions>).await?
    {
        let drain = async {
            while let Some(chunk) = output.next().await {
                match chunk? {
                    LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
            Ok::<(), ExecError>(())
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(ExecError::Timeout(timeout.as_secs())),
        }
    }

    let inspect = docker.inspect_exec(&exec.id).await?;
    let exit_code = inspect.exit_code.ok_or(ExecError::MissingExitCode)?;

    log::debug!(
        "exec finished with code {} ({}b stdout, {}b stderr)",
        exit_code,
        stdout.len(),
        stderr.len()
    );

    Ok(ExecOutput {
        exit_code,
        stdout,
        stderr,
    })
}

/// Trigger condition for the secondary capture path: a clean exit that
/// produced nothing on either stream. Some runtimes drop buffered output on
/// the primary exec channel under certain stream configurations.
pub fn needs_recapture(output: &ExecOutput) -> bool {
    output.exit_code == 0 && output.stdout.is_empty() && output.stderr.is_empty()
}

/// Run `command`, and when it exits cleanly with empty output, re-run it with
/// its streams redirected to a file inside the container and `cat` the file
/// back. The redirected capture is combined (stdout + stderr interleaved by
/// the shell); it replaces stdout only when it actually produced text.
pub async fn run_shell_with_recapture(
    docker: &Docker,
    container_id: &str,
    command: &str,
    work_dir: &str,
    timeout: Duration,
) -> Result<ExecOutput, ExecError> {
    let first = run_shell(docker, container_id, command, work_dir, timeout).await?;
    if !needs_recapture(&first) {
        return Ok(first);
    }

    log::info!("no output captured on primary channel, retrying via file redirection");
    let redirected = format!("{} > /tmp/output.txt 2>&1 && cat /tmp/output.txt", command);
    match run_shell(docker, container_id, &redirected, work_dir, timeout).await {
        Ok(second) if second.exit_code == 0 && !second.stdout.is_empty() => Ok(second),
        _ => Ok(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: i64, stdout: &str, stderr: &str) -> ExecOutput {
        ExecOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn recapture_triggers_only_on_clean_silent_exit() {
        assert!(needs_recapture(&output(0, "", "")));
        assert!(!needs_recapture(&output(0, "hello\n", "")));
        assert!(!needs_recapture(&output(0, "", "warning\n")));
        assert!(!needs_recapture(&output(1, "", "")));
        assert!(!needs_recapture(&output(42, "", "")));
    }
}
