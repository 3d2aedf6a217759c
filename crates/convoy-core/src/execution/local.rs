use std::process::Stdio;
use std::time::Duration;

use tokio::runtime::Runtime;

use crate::execution::{CommandOutput, CommandSpec, ExecutionResult, Executor, ExitStatus};
use crate::models::{CoreError, CoreErrorKind};

/// Runs commands on the controlling machine.
///
/// Calls block the calling thread; process I/O is driven by a small private
/// tokio runtime so concurrent callers from parallel steps share one reactor.
pub struct LocalExecutor {
    runtime: Runtime,
}

impl LocalExecutor {
    pub fn new() -> ExecutionResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("convoy-local-exec")
            .enable_all()
            .build()
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::Internal,
                    format!("failed to build local executor runtime: {error}"),
                )
            })?;

        Ok(Self { runtime })
    }
}

impl Executor for LocalExecutor {
    fn execute(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> ExecutionResult<CommandOutput> {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args);

        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let rendered = command.to_string();
        self.runtime.block_on(async move {
            let child = cmd.spawn().map_err(|error| {
                process_failure(format!("failed to spawn '{rendered}': {error}"))
            })?;

            let wait = child.wait_with_output();
            let output = match timeout {
                Some(timeout_duration) => {
                    match tokio::time::timeout(timeout_duration, wait).await {
                        Ok(result) => result,
                        // Dropping the wait future drops the child, which kills it.
                        Err(_) => {
                            return Err(CoreError::new(
                                CoreErrorKind::Timeout,
                                format!(
                                    "'{rendered}' timed out after {}ms",
                                    timeout_duration.as_millis()
                                ),
                            ));
                        }
                    }
                }
                None => wait.await,
            }
            .map_err(|error| {
                process_failure(format!("failed to wait for '{rendered}': {error}"))
            })?;

            let status = match output.status.code() {
                Some(code) => ExitStatus::ExitCode(code),
                None => ExitStatus::Terminated,
            };

            Ok(CommandOutput {
                status,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        })
    }
}

fn process_failure(message: String) -> CoreError {
    CoreError::new(CoreErrorKind::ProcessFailure, message)
}
