//! Bootstrap process pool.
//!
//! Spawns the configured number of `bootstrap` subprocesses and surfaces a
//! failed one by terminating the whole sidecar; the container orchestrator
//! owns restarts.

use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info};

/// Starts `count` workers running `$LAMBDA_TASK_ROOT/bootstrap`. Each
/// inherits the prepared process environment plus its pool index in
/// `BOOTSTRAP_INDEX`, and shares the sidecar's stdout/stderr.
pub fn start_invokers(count: usize, task_root: &str) {
    for index in 0..count {
        let bootstrap = format!("{task_root}/bootstrap");
        info!(index, "starting bootstrap");

        tokio::spawn(async move {
            let status = Command::new("sh")
                .arg("-c")
                .arg(&bootstrap)
                .env("BOOTSTRAP_INDEX", index.to_string())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await;

            match status {
                Ok(status) if status.success() => {
                    info!(index, "bootstrap process exited");
                }
                Ok(status) => {
                    error!(index, %status, "bootstrap process failed");
                    std::process::exit(1);
                }
                Err(err) => {
                    error!(index, error = %err, "cannot start bootstrap process");
                    std::process::exit(1);
                }
            }
        });
    }
}
