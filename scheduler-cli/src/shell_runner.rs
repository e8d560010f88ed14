//! The `Runner` implementation the CLI actually drives: one subprocess per job.

use std::process::Command;
use std::time::Duration;

use scheduler_core::{JobId, KillSwitch, Runner, Status};

use crate::manifest::ManifestJob;

/// Maps a subprocess's exit code to a Status the same way a shell would: zero succeeds, anything
/// else fails. A scheduler-issued kill (timeout, or `killRemaining` during shutdown) always wins,
/// reported as `TIMEOUT` regardless of what `try_wait` would have said.
#[derive(Debug)]
pub struct ShellRunner;

impl Runner<ManifestJob> for ShellRunner {
    fn run(&self, job_id: JobId, payload: &ManifestJob, kill: &KillSwitch) -> Status {
        let mut child = match Command::new(&payload.command).args(&payload.args).spawn() {
            Ok(child) => child,
            Err(err) => {
                log::error!("{job_id}: failed to spawn '{}': {err}", payload.command);
                return Status::ERROR;
            }
        };

        loop {
            if kill.is_killed() {
                let _ = child.kill();
                let _ = child.wait();
                return Status::TIMEOUT;
            }

            match child.try_wait() {
                Ok(Some(exit_status)) => {
                    return if exit_status.success() { Status::OK } else { Status::FAIL };
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                Err(err) => {
                    log::error!("{job_id}: error waiting on '{}': {err}", payload.command);
                    return Status::ERROR;
                }
            }
        }
    }
}
