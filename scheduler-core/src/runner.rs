//! The pluggable capability set a caller provides to a [`crate::scheduler::Scheduler`].
//!
//! The original tool expressed these as methods a subclass of `Scheduler` could override
//! (`run`, `augmentJobs`, `notifyFinishedSchedulers`). Rust has no virtual inheritance, so this
//! crate recasts the same idea as a narrow set of traits supplied at construction time.

use crate::dag::JobDag;
use crate::job::{Job, KillSwitch};
use crate::status::Status;

/// Executes a Job's payload. The scheduler never inspects the payload itself; it only calls
/// `run` and, on timeout or shutdown, triggers the [`KillSwitch`] passed alongside it.
///
/// Implementations should treat the kill switch as advisory and race it against their own
/// blocking work (e.g. `tokio::select!` against a child process's exit and `kill.killed()`).
/// `run` is invoked from a dedicated blocking thread by the runner pool, so ordinary blocking
/// I/O (spawning a subprocess, waiting on it) is fine to do directly.
pub trait Runner<T>: Send + Sync + 'static {
    fn run(&self, job_id: crate::job::JobId, payload: &T, kill: &KillSwitch) -> Status;
}

/// Optional hook allowing a caller to inspect or extend a DAG's jobs before the
/// job-count sanity check that `schedule()` performs. Mirrors `augmentJobs`.
pub trait Augmenter<T>: Send + Sync + 'static {
    fn augment(&self, dag: &mut JobDag<T>);
}

/// Optional hook run once, at the end of a clean `waitFinish()`. Mirrors `notifyFinishedSchedulers`.
pub trait ExitHook: Send + Sync + 'static {
    fn notify_finished(&self);
}

/// What the scheduler calls out to the embedding host for: rendering a job's status (serialized
/// through the status pool, so implementations never need their own locking) and being told about
/// a user-initiated cancellation.
pub trait Host: Send + Sync + 'static {
    fn handle_job_status(&self, job_id: crate::job::JobId, name: &str, status: Status, caveats: &[String]);

    fn keyboard_interrupt(&self) {}
}

/// A [`Runner`] implementation that just calls a plain closure. Handy for tests and small
/// scripts; real callers driving subprocesses should model their kill-switch handling after
/// `scheduler-cli`'s `ShellRunner`.
pub struct ClosureRunner<T, F>(pub F, std::marker::PhantomData<T>);

impl<T, F> ClosureRunner<T, F>
where
    F: Fn(crate::job::JobId, &T, &KillSwitch) -> Status + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        ClosureRunner(f, std::marker::PhantomData)
    }
}

impl<T, F> Runner<T> for ClosureRunner<T, F>
where
    T: Send + Sync + 'static,
    F: Fn(crate::job::JobId, &T, &KillSwitch) -> Status + Send + Sync + 'static,
{
    fn run(&self, job_id: crate::job::JobId, payload: &T, kill: &KillSwitch) -> Status {
        (self.0)(job_id, payload, kill)
    }
}
