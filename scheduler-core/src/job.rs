//! Job: one unit of schedulable work.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::status::Status;

/// Stable identity of a Job within a batch. Backed by its position in the batch's job arena
/// rather than a UUID: identity only needs to be stable for the lifetime of one `schedule()`
/// call's worth of jobs, and an index avoids an extra allocation per job.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) usize);

impl JobId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// A best-effort, idempotent cancellation signal shared between a Job's timeout timer and
/// whatever [`crate::runner::Runner`] implementation is currently executing its payload.
///
/// The first call to [`KillSwitch::trigger`] wins; subsequent calls (whether from a second
/// timeout, a keyboard interrupt, or `killRemaining`) are no-ops, which is what makes
/// `killProcess` safe to call multiply and concurrently with normal completion.
#[derive(Clone, Debug, Default)]
pub struct KillSwitch {
    killed: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn trigger(&self) {
        if !self.killed.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Resolves once [`KillSwitch::trigger`] has been called. Resolves immediately if it already
    /// was, so a Runner can use this safely in a `tokio::select!` race with payload completion.
    pub async fn killed(&self) {
        if self.is_killed() {
            return;
        }
        self.notify.notified().await;
    }
}

/// One unit of schedulable work, wrapping an opaque payload of type `T` supplied by the caller.
///
/// `Job` does not know how to execute its payload; that is the [`crate::runner::Runner`]'s job.
/// All mutable fields (`status`, `caveats`, `dispatched`) are intended to be mutated only while
/// the owning batch's lock is held -- `Job` itself does no internal locking, matching the
/// "arena + indices, single batch lock" design used throughout this crate.
#[derive(Debug)]
pub struct Job<T> {
    id: JobId,
    name: String,
    slots: u32,
    max_time: Duration,
    status: Status,
    caveats: BTreeSet<String>,
    dependencies: Vec<JobId>,
    /// Set by `JobDag::ready_frontier` the first time this job is handed to the runner pool, so
    /// that a second call with no newly-ready jobs returns an empty set rather than re-handing
    /// out this job.
    dispatched: bool,
    /// Set by `JobDag::ready_frontier` the first time this job (now terminal) is handed to the
    /// status pool, independently of `dispatched` -- a job is dispatched once but may be polled
    /// for "is it terminal yet" across many `ready_frontier` calls before it actually is.
    reported: bool,
    payload: T,
    kill_switch: KillSwitch,
}

impl<T> Job<T> {
    pub(crate) fn new(
        id: JobId,
        name: impl Into<String>,
        slots: u32,
        max_time: Duration,
        dependencies: Vec<JobId>,
        payload: T,
    ) -> Self {
        assert!(slots >= 1, "a job must request at least one slot");
        Job {
            id,
            name: name.into(),
            slots,
            max_time,
            status: Status::HOLD,
            caveats: BTreeSet::new(),
            dependencies,
            dispatched: false,
            reported: false,
            payload,
            kill_switch: KillSwitch::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slots(&self) -> u32 {
        self.slots
    }

    pub fn max_time(&self) -> Duration {
        self.max_time
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn dependencies(&self) -> &[JobId] {
        &self.dependencies
    }

    pub fn caveats(&self) -> impl Iterator<Item = &str> {
        self.caveats.iter().map(String::as_str)
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill_switch.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn is_hold(&self) -> bool {
        self.status.is_hold()
    }

    pub fn is_silent(&self) -> bool {
        self.status.is_silent()
    }

    pub fn is_fail(&self) -> bool {
        self.status.is_fail()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Set this job's status. Callers must hold the owning batch's lock.
    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Idempotent set-append of a short caveat tag. Callers must hold the owning batch's lock.
    pub(crate) fn add_caveat(&mut self, tag: impl Into<String>) {
        self.caveats.insert(tag.into());
    }

    pub(crate) fn mark_dispatched(&mut self) {
        self.dispatched = true;
    }

    pub(crate) fn dispatched(&self) -> bool {
        self.dispatched
    }

    /// Clears the dispatch flag so a job rejected transiently by admission control re-enters the
    /// next `ready_frontier` call instead of being permanently skipped over.
    pub(crate) fn reset_dispatched(&mut self) {
        self.dispatched = false;
    }

    pub(crate) fn mark_reported(&mut self) {
        self.reported = true;
    }

    pub(crate) fn reported(&self) -> bool {
        self.reported
    }

    /// Best-effort cancellation of the in-flight payload. Safe to call multiply and concurrently
    /// with normal completion; the first caller wins.
    pub fn kill_process(&self) {
        self.kill_switch.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: usize, deps: Vec<JobId>) -> Job<()> {
        Job::new(JobId(id), format!("job{id}"), 1, Duration::from_secs(60), deps, ())
    }

    #[test]
    fn new_job_starts_on_hold_with_no_caveats() {
        let j = job(0, vec![]);
        assert_eq!(j.status(), Status::HOLD);
        assert!(j.caveats().next().is_none());
        assert!(!j.dispatched());
    }

    #[test]
    fn add_caveat_is_idempotent() {
        let mut j = job(0, vec![]);
        j.add_caveat("OVERSIZED");
        j.add_caveat("OVERSIZED");
        assert_eq!(j.caveats().count(), 1);
    }

    #[tokio::test]
    async fn kill_switch_is_idempotent_and_observable() {
        let k = KillSwitch::new();
        assert!(!k.is_killed());
        k.trigger();
        k.trigger();
        assert!(k.is_killed());
        k.killed().await; // resolves immediately, does not hang
    }

    #[tokio::test]
    async fn kill_switch_wakes_a_waiter() {
        let k = KillSwitch::new();
        let waiter = k.clone();
        let handle = tokio::spawn(async move {
            waiter.killed().await;
        });
        tokio::task::yield_now().await;
        k.trigger();
        handle.await.unwrap();
    }
}
