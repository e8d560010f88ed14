//! The Scheduler façade: the only type most callers touch directly.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::admission::{Admission, AdmissionController};
use crate::config::SchedulerOptions;
use crate::dag::{JobDag, JobSpec};
use crate::error::{SchedulerError, SchedulerResult};
use crate::job::{JobId, KillSwitch};
use crate::pool::{RunnerPool, StatusPool};
use crate::runner::{Augmenter, ExitHook, Host, Runner};
use crate::status::Status;

struct BatchState<T> {
    dag: JobDag<T>,
    job_bank: HashSet<JobId>,
    scheduled_jobs: HashSet<JobId>,
}

/// Bookkeeping guarded together, mirroring the original's `activity_lock`.
struct Activity {
    active_jobs: HashMap<JobId, KillSwitch>,
    jobs_reported: HashSet<JobId>,
    last_reported_time: Instant,
}

impl Default for Activity {
    fn default() -> Self {
        Activity { active_jobs: HashMap::new(), jobs_reported: HashSet::new(), last_reported_time: Instant::now() }
    }
}

struct Inner<T, R, H> {
    options: SchedulerOptions,
    runner: Arc<R>,
    host: Arc<H>,
    augmenter: Mutex<Option<Box<dyn Augmenter<T>>>>,
    exit_hook: Mutex<Option<Box<dyn ExitHook>>>,
    admission: AdmissionController,
    runner_pool: RunnerPool,
    status_pool: StatusPool,
    batch: Mutex<Option<BatchState<T>>>,
    activity: Mutex<Activity>,
    error_state: AtomicBool,
    accepting: AtomicBool,
    failures: AtomicUsize,
    last_error: Mutex<Option<SchedulerError>>,
    /// Lets any `&self` method obtain an owned, 'static handle to spawn detached follow-up work
    /// (re-advancing the DAG, re-enqueueing a delayed report) without threading an `Arc` through
    /// every call. Set once, immediately after construction, via `Arc::new_cyclic`.
    self_weak: Weak<Inner<T, R, H>>,
}

impl<T, R, H> Inner<T, R, H> {
    fn arc(&self) -> Arc<Self> {
        self.self_weak.upgrade().expect("Inner dropped while an operation on it was still in flight")
    }
}

/// Owns the job bank, the DAG, and the two worker pools for one batch of jobs.
///
/// A `Scheduler` is built once with a [`Runner`] (how to execute a job's payload) and a [`Host`]
/// (how to report a job's status back out), scheduled with one batch of [`JobSpec`]s, and driven
/// to completion with [`Scheduler::wait_finish`]. This crate does not support scheduling a second
/// batch onto the same instance -- `schedule` after a batch is already active returns
/// [`SchedulerError::BatchAlreadyActive`]; construct a new `Scheduler` per batch instead.
pub struct Scheduler<T, R, H> {
    inner: Arc<Inner<T, R, H>>,
}

impl<T, R, H> Clone for Scheduler<T, R, H> {
    fn clone(&self) -> Self {
        Scheduler { inner: self.inner.clone() }
    }
}

impl<T, R, H> Scheduler<T, R, H>
where
    T: Clone + Send + Sync + 'static,
    R: Runner<T>,
    H: Host,
{
    pub fn new(options: SchedulerOptions, runner: R, host: H) -> Self {
        let capacity = options.available_slots();
        let admission = AdmissionController::new(options.clone());
        let inner = Arc::new_cyclic(|weak| Inner {
            options,
            runner: Arc::new(runner),
            host: Arc::new(host),
            augmenter: Mutex::new(None),
            exit_hook: Mutex::new(None),
            admission,
            runner_pool: RunnerPool::new(capacity),
            status_pool: StatusPool::new(),
            batch: Mutex::new(None),
            activity: Mutex::new(Activity::default()),
            error_state: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
            failures: AtomicUsize::new(0),
            last_error: Mutex::new(None),
            self_weak: weak.clone(),
        });
        Scheduler { inner }
    }

    /// Attaches an [`Augmenter`], called once per `schedule()` before the size sanity check.
    pub fn with_augmenter(self, augmenter: impl Augmenter<T>) -> Self {
        *self.inner.augmenter.lock().unwrap() = Some(Box::new(augmenter));
        self
    }

    /// Attaches an [`ExitHook`], called once at the end of a clean `wait_finish`.
    pub fn with_exit_hook(self, hook: impl ExitHook) -> Self {
        *self.inner.exit_hook.lock().unwrap() = Some(Box::new(hook));
        self
    }

    /// Mirrors the original's `schedulerError()`: an error is only reported if work remained when
    /// shutdown was triggered, not whenever a clean failure-cap shutdown happens to have run.
    pub fn has_error(&self) -> bool {
        self.inner.error_state.load(Ordering::SeqCst) && !self.inner.max_failures_reached()
    }

    /// A snapshot of every job ever submitted, for post-mortem inspection. Never shrinks.
    pub fn scheduled_jobs(&self) -> Vec<(JobId, String, Status)> {
        let guard = self.inner.batch.lock().unwrap();
        match guard.as_ref() {
            Some(state) => state
                .scheduled_jobs
                .iter()
                .map(|&id| {
                    let job = state.dag.job(id);
                    (id, job.name().to_string(), job.status())
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Builds a DAG from `specs`, adds every job to the job bank, and dispatches the initial
    /// ready frontier. A no-op if the error state is already latched or `wait_finish` has already
    /// been called. Returns once the initial frontier has been routed, not once any job finishes.
    pub async fn schedule(&self, specs: Vec<JobSpec<T>>) -> SchedulerResult<()> {
        if self.inner.error_state.load(Ordering::SeqCst) || !self.inner.accepting.load(Ordering::SeqCst) {
            return Ok(());
        }

        {
            let guard = self.inner.batch.lock().unwrap();
            if guard.is_some() {
                return Err(SchedulerError::BatchAlreadyActive);
            }
        }

        let submitted = specs.len();
        let mut dag = JobDag::from_specs(specs)?;
        if let Some(augmenter) = self.inner.augmenter.lock().unwrap().as_ref() {
            augmenter.augment(&mut dag);
        }
        if dag.size() != submitted {
            return Err(SchedulerError::BatchSizeMismatch { expected: submitted, actual: dag.size() });
        }

        {
            let mut guard = self.inner.batch.lock().unwrap();
            let job_bank: HashSet<JobId> = dag.topological_sort().iter().copied().collect();
            let scheduled_jobs = job_bank.clone();
            *guard = Some(BatchState { dag, job_bank, scheduled_jobs });
        }

        self.inner.queue_jobs().await;
        Ok(())
    }

    /// Latches "no more submissions", then polls until either the error state is set or both
    /// pools are idle and the job bank is empty. On a clean exit, runs the exit hook and raises
    /// [`SchedulerError::NonEmptyBankOnCleanExit`] if the bank is unexpectedly non-empty.
    pub async fn wait_finish(&self) -> SchedulerResult<()> {
        self.inner.accepting.store(false, Ordering::SeqCst);

        loop {
            if self.inner.error_state.load(Ordering::SeqCst) {
                break;
            }
            let bank_empty = {
                let guard = self.inner.batch.lock().unwrap();
                guard.as_ref().map_or(true, |s| s.job_bank.is_empty())
            };
            if bank_empty && self.inner.runner_pool.is_idle() && self.inner.status_pool.is_idle() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        self.inner.runner_pool.close();
        self.inner.status_pool.close();
        self.inner.runner_pool.join().await;
        self.inner.status_pool.join().await;

        let errored = self.inner.error_state.load(Ordering::SeqCst);

        if !errored {
            if let Some(hook) = self.inner.exit_hook.lock().unwrap().as_ref() {
                hook.notify_finished();
            }
        }

        if let Some(err) = self.inner.last_error.lock().unwrap().clone() {
            return Err(err);
        }

        if !errored {
            let remaining = {
                let guard = self.inner.batch.lock().unwrap();
                guard.as_ref().map_or(0, |s| s.job_bank.len())
            };
            if remaining > 0 {
                return Err(SchedulerError::NonEmptyBankOnCleanExit { remaining });
            }
        }

        Ok(())
    }

    /// Best-effort kill of every active job, then latches the error state and closes both pools.
    pub async fn kill_remaining(&self) {
        self.inner.kill_remaining(false).await;
    }

    pub async fn keyboard_interrupt(&self) {
        self.inner.kill_remaining(true).await;
    }
}

impl<T, R, H> Inner<T, R, H>
where
    T: Clone + Send + Sync + 'static,
    R: Runner<T>,
    H: Host,
{
    fn job_slots(&self, id: JobId) -> u32 {
        self.batch.lock().unwrap().as_ref().unwrap().dag.job(id).slots()
    }

    fn set_status(&self, id: JobId, status: Status) {
        self.batch.lock().unwrap().as_mut().unwrap().dag.job_mut(id).set_status(status);
    }

    fn add_caveat(&self, id: JobId, tag: &str) {
        self.batch.lock().unwrap().as_mut().unwrap().dag.job_mut(id).add_caveat(tag);
    }

    fn max_failures_reached(&self) -> bool {
        self.failures.load(Ordering::SeqCst) >= self.options.max_failures()
    }

    fn fail(&self, err: SchedulerError) {
        let mut last_error = self.last_error.lock().unwrap();
        if last_error.is_none() {
            log::error!("scheduler error: {err}");
            *last_error = Some(err);
        }
        drop(last_error);
        self.fail_fast();
    }

    async fn kill_remaining(&self, keyboard: bool) {
        self.error_state.store(true, Ordering::SeqCst);
        {
            let activity = self.activity.lock().unwrap();
            for kill in activity.active_jobs.values() {
                kill.trigger();
            }
        }
        self.runner_pool.close();
        self.status_pool.close();
        if keyboard {
            self.host.keyboard_interrupt();
        }
    }

    /// Drains the current ready frontier, routing terminal jobs to the status pool and newly
    /// unblocked `hold` jobs (promoted to `queued`) to the runner pool.
    async fn queue_jobs(&self) {
        let frontier = {
            let mut guard = self.batch.lock().unwrap();
            match guard.as_mut() {
                Some(state) => state.dag.ready_frontier(),
                None => return,
            }
        };

        for id in frontier {
            let status = { self.batch.lock().unwrap().as_ref().unwrap().dag.job(id).status() };
            if status.is_terminal() {
                self.route_to_status_pool(id);
            } else {
                self.set_status(id, Status::QUEUED);
                self.route_to_runner_pool(id).await;
            }
        }
    }

    /// Re-advances the DAG on a detached task. Used from inside a runner-pool-owned task
    /// (`run_job`/`execute`): that task still holds its own concurrency permit at this point, so
    /// awaiting `queue_jobs` inline here could deadlock waiting on a permit this very task has
    /// not released yet.
    fn requeue(&self) {
        let inner = self.arc();
        tokio::spawn(async move { inner.queue_jobs().await });
    }

    fn route_to_status_pool(&self, id: JobId) {
        if self.status_pool.is_closing() {
            return;
        }
        let inner = self.arc();
        self.status_pool.submit(move || inner.status_task(id));
    }

    async fn route_to_runner_pool(&self, id: JobId) {
        if self.runner_pool.is_closing() {
            return;
        }
        let inner = self.arc();
        self.runner_pool.spawn(async move { inner.run_job(id).await }).await;
    }

    /// One pass of the runner pool's per-job loop: acquire admission, run (or skip, or back off
    /// and re-queue), then always hand control back to `queue_jobs`.
    async fn run_job(&self, id: JobId) {
        let job_slots = self.job_slots(id);
        match self.admission.reserve(job_slots).await {
            Admission::Admit => self.execute(id).await,
            Admission::AdmitOversize => {
                self.add_caveat(id, "OVERSIZED");
                self.execute(id).await;
            }
            Admission::RejectPermanent => {
                self.set_status(id, Status::SKIP);
                self.add_caveat(id, "insufficient slots");
                self.requeue();
            }
            Admission::RejectTransient => {
                {
                    let mut guard = self.batch.lock().unwrap();
                    let job = guard.as_mut().unwrap().dag.job_mut(id);
                    job.set_status(Status::HOLD);
                    job.reset_dispatched();
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
                self.requeue();
            }
        }
    }

    async fn execute(&self, id: JobId) {
        self.set_status(id, Status::RUNNING);

        let (max_time, kill_switch, payload) = {
            let guard = self.batch.lock().unwrap();
            let job = guard.as_ref().unwrap().dag.job(id);
            (job.max_time(), job.kill_switch(), job.payload().clone())
        };

        {
            let mut activity = self.activity.lock().unwrap();
            activity.active_jobs.insert(id, kill_switch.clone());
        }

        let timeout_handle = {
            let inner = self.arc();
            let kill = kill_switch.clone();
            tokio::spawn(async move {
                tokio::time::sleep(max_time).await;
                inner.on_timeout(id, &kill);
            })
        };

        let report_handle = {
            let inner = self.arc();
            let min_report_time = self.options.min_report_time;
            tokio::spawn(async move {
                tokio::time::sleep(min_report_time).await;
                inner.route_to_status_pool(id);
            })
        };

        let runner = self.runner.clone();
        let join_result = tokio::task::spawn_blocking(move || runner.run(id, &payload, &kill_switch)).await;

        timeout_handle.abort();
        report_handle.abort();

        {
            let mut activity = self.activity.lock().unwrap();
            activity.active_jobs.remove(&id);
        }
        self.admission.release(self.job_slots(id)).await;

        let panicked = join_result.is_err();
        let status = join_result.unwrap_or(Status::ERROR);
        self.set_status(id, status);

        if panicked {
            log::error!("job {id} panicked while running");
            self.kill_remaining(false).await;
        }

        self.requeue();
    }

    fn on_timeout(&self, id: JobId, kill: &KillSwitch) {
        let still_running = {
            let guard = self.batch.lock().unwrap();
            guard.as_ref().map_or(false, |s| s.dag.job(id).is_running())
        };
        if still_running {
            self.set_status(id, Status::TIMEOUT);
            kill.trigger();
        }
    }

    /// The status pool's single task body. Runs on the status pool's one worker, so it must never
    /// await -- any follow-up async work (the long-running re-enqueue delay, re-advancing the
    /// DAG) is spawned as a detached task instead.
    fn status_task(&self, id: JobId) {
        if self.status_pool.is_closing() {
            return;
        }

        let in_bank = {
            let guard = self.batch.lock().unwrap();
            guard.as_ref().map_or(false, |s| s.job_bank.contains(&id))
        };
        if !in_bank {
            return;
        }

        let (name, status, caveats) = {
            let guard = self.batch.lock().unwrap();
            let job = guard.as_ref().unwrap().dag.job(id);
            (job.name().to_string(), job.status(), job.caveats().map(str::to_owned).collect::<Vec<_>>())
        };

        if status.is_running() {
            self.long_running_notice(id, &name);
            return;
        }

        self.host.handle_job_status(id, &name, status, &caveats);

        {
            let mut activity = self.activity.lock().unwrap();
            if !status.is_silent() {
                activity.last_reported_time = Instant::now();
            }
        }

        if status.is_fail() {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }

        {
            let mut guard = self.batch.lock().unwrap();
            let removed = guard.as_mut().unwrap().job_bank.remove(&id);
            drop(guard);
            if !removed {
                self.fail(SchedulerError::BankAccountingFailure(id));
                return;
            }
        }

        if self.max_failures_reached() {
            self.fail_fast();
        }

        self.requeue();
    }

    /// Mirrors the original `jobStatus`'s `isRunning()` branch: once a job has been running past
    /// `min_report_time`, it gets one intermediate report (still `RUNNING`, tagged `FINISHED`) --
    /// a distinct host call from its eventual final report -- rather than being silently skipped.
    fn long_running_notice(&self, id: JobId, name: &str) {
        let mut activity = self.activity.lock().unwrap();
        if activity.jobs_reported.contains(&id) {
            return;
        }
        let elapsed = activity.last_reported_time.elapsed();
        if elapsed < self.options.min_report_time {
            let delay = self.options.min_report_time.saturating_sub(elapsed).max(Duration::from_millis(1));
            drop(activity);
            let inner = self.arc();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.route_to_status_pool(id);
            });
            return;
        }

        activity.jobs_reported.insert(id);
        activity.last_reported_time = Instant::now();
        drop(activity);

        self.add_caveat(id, "FINISHED");
        let caveats = {
            let guard = self.batch.lock().unwrap();
            guard.as_ref().unwrap().dag.job(id).caveats().map(str::to_owned).collect::<Vec<_>>()
        };
        self.host.handle_job_status(id, name, Status::RUNNING, &caveats);
    }

    fn fail_fast(&self) {
        let inner = self.arc();
        tokio::spawn(async move { inner.kill_remaining(false).await });
    }
}
