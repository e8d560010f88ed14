//! JobDag: the arena of Jobs for one batch, plus the ready-frontier advancement logic that
//! mirrors `getJobsAndAdvance`.

use std::time::Duration;

use crate::error::{SchedulerError, SchedulerResult};
use crate::job::{Job, JobId};
use crate::status::Status;

/// One caller-supplied job description, as passed to [`JobDag::from_specs`].
///
/// `dependencies` are indices into the slice of specs passed to `from_specs`, not `JobId`s --
/// callers don't have `JobId`s yet when building a batch, since those are assigned by the DAG
/// itself as it allocates the arena.
pub struct JobSpec<T> {
    pub name: String,
    pub slots: u32,
    pub max_time: Duration,
    pub dependencies: Vec<usize>,
    pub payload: T,
}

/// The DAG for a single batch: a `Job<T>` arena plus reverse (dependent) edges and a
/// precomputed topological order.
///
/// There is no internal locking here. Every method takes `&mut self` or `&self`, and callers
/// (the `Scheduler` façade) are expected to hold the batch lock for the duration of any call
/// that mutates job state.
#[derive(Debug)]
pub struct JobDag<T> {
    jobs: Vec<Job<T>>,
    dependents: Vec<Vec<JobId>>,
    order: Vec<JobId>,
}

impl<T> JobDag<T> {
    /// Builds a DAG from flat specs, validating dependency indices and rejecting cycles.
    pub fn from_specs(specs: Vec<JobSpec<T>>) -> SchedulerResult<Self> {
        let n = specs.len();
        let mut jobs = Vec::with_capacity(n);
        for (i, spec) in specs.into_iter().enumerate() {
            let id = JobId(i);
            for &dep in &spec.dependencies {
                if dep >= n {
                    return Err(SchedulerError::UnknownDependency(JobId(dep)));
                }
            }
            let deps = spec.dependencies.iter().map(|&d| JobId(d)).collect();
            jobs.push(Job::new(id, spec.name, spec.slots, spec.max_time, deps, spec.payload));
        }

        let mut dependents: Vec<Vec<JobId>> = vec![Vec::new(); n];
        for job in &jobs {
            for &dep in job.dependencies() {
                dependents[dep.index()].push(job.id());
            }
        }

        let order = topological_order(&jobs, &dependents)?;

        Ok(JobDag { jobs, dependents, order })
    }

    pub fn size(&self) -> usize {
        self.jobs.len()
    }

    pub fn jobs(&self) -> &[Job<T>] {
        &self.jobs
    }

    pub fn job(&self, id: JobId) -> &Job<T> {
        &self.jobs[id.index()]
    }

    pub fn job_mut(&mut self, id: JobId) -> &mut Job<T> {
        &mut self.jobs[id.index()]
    }

    /// A dependency-respecting order over every job in this batch, computed once at construction.
    pub fn topological_sort(&self) -> &[JobId] {
        &self.order
    }

    pub fn dependents_of(&self, id: JobId) -> &[JobId] {
        &self.dependents[id.index()]
    }

    /// Advances the batch by one tick and returns every job that now needs action from a caller:
    ///
    /// - jobs newly reachable for execution (still `hold`, every dependency now terminal), and
    /// - jobs that have reached a terminal status and have not yet been handed to a status pool.
    ///
    /// Each job is returned from this method at most once per category, tracked via the job's
    /// `dispatched`/`reported` flags, which makes repeated calls with no new progress a no-op
    /// rather than a source of duplicate dispatch or duplicate reporting.
    ///
    /// Before collecting results, failures are cascaded through the DAG in topological order: a
    /// job whose dependency reached any terminal status other than `OK` (a failure, a timeout, or
    /// a skip of its own) is downgraded to `skip` with a `skipped dependency` caveat, which in the
    /// same pass can unblock skipping its own dependents in turn.
    pub fn ready_frontier(&mut self) -> Vec<JobId> {
        for &id in &self.order {
            let deps_failed = self.jobs[id.index()].dependencies().iter().any(|&d| {
                let status = self.jobs[d.index()].status();
                status.is_terminal() && status != Status::OK
            });
            let job = &mut self.jobs[id.index()];
            if deps_failed && !job.is_terminal() {
                job.set_status(Status::SKIP);
                job.add_caveat("skipped dependency");
            }
        }

        let mut frontier = Vec::new();

        for &id in &self.order {
            let job = &mut self.jobs[id.index()];
            if job.is_terminal() && !job.reported() {
                job.mark_reported();
                frontier.push(id);
            }
        }

        for &id in &self.order {
            let ready = {
                let job = &self.jobs[id.index()];
                job.is_hold()
                    && !job.dispatched()
                    && job.dependencies().iter().all(|&d| self.jobs[d.index()].status().is_terminal())
            };
            if ready {
                self.jobs[id.index()].mark_dispatched();
                frontier.push(id);
            }
        }

        frontier
    }
}

fn topological_order<T>(jobs: &[Job<T>], dependents: &[Vec<JobId>]) -> SchedulerResult<Vec<JobId>> {
    let n = jobs.len();
    let mut in_degree: Vec<usize> = jobs.iter().map(|j| j.dependencies().len()).collect();
    let mut queue: std::collections::VecDeque<JobId> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(i, _)| JobId(i))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(id) = queue.pop_front() {
        order.push(id);
        for &dep in &dependents[id.index()] {
            in_degree[dep.index()] -= 1;
            if in_degree[dep.index()] == 0 {
                queue.push_back(dep);
            }
        }
    }

    if order.len() != n {
        return Err(SchedulerError::CyclicDependency);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, deps: Vec<usize>) -> JobSpec<()> {
        JobSpec { name: name.into(), slots: 1, max_time: Duration::from_secs(60), dependencies: deps, payload: () }
    }

    #[test]
    fn linear_chain_exposes_one_ready_job_at_a_time() {
        let mut dag = JobDag::from_specs(vec![spec("a", vec![]), spec("b", vec![0]), spec("c", vec![1])]).unwrap();

        let frontier = dag.ready_frontier();
        assert_eq!(frontier, vec![JobId(0)]);
        assert!(dag.ready_frontier().is_empty());

        dag.job_mut(JobId(0)).set_status(Status::OK);
        let frontier = dag.ready_frontier();
        assert_eq!(frontier, vec![JobId(0), JobId(1)]);
    }

    #[test]
    fn failed_dependency_cascades_skip_transitively() {
        let mut dag = JobDag::from_specs(vec![spec("a", vec![]), spec("b", vec![0]), spec("c", vec![1])]).unwrap();
        dag.ready_frontier();

        dag.job_mut(JobId(0)).set_status(Status::FAIL);
        let frontier = dag.ready_frontier();

        assert_eq!(dag.job(JobId(0)).status(), Status::FAIL);
        assert_eq!(dag.job(JobId(1)).status(), Status::SKIP);
        assert_eq!(dag.job(JobId(2)).status(), Status::SKIP);
        assert!(dag.job(JobId(1)).caveats().any(|c| c == "skipped dependency"));
        assert!(frontier.contains(&JobId(0)));
        assert!(frontier.contains(&JobId(1)));
        assert!(frontier.contains(&JobId(2)));
    }

    #[test]
    fn cyclic_dependencies_are_rejected() {
        let specs = vec![spec("a", vec![1]), spec("b", vec![0])];
        assert_eq!(JobDag::from_specs(specs).unwrap_err(), SchedulerError::CyclicDependency);
    }

    #[test]
    fn unknown_dependency_index_is_rejected() {
        let specs = vec![spec("a", vec![7])];
        assert!(matches!(JobDag::from_specs(specs), Err(SchedulerError::UnknownDependency(_))));
    }

    #[test]
    fn diamond_dependency_waits_for_both_parents() {
        let mut dag =
            JobDag::from_specs(vec![spec("a", vec![]), spec("b", vec![0]), spec("c", vec![0]), spec("d", vec![1, 2])])
                .unwrap();

        dag.ready_frontier();
        dag.job_mut(JobId(0)).set_status(Status::OK);
        dag.ready_frontier();

        dag.job_mut(JobId(1)).set_status(Status::OK);
        assert!(dag.ready_frontier().iter().all(|&id| id != JobId(3)));

        dag.job_mut(JobId(2)).set_status(Status::OK);
        assert!(dag.ready_frontier().contains(&JobId(3)));
    }

    #[test]
    fn ready_frontier_never_hands_out_the_same_job_twice() {
        let mut dag = JobDag::from_specs(vec![spec("a", vec![])]).unwrap();
        let first = dag.ready_frontier();
        assert_eq!(first, vec![JobId(0)]);
        assert!(dag.ready_frontier().is_empty());

        dag.job_mut(JobId(0)).set_status(Status::OK);
        let reported = dag.ready_frontier();
        assert_eq!(reported, vec![JobId(0)]);
        assert!(dag.ready_frontier().is_empty());
    }
}
