#![forbid(unsafe_code)]
#![deny(future_incompatible)]
#![warn(missing_debug_implementations, rust_2018_idioms, trivial_casts, unused_qualifications)]
//! A concurrent DAG job scheduler: a bounded pool of workers runs a batch of inter-dependent jobs
//! while respecting per-job slot requirements, system load, per-job timeouts, and a single
//! serialized reporting channel.
//!
//! The entry point is [`Scheduler`]. Callers supply a [`Runner`] (how to execute a job's opaque
//! payload) and a [`Host`] (how to observe a job's status), describe one batch of jobs as
//! [`JobSpec`]s, and drive it with [`Scheduler::schedule`] followed by [`Scheduler::wait_finish`].

mod admission;
mod config;
mod dag;
mod error;
mod job;
mod pool;
mod runner;
mod scheduler;
mod status;

pub use config::SchedulerOptions;
pub use dag::{JobDag, JobSpec};
pub use error::{SchedulerError, SchedulerResult};
pub use job::{Job, JobId, KillSwitch};
pub use runner::{Augmenter, ClosureRunner, ExitHook, Host, Runner};
pub use scheduler::Scheduler;
pub use status::{Color, Status};
