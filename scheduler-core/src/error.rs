use thiserror::Error;

use crate::job::JobId;

/// Errors raised by the scheduler itself, as opposed to errors surfaced through a Job's Status.
///
/// Per the accounting-invariant rules, [`SchedulerError::BankAccountingFailure`] and
/// [`SchedulerError::BatchSizeMismatch`] indicate a bug in the scheduler or its caller, not a
/// normal runtime condition; both are expected to fail loudly in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("augmenter changed the batch size from {expected} to {actual} jobs")]
    BatchSizeMismatch { expected: usize, actual: usize },

    #[error("a batch is already active on this scheduler; construct a new Scheduler per batch")]
    BatchAlreadyActive,

    #[error("job {0:?} is not a member of this batch's job bank (double removal or accounting bug)")]
    BankAccountingFailure(JobId),

    #[error("waitFinish exited with {remaining} job(s) still in the job bank and no error state set")]
    NonEmptyBankOnCleanExit { remaining: usize },

    #[error("dependency graph contains a cycle")]
    CyclicDependency,

    #[error("job {0:?} referenced an unknown dependency")]
    UnknownDependency(JobId),

    #[error("attempted an operation that is not valid for the job's current status")]
    InvalidOperationForStatus,
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
