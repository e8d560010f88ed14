//! The admission controller: `reserveSlots`.

use std::time::Duration;

use sysinfo::{System, SystemExt};
use tokio::sync::Mutex;

use crate::config::SchedulerOptions;

/// Outcome of a single admission attempt. The caller is responsible for acting on it (setting
/// the job's status, tagging caveats, retrying); this module only tracks `slots_in_use`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The job fits within capacity and its slots have been reserved.
    Admit,
    /// The job is larger than capacity but the pool has no hard cap, so it was admitted anyway.
    /// Its slots have been reserved (capacity is transiently exceeded).
    AdmitOversize,
    /// The job is larger than capacity and the pool has a hard cap: it can never run and should
    /// be skipped. No slots were reserved.
    RejectPermanent,
    /// The job would fit eventually but not right now. No slots were reserved; the caller should
    /// back off and retry.
    RejectTransient,
}

/// Guards `slots_in_use` and, when enabled, gates admission on the 1-minute system load average.
pub struct AdmissionController {
    options: SchedulerOptions,
    slots_in_use: Mutex<usize>,
}

impl AdmissionController {
    pub fn new(options: SchedulerOptions) -> Self {
        AdmissionController { options, slots_in_use: Mutex::new(0) }
    }

    pub async fn slots_in_use(&self) -> usize {
        *self.slots_in_use.lock().await
    }

    /// Attempts to reserve `job_slots` slots, blocking first while the load-average gate is
    /// engaged. Branch order (admit, admit-oversize, reject-permanent, reject-transient) matches
    /// the original `reserveSlots`: the soft-limit branch is checked before the hard-limit
    /// rejection, never both.
    pub async fn reserve(&self, job_slots: u32) -> Admission {
        loop {
            if !self.options.load_control {
                break;
            }
            let slots_in_use = *self.slots_in_use.lock().await;
            // The ">1" (not ">=1") guard prevents deadlock when a single worker already holds
            // the pool open: that worker must be allowed to make progress regardless of load.
            if slots_in_use > 1 && System::new().load_average().one >= self.options.average_load {
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
            break;
        }

        let mut slots_in_use = self.slots_in_use.lock().await;
        let available = self.options.available_slots();
        let job_slots = job_slots as usize;

        if *slots_in_use + job_slots <= available {
            *slots_in_use += job_slots;
            return Admission::Admit;
        }
        if job_slots > available {
            if !self.options.hard_limit() {
                *slots_in_use += job_slots;
                return Admission::AdmitOversize;
            }
            return Admission::RejectPermanent;
        }
        Admission::RejectTransient
    }

    /// Releases slots previously reserved by a successful `reserve`. Floored at zero.
    pub async fn release(&self, job_slots: u32) {
        let mut slots_in_use = self.slots_in_use.lock().await;
        *slots_in_use = slots_in_use.saturating_sub(job_slots as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(max_processes: Option<usize>) -> SchedulerOptions {
        SchedulerOptions { max_processes, load_control: false, ..Default::default() }
    }

    #[tokio::test]
    async fn admits_within_capacity() {
        let admission = AdmissionController::new(options(Some(4)));
        assert_eq!(admission.reserve(2).await, Admission::Admit);
        assert_eq!(admission.slots_in_use().await, 2);
    }

    #[tokio::test]
    async fn rejects_transiently_when_temporarily_full() {
        let admission = AdmissionController::new(options(Some(2)));
        assert_eq!(admission.reserve(2).await, Admission::Admit);
        assert_eq!(admission.reserve(1).await, Admission::RejectTransient);
        admission.release(2).await;
        assert_eq!(admission.reserve(1).await, Admission::Admit);
    }

    #[tokio::test]
    async fn hard_limit_rejects_oversize_permanently() {
        let admission = AdmissionController::new(options(Some(1)));
        assert_eq!(admission.reserve(4).await, Admission::RejectPermanent);
        assert_eq!(admission.slots_in_use().await, 0);
    }

    #[tokio::test]
    async fn soft_limit_admits_oversize() {
        let admission = AdmissionController::new(options(None));
        assert_eq!(admission.reserve(4).await, Admission::AdmitOversize);
        assert_eq!(admission.slots_in_use().await, 4);
    }

    #[tokio::test]
    async fn release_floors_at_zero() {
        let admission = AdmissionController::new(options(Some(4)));
        admission.release(10).await;
        assert_eq!(admission.slots_in_use().await, 0);
    }
}
