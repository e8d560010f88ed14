//! Scheduler configuration.

use std::time::Duration;

/// Tunables read once at construction and never mutated afterward.
///
/// Mirrors the original tool's option bag (`options.load`, `max_fails`, `valgrind_mode`, ...);
/// see the crate-level docs for where each field is read from in the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
    /// Soft ceiling on the 1-minute system load average. Admission blocks while this is exceeded
    /// and more than one slot is already in use.
    pub average_load: f64,
    /// `Some(n)` puts the scheduler in hard-limit mode with `n` slots; `None` is soft-limit mode
    /// with a nominal capacity of one slot (oversize jobs are admitted anyway, tagged `OVERSIZED`).
    pub max_processes: Option<usize>,
    /// Threshold after which a still-running job gets one long-running notice.
    pub min_report_time: Duration,
    /// Whether the load-average gate in `reserveSlots` is active at all.
    pub load_control: bool,
    /// Failure cap used when `valgrind_mode` is false.
    pub max_fails: usize,
    pub valgrind_mode: bool,
    /// Failure cap used instead of `max_fails` when `valgrind_mode` is true.
    pub valgrind_max_fails: usize,
}

impl SchedulerOptions {
    /// Capacity in slot units: the hard limit if configured, else the soft limit's nominal 1.
    pub fn available_slots(&self) -> usize {
        self.max_processes.unwrap_or(1)
    }

    pub fn hard_limit(&self) -> bool {
        self.max_processes.is_some()
    }

    pub fn max_failures(&self) -> usize {
        if self.valgrind_mode {
            self.valgrind_max_fails
        } else {
            self.max_fails
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        SchedulerOptions {
            average_load: 64.0,
            max_processes: None,
            min_report_time: Duration::from_secs(10),
            load_control: false,
            max_fails: usize::MAX,
            valgrind_mode: false,
            valgrind_max_fails: usize::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_limit_is_the_default() {
        let opts = SchedulerOptions::default();
        assert!(!opts.hard_limit());
        assert_eq!(opts.available_slots(), 1);
    }

    #[test]
    fn valgrind_mode_swaps_the_failure_cap() {
        let opts = SchedulerOptions { valgrind_mode: true, max_fails: 2, valgrind_max_fails: 40, ..Default::default() };
        assert_eq!(opts.max_failures(), 40);
    }
}
