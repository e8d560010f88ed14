//! The Status value type.
//!
//! A [`Status`] is an immutable `(label, color, exit_code)` triple. The scheduler treats it as an
//! opaque enumeration: it never interprets the color or exit code itself, only the classification
//! predicates (`is_finished`, `is_fail`, etc.) that determine how a Job's lifecycle advances.

use std::fmt;

/// Display color for a status label. Purely cosmetic; consumed by front ends such as the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Color {
    Grey,
    Green,
    Red,
    Yellow,
    Cyan,
}

/// An immutable `(label, color, exit_code)` triple.
///
/// Statuses compare by label, matching the original tool's behavior of looking statuses up and
/// comparing them by name rather than by structural identity of the whole tuple.
#[derive(Clone, Copy, Debug, Eq)]
pub struct Status {
    pub label: &'static str,
    pub color: Color,
    pub exit_code: u8,
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

impl Status {
    pub const NA: Status = Status { label: "NA", color: Color::Grey, exit_code: 0x00 };
    pub const OK: Status = Status { label: "OK", color: Color::Green, exit_code: 0x00 };
    pub const SKIP: Status = Status { label: "SKIP", color: Color::Grey, exit_code: 0x00 };
    pub const SILENT: Status = Status { label: "SILENT", color: Color::Grey, exit_code: 0x00 };
    pub const FAIL: Status = Status { label: "FAIL", color: Color::Red, exit_code: 0x80 };
    pub const DIFF: Status = Status { label: "DIFF", color: Color::Yellow, exit_code: 0x81 };
    pub const DELETED: Status = Status { label: "DELETED", color: Color::Red, exit_code: 0x83 };
    pub const ERROR: Status = Status { label: "ERROR", color: Color::Red, exit_code: 0x80 };
    pub const TIMEOUT: Status = Status { label: "TIMEOUT", color: Color::Red, exit_code: 0x01 };
    pub const HOLD: Status = Status { label: "HOLD", color: Color::Cyan, exit_code: 0x00 };
    pub const QUEUED: Status = Status { label: "QUEUED", color: Color::Cyan, exit_code: 0x00 };
    pub const RUNNING: Status = Status { label: "RUNNING", color: Color::Cyan, exit_code: 0x00 };
    pub const FINISHED: Status = Status { label: "FINISHED", color: Color::Grey, exit_code: 0x00 };

    const ALL: &'static [Status] = &[
        Status::NA,
        Status::OK,
        Status::SKIP,
        Status::SILENT,
        Status::FAIL,
        Status::DIFF,
        Status::DELETED,
        Status::ERROR,
        Status::TIMEOUT,
        Status::HOLD,
        Status::QUEUED,
        Status::RUNNING,
        Status::FINISHED,
    ];

    /// Exit code is zero: the job did not fail, whether or not it actually ran.
    const EXIT_ZERO: &'static [Status] = &[Status::OK, Status::SKIP, Status::SILENT];

    /// Exit code is non-zero: the job is considered a failure for reporting purposes.
    const EXIT_NONZERO: &'static [Status] =
        &[Status::FAIL, Status::DIFF, Status::DELETED, Status::ERROR, Status::TIMEOUT];

    /// The job has not yet reached a terminal state.
    const PENDING: &'static [Status] = &[Status::HOLD, Status::QUEUED, Status::RUNNING];

    /// Look up one of the canonical statuses by its label.
    pub fn by_label(label: &str) -> Option<Status> {
        Self::ALL.iter().copied().find(|s| s.label == label)
    }

    /// A candidate status is valid if its field set matches `NA`'s shape (trivially true for this
    /// type, since `Status` has a fixed field set) or it is one of the canonical statuses.
    pub fn is_valid(&self) -> bool {
        Self::ALL.iter().any(|s| s == self)
    }

    pub fn is_exit_zero(&self) -> bool {
        Self::EXIT_ZERO.contains(self)
    }

    pub fn is_exit_nonzero(&self) -> bool {
        Self::EXIT_NONZERO.contains(self)
    }

    pub fn is_pending(&self) -> bool {
        Self::PENDING.contains(self)
    }

    /// Terminal for dependency purposes: finished, or any status with an exit code (zero or not),
    /// excluding the merely-pending group. This is the set that unblocks a Job's dependents.
    pub fn is_terminal(&self) -> bool {
        *self == Status::FINISHED || self.is_exit_zero() || self.is_exit_nonzero()
    }

    pub fn is_finished(&self) -> bool {
        *self == Status::FINISHED
    }

    pub fn is_running(&self) -> bool {
        *self == Status::RUNNING
    }

    pub fn is_hold(&self) -> bool {
        *self == Status::HOLD
    }

    pub fn is_fail(&self) -> bool {
        self.is_exit_nonzero()
    }

    pub fn is_silent(&self) -> bool {
        *self == Status::SILENT
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::NA
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_label_finds_canonical_statuses() {
        assert_eq!(Status::by_label("OK"), Some(Status::OK));
        assert_eq!(Status::by_label("TIMEOUT"), Some(Status::TIMEOUT));
        assert_eq!(Status::by_label("nonsense"), None);
    }

    #[test]
    fn exit_codes_are_bit_exact() {
        assert_eq!(Status::OK.exit_code, 0x00);
        assert_eq!(Status::FAIL.exit_code, 0x80);
        assert_eq!(Status::DIFF.exit_code, 0x81);
        assert_eq!(Status::DELETED.exit_code, 0x83);
        assert_eq!(Status::ERROR.exit_code, 0x80);
        assert_eq!(Status::TIMEOUT.exit_code, 0x01);
    }

    #[test]
    fn classification_sets_are_disjoint_and_complete_for_terminal_checks() {
        for s in Status::ALL {
            let classified = s.is_exit_zero() || s.is_exit_nonzero() || s.is_pending();
            assert!(classified || *s == Status::NA, "unclassified status: {s:?}");
        }
        assert!(Status::FAIL.is_fail());
        assert!(!Status::OK.is_fail());
        assert!(Status::SILENT.is_silent());
        assert!(!Status::OK.is_silent());
    }

    #[test]
    fn terminal_excludes_pending() {
        assert!(!Status::HOLD.is_terminal());
        assert!(!Status::QUEUED.is_terminal());
        assert!(!Status::RUNNING.is_terminal());
        assert!(Status::FINISHED.is_terminal());
        assert!(Status::SKIP.is_terminal());
        assert!(Status::TIMEOUT.is_terminal());
    }

    #[test]
    fn statuses_compare_by_label() {
        let copy = Status { label: "OK", color: Color::Red, exit_code: 5 };
        assert_eq!(copy, Status::OK);
    }

    #[test]
    fn is_valid_accepts_only_canonical_statuses() {
        assert!(Status::OK.is_valid());
        let bogus = Status { label: "NOT_A_REAL_STATUS", color: Color::Grey, exit_code: 0 };
        assert!(!bogus.is_valid());
    }
}
