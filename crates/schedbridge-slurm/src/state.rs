//! Job lifecycle states as stored by slurmdbd.

use serde::{Deserialize, Serialize};

/// Slurm job state.
///
/// The accounting store keeps the state as a small integer code:
/// - 0: Pending
/// - 1: Running
/// - 2: Suspended
/// - 3: Completed
/// - 4: Cancelled
/// - 5: Failed
/// - 6: Timeout
/// - 7: Node failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Job is queued and waiting for resources.
    Pending,
    /// Job is currently running.
    Running,
    /// Job has been suspended.
    Suspended,
    /// Job finished with exit code zero.
    Completed,
    /// Job was cancelled by a user or administrator.
    #[serde(alias = "CANCELED")]
    Cancelled,
    /// Job finished with a non-zero exit code.
    Failed,
    /// Job reached its time limit.
    Timeout,
    /// Job terminated because of a node failure.
    NodeFail,
}

/// Mask selecting the base state from a stored state word; higher bits are flags.
pub const STATE_BASE_MASK: i64 = 0xff;

impl JobState {
    pub const ALL: [JobState; 8] = [
        JobState::Pending,
        JobState::Running,
        JobState::Suspended,
        JobState::Completed,
        JobState::Cancelled,
        JobState::Failed,
        JobState::Timeout,
        JobState::NodeFail,
    ];

    /// Classify a stored state code. Codes outside 0..=7 are not job states.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(JobState::Pending),
            1 => Some(JobState::Running),
            2 => Some(JobState::Suspended),
            3 => Some(JobState::Completed),
            4 => Some(JobState::Cancelled),
            5 => Some(JobState::Failed),
            6 => Some(JobState::Timeout),
            7 => Some(JobState::NodeFail),
            _ => None,
        }
    }

    /// Classify a stored state word, ignoring flag bits.
    pub fn from_stored(word: i64) -> Option<Self> {
        Self::from_code(word & STATE_BASE_MASK)
    }

    /// Stored state code.
    pub fn code(&self) -> i64 {
        match self {
            JobState::Pending => 0,
            JobState::Running => 1,
            JobState::Suspended => 2,
            JobState::Completed => 3,
            JobState::Cancelled => 4,
            JobState::Failed => 5,
            JobState::Timeout => 6,
            JobState::NodeFail => 7,
        }
    }

    /// Presentation label. `CANCELLED` is the canonical spelling.
    pub fn label(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Suspended => "SUSPENDED",
            JobState::Completed => "COMPLETED",
            JobState::Cancelled => "CANCELLED",
            JobState::Failed => "FAILED",
            JobState::Timeout => "TIMEOUT",
            JobState::NodeFail => "NODE_FAIL",
        }
    }

    /// Parse a label. Accepts `CANCELED` as an input alias of `CANCELLED`
    /// and the trailing `+` squeue appends to `CANCELLED by <uid>` states.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().trim_end_matches('+').to_ascii_uppercase();
        let word = label.split_whitespace().next().unwrap_or("");
        match word {
            "PENDING" | "PD" => Some(JobState::Pending),
            "RUNNING" | "R" => Some(JobState::Running),
            "SUSPENDED" | "S" => Some(JobState::Suspended),
            "COMPLETED" | "CD" => Some(JobState::Completed),
            "CANCELLED" | "CANCELED" | "CA" => Some(JobState::Cancelled),
            "FAILED" | "F" => Some(JobState::Failed),
            "TIMEOUT" | "TO" => Some(JobState::Timeout),
            "NODE_FAIL" | "NF" => Some(JobState::NodeFail),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            JobState::Pending | JobState::Running | JobState::Suspended
        )
    }

    /// States whose freshest view lives in the controller rather than the store.
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Label for a raw state code, `None` for unknown codes.
pub fn derive_label(code: i64) -> Option<&'static str> {
    JobState::from_code(code).map(|s| s.label())
}

/// Stored code for a presentation label.
pub fn state_id_of(label: &str) -> Option<i64> {
    JobState::from_label(label).map(|s| s.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_table() {
        let expected = [
            (0, "PENDING"),
            (1, "RUNNING"),
            (2, "SUSPENDED"),
            (3, "COMPLETED"),
            (4, "CANCELLED"),
            (5, "FAILED"),
            (6, "TIMEOUT"),
            (7, "NODE_FAIL"),
        ];
        for (code, label) in expected {
            assert_eq!(derive_label(code), Some(label));
            assert_eq!(state_id_of(label), Some(code));
        }
        assert_eq!(derive_label(8), None);
        assert_eq!(derive_label(-1), None);
    }

    #[test]
    fn test_cancelled_spelling() {
        // Output always uses the double-l spelling; the single-l form is input only.
        assert_eq!(JobState::Cancelled.label(), "CANCELLED");
        assert_eq!(state_id_of("CANCELED"), Some(4));
        assert_eq!(derive_label(state_id_of("CANCELED").unwrap()), Some("CANCELLED"));
        assert_eq!(JobState::from_label("CANCELLED by 1001"), Some(JobState::Cancelled));
        assert_eq!(JobState::from_label("CANCELLED+"), Some(JobState::Cancelled));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Suspended.is_terminal());
        for state in &JobState::ALL[3..] {
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn test_serde_labels() {
        let json = serde_json::to_string(&JobState::NodeFail).unwrap();
        assert_eq!(json, "\"NODE_FAIL\"");
        let state: JobState = serde_json::from_str("\"PENDING\"").unwrap();
        assert_eq!(state, JobState::Pending);

        let state: JobState = serde_json::from_str("\"CANCELED\"").unwrap();
        assert_eq!(state, JobState::Cancelled);
        assert_eq!(serde_json::to_string(&state).unwrap(), "\"CANCELLED\"");
    }

    #[test]
    fn test_stored_state_flags_are_ignored() {
        assert_eq!(JobState::from_stored(0x400), Some(JobState::Pending));
        assert_eq!(JobState::from_stored(0x8000 | 1), Some(JobState::Running));
        assert_eq!(JobState::from_stored(9), None);
    }
}
