use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// One reminder step of a cycle. Declaration order is firing order, and also
/// the tie-break when two phases are scheduled for the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Early,
    Due,
    Late,
    Deadline,
}

impl Phase {
    pub fn all() -> &'static [Phase] {
        &[Phase::Early, Phase::Due, Phase::Late, Phase::Deadline]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Phase> {
        Phase::all().get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Early => "early",
            Phase::Due => "due",
            Phase::Late => "late",
            Phase::Deadline => "deadline",
        }
    }

    /// The cycle state reached once this phase has fired.
    pub fn warned_state(self) -> CycleState {
        match self {
            Phase::Early => CycleState::EarlyWarned,
            Phase::Due => CycleState::DueWarned,
            Phase::Late => CycleState::LateWarned,
            Phase::Deadline => CycleState::Expired,
        }
    }

    fn headline(self) -> &'static str {
        match self {
            Phase::Early => "Standups are due soon.",
            Phase::Due => "Standups are due!",
            Phase::Late => "Standups are late!",
            Phase::Deadline => "The deadline for standups is now. You lose the game!",
        }
    }

    /// Reminder text for this phase naming every missing member, in the
    /// order given.
    pub fn reminder_message(self, missing: &[String]) -> String {
        format!("{} ({})", self.headline(), missing.join(", "))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "early" => Ok(Phase::Early),
            "due" => Ok(Phase::Due),
            "late" => Ok(Phase::Late),
            "deadline" => Ok(Phase::Deadline),
            _ => Err(format!("unknown phase: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// CycleState
// ---------------------------------------------------------------------------

/// Where the current cycle stands. Advances only on timer firings:
///
/// ```text
/// Idle -> EarlyWarned -> DueWarned -> LateWarned -> Expired -> (reset) -> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Idle,
    EarlyWarned,
    DueWarned,
    LateWarned,
    Expired,
}

impl CycleState {
    /// The phase expected to fire next from this state.
    pub fn expected_phase(self) -> Option<Phase> {
        match self {
            CycleState::Idle => Some(Phase::Early),
            CycleState::EarlyWarned => Some(Phase::Due),
            CycleState::DueWarned => Some(Phase::Late),
            CycleState::LateWarned => Some(Phase::Deadline),
            CycleState::Expired => None,
        }
    }

    /// True if `phase` firing now keeps the cycle moving forward.
    pub fn accepts(self, phase: Phase) -> bool {
        self.expected_phase() == Some(phase)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::EarlyWarned => "early_warned",
            CycleState::DueWarned => "due_warned",
            CycleState::LateWarned => "late_warned",
            CycleState::Expired => "expired",
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StatusCategory
// ---------------------------------------------------------------------------

/// Category of a status line. The discriminant is the `state` column stored
/// in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Completed,
    #[serde(rename = "inprogress")]
    InProgress,
    Impediments,
}

impl StatusCategory {
    pub fn all() -> &'static [StatusCategory] {
        &[
            StatusCategory::Completed,
            StatusCategory::InProgress,
            StatusCategory::Impediments,
        ]
    }

    pub fn index(self) -> i64 {
        self as i64
    }

    pub fn from_index(i: i64) -> Option<StatusCategory> {
        usize::try_from(i)
            .ok()
            .and_then(|i| StatusCategory::all().get(i).copied())
    }

    /// Key used by the web form and the JSON history payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCategory::Completed => "completed",
            StatusCategory::InProgress => "inprogress",
            StatusCategory::Impediments => "impediments",
        }
    }

    /// Prefix written in front of every line of this category.
    pub fn label(self) -> &'static str {
        match self {
            StatusCategory::Completed => "Completed",
            StatusCategory::InProgress => "In progress",
            StatusCategory::Impediments => "Impediments",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
