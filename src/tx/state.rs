//! Transaction lifecycle.
//!
//! The state set is closed and every edge is listed in [`TxState::successors`].
//! Public operations check [`TxOperation::permitted_in`] before doing any work
//! and fail with `TxError::InvalidStateTransition` otherwise.

use crate::error::TxError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    /// Accepting staged edits
    Pending,
    Validating,
    /// Every staged file read and patched in memory
    Validated,
    Committing,
    Committed,
    RollingBack,
    /// Every rollback target restored
    RolledBack,
    /// Commit or rollback left at least one file unrestored
    Failed,
    Aborted,
}

impl TxState {
    /// States reachable in one step from `self`.
    pub fn successors(self) -> &'static [TxState] {
        use TxState::*;
        match self {
            Pending => &[Validating, Aborted],
            Validating => &[Validated, Pending],
            Validated => &[Validating, Committing, Aborted],
            Committing => &[Committed, RollingBack, Failed],
            Committed => &[RollingBack],
            RollingBack => &[RolledBack, Failed],
            RolledBack => &[Aborted],
            Failed => &[RollingBack, Aborted],
            Aborted => &[Aborted],
        }
    }

    pub fn can_transition_to(self, next: TxState) -> bool {
        self.successors().contains(&next)
    }

    /// Outcome states; the transaction never returns to staging from these.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TxState::Committed | TxState::RolledBack | TxState::Failed | TxState::Aborted
        )
    }

    /// States only observable while an operation is running.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            TxState::Validating | TxState::Committing | TxState::RollingBack
        )
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxState::Pending => "pending",
            TxState::Validating => "validating",
            TxState::Validated => "validated",
            TxState::Committing => "committing",
            TxState::Committed => "committed",
            TxState::RollingBack => "rolling_back",
            TxState::RolledBack => "rolled_back",
            TxState::Failed => "failed",
            TxState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Caller-facing operations subject to state checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOperation {
    Stage,
    Unstage,
    Clear,
    Validate,
    Commit,
    Rollback,
    Abort,
}

impl TxOperation {
    pub fn permitted_in(self, state: TxState) -> bool {
        use TxState::*;
        match self {
            TxOperation::Stage | TxOperation::Unstage | TxOperation::Clear => state == Pending,
            TxOperation::Validate | TxOperation::Commit => matches!(state, Pending | Validated),
            TxOperation::Rollback => matches!(state, Committed | Failed),
            TxOperation::Abort => state != Committed && !state.is_transient(),
        }
    }

    pub(crate) fn check(self, id: &str, state: TxState) -> Result<(), TxError> {
        if self.permitted_in(state) {
            Ok(())
        } else {
            Err(TxError::InvalidStateTransition {
                id: id.to_string(),
                operation: self,
                state,
            })
        }
    }
}

impl fmt::Display for TxOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxOperation::Stage => "stage",
            TxOperation::Unstage => "unstage",
            TxOperation::Clear => "clear",
            TxOperation::Validate => "validate",
            TxOperation::Commit => "commit",
            TxOperation::Rollback => "rollback",
            TxOperation::Abort => "abort",
        };
        f.write_str(name)
    }
}
