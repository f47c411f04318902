//! Mutation lifecycle.

use std::fmt;

/// Stage of a single mutation run.
///
/// ```text
/// Pending -> Authorizing -> Validating -> Versioning -> Committing -> Committed
///                 \              \             \             \
///                  +-> Failed     +-> Failed    +-> Conflict  +-> Conflict | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationStage {
    /// Created, nothing checked yet.
    Pending,
    /// Permission checks are running.
    Authorizing,
    /// The payload is being validated.
    Validating,
    /// The expected version is being compared and the next one computed.
    Versioning,
    /// The record and history entry are being written.
    Committing,
    /// The mutation is durable.
    Committed,
    /// Another writer got there first.
    Conflict,
    /// Denied, invalid, or a collaborator failed.
    Failed,
}

impl MutationStage {
    /// Returns true once the run can no longer change.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MutationStage::Committed | MutationStage::Conflict | MutationStage::Failed
        )
    }

    /// Returns true if the lifecycle allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: MutationStage) -> bool {
        use MutationStage::*;
        match (self, next) {
            (Pending, Authorizing)
            | (Authorizing, Validating)
            | (Validating, Versioning)
            | (Versioning, Committing)
            | (Committing, Committed) => true,
            (Versioning | Committing, Conflict) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MutationStage::Pending => "pending",
            MutationStage::Authorizing => "authorizing",
            MutationStage::Validating => "validating",
            MutationStage::Versioning => "versioning",
            MutationStage::Committing => "committing",
            MutationStage::Committed => "committed",
            MutationStage::Conflict => "conflict",
            MutationStage::Failed => "failed",
        }
    }
}

impl fmt::Display for MutationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::MutationStage::*;
    use super::*;

    #[test]
    fn happy_path_is_linear() {
        let path = [Pending, Authorizing, Validating, Versioning, Committing, Committed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!Pending.can_transition_to(Validating));
        assert!(!Committing.can_transition_to(Versioning));
    }

    #[test]
    fn conflict_only_from_versioning_or_commit() {
        assert!(Versioning.can_transition_to(Conflict));
        assert!(Committing.can_transition_to(Conflict));
        assert!(!Authorizing.can_transition_to(Conflict));
        assert!(!Validating.can_transition_to(Conflict));
    }

    #[test]
    fn terminal_stages_are_final() {
        for stage in [Committed, Conflict, Failed] {
            assert!(stage.is_terminal());
            assert!(!stage.can_transition_to(Failed));
            assert!(!stage.can_transition_to(Pending));
        }
        assert!(Authorizing.can_transition_to(Failed));
    }
}
