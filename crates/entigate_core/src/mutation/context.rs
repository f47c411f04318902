//! Per-request mutation context.

use super::state::MutationStage;
use crate::actor::Actor;
use crate::history::ChangeKind;
use crate::permission::Operation;
use entigate_model::{EntityName, RequestId, ResourceId, Timestamp, Version};
use tracing::{debug, warn};

/// Everything the pipeline knows about one mutation request.
///
/// Created at the start of a run and dropped at its end; never shared
/// between runs.
#[derive(Debug, Clone)]
pub struct MutationContext {
    /// Who is mutating.
    pub actor: Actor,
    /// The target entity.
    pub entity: EntityName,
    /// What kind of change this is.
    pub kind: ChangeKind,
    /// The target resource.
    pub resource_id: ResourceId,
    /// Version the caller based its change on; `NONE` for inserts.
    pub expected_version: Version,
    /// Unique request identifier.
    pub request_id: RequestId,
    /// When the request entered the pipeline.
    pub timestamp: Timestamp,
    stage: MutationStage,
}

impl MutationContext {
    /// Creates a context in the `Pending` stage with a fresh request id.
    pub fn new(
        actor: Actor,
        entity: EntityName,
        kind: ChangeKind,
        resource_id: ResourceId,
        expected_version: Version,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            actor,
            entity,
            kind,
            resource_id,
            expected_version,
            request_id: RequestId::new(),
            timestamp,
            stage: MutationStage::Pending,
        }
    }

    /// The operation authorized for this kind of change.
    ///
    /// A rollback writes fields like an update and is authorized as one.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self.kind {
            ChangeKind::Insert => Operation::Create,
            ChangeKind::Update | ChangeKind::Rollback => Operation::Update,
            ChangeKind::Delete => Operation::Delete,
        }
    }

    /// Returns the current stage.
    #[must_use]
    pub fn stage(&self) -> MutationStage {
        self.stage
    }

    /// Moves to the next stage.
    ///
    /// Illegal transitions are ignored; the run keeps its current stage.
    pub fn advance(&mut self, next: MutationStage) {
        if self.stage.can_transition_to(next) {
            debug!(
                request = %self.request_id,
                entity = %self.entity,
                id = %self.resource_id,
                from = %self.stage,
                to = %next,
                "mutation stage"
            );
            self.stage = next;
        } else {
            warn!(
                request = %self.request_id,
                from = %self.stage,
                to = %next,
                "illegal mutation stage transition ignored"
            );
        }
    }
}
