//! The mutation pipeline.

use super::context::MutationContext;
use super::state::MutationStage;
use crate::actor::Actor;
use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::error::{HistoryError, MutationError, MutationResult};
use crate::history::{apply_inverse, diff_fields, ChangeKind, Diff, History, HistoryEntry, HistoryStore, GENESIS_DIGEST};
use crate::permission::{DeniedReason, Operation, PermissionEngine};
use crate::registry::{EntityDef, EntityRegistry};
use crate::validation::{SchemaValidator, ValidationIssue, ValidationMode, ValidationOutcome, Validator};
use entigate_model::{Fields, ResourceId, Version, VersionedRecord};
use entigate_storage::{RecordStore, RecordWrite};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Authorizes, validates, versions, commits, and audits mutations.
///
/// Every mutation walks the same stages (see [`MutationStage`]). Nothing
/// is locked while authorizing or validating: concurrent writers to one
/// resource race freely and the compare-and-set at commit picks the
/// winner. Losers get [`MutationError::VersionConflict`] and must re-fetch
/// before retrying.
///
/// The only lock is held across the store commit and the history append,
/// so a resource's history grows in the same order as its versions.
///
/// ## Example
///
/// ```
/// use entigate_core::{
///     Actor, EntityDef, EntityPermissionConfig, EntityRegistry, FieldDef, FieldKind,
///     MutationPipeline, Operation, PipelineConfig, Role,
/// };
/// use entigate_model::{Fields, Value, Version};
/// use entigate_storage::InMemoryRecordStore;
/// use std::sync::Arc;
///
/// let registry = EntityRegistry::builder()
///     .entity(
///         EntityDef::new("note")
///             .field(FieldDef::new("body", FieldKind::Text).required())
///             .permissions(EntityPermissionConfig::new().grant(Role::User, Operation::ALL)),
///     )
///     .build()?;
/// let pipeline = MutationPipeline::new(
///     PipelineConfig::default(),
///     Arc::new(registry),
///     InMemoryRecordStore::new(),
/// );
///
/// let actor = Actor::new("alice", Role::User);
/// let mut body = Fields::new();
/// body.insert("body".into(), Value::from("hello"));
/// let note = pipeline.insert(&actor, "note", body)?;
/// assert_eq!(note.version, Version::INITIAL);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct MutationPipeline<S: RecordStore> {
    config: PipelineConfig,
    registry: Arc<EntityRegistry>,
    engine: PermissionEngine,
    validator: Arc<dyn Validator>,
    store: S,
    history: Arc<HistoryStore>,
    clock: Arc<dyn Clock>,
}

impl<S: RecordStore> MutationPipeline<S> {
    /// Creates a pipeline with schema validation, the system clock, and an
    /// empty history.
    pub fn new(config: PipelineConfig, registry: Arc<EntityRegistry>, store: S) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let validator =
            SchemaValidator::new().reject_unknown_fields(config.reject_unknown_fields);
        Self {
            config,
            registry,
            engine: PermissionEngine::with_clock(Arc::clone(&clock)),
            validator: Arc::new(validator),
            store,
            history: Arc::new(HistoryStore::new()),
            clock,
        }
    }

    /// Replaces the validator.
    #[must_use]
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Replaces the clock used for permission checks and timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.engine = PermissionEngine::with_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// Shares an existing history store.
    ///
    /// Commits are serialized by the history store, so pipelines sharing
    /// one over the same record store never interleave their writes.
    #[must_use]
    pub fn with_history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = history;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the entity registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Returns the permission engine.
    #[must_use]
    pub fn engine(&self) -> &PermissionEngine {
        &self.engine
    }

    /// Returns the history store.
    #[must_use]
    pub fn history_store(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Returns the record store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a resource at version 1.
    ///
    /// # Errors
    ///
    /// Returns an authorization error if `actor` may not create the
    /// resource or set one of the payload fields,
    /// [`MutationError::ValidationFailed`] for an invalid payload, and
    /// [`MutationError::UnknownEntity`] for an unregistered entity.
    pub fn insert(&self, actor: &Actor, entity: &str, payload: Fields) -> MutationResult<VersionedRecord> {
        let def = self.entity(entity)?;
        let mut ctx = self.context(actor, def, ChangeKind::Insert, ResourceId::new(), Version::NONE);
        let result = self.insert_inner(&mut ctx, def, payload);
        finish(&mut ctx, result)
    }

    fn insert_inner(
        &self,
        ctx: &mut MutationContext,
        def: &EntityDef,
        payload: Fields,
    ) -> MutationResult<VersionedRecord> {
        ctx.advance(MutationStage::Authorizing);
        self.authorize(ctx, def, Some(&payload), payload.keys())?;

        ctx.advance(MutationStage::Validating);
        self.validate(def, &payload, ValidationMode::Insert)?;

        ctx.advance(MutationStage::Versioning);
        let diff = diff_fields(&Fields::new(), &payload);
        let record = VersionedRecord::new(ctx.resource_id, Version::INITIAL, payload, ctx.timestamp);

        self.commit(ctx, RecordWrite::Put(record.clone()), None, record.version, diff, None)?;
        Ok(record)
    }

    /// Applies `patch` on top of the resource at `expected`.
    ///
    /// Fields absent from the patch are kept; a `Null` value stores null.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::VersionConflict`] if the resource is no
    /// longer at `expected`, [`MutationError::FieldPermissionDenied`] if
    /// the patch touches fields the actor may not edit, and
    /// [`MutationError::NotFound`] if the resource does not exist.
    pub fn update(
        &self,
        actor: &Actor,
        entity: &str,
        id: ResourceId,
        patch: Fields,
        expected: Version,
    ) -> MutationResult<VersionedRecord> {
        let def = self.entity(entity)?;
        let mut ctx = self.context(actor, def, ChangeKind::Update, id, expected);
        let result = self.update_inner(&mut ctx, def, patch);
        finish(&mut ctx, result)
    }

    fn update_inner(
        &self,
        ctx: &mut MutationContext,
        def: &EntityDef,
        patch: Fields,
    ) -> MutationResult<VersionedRecord> {
        ctx.advance(MutationStage::Authorizing);
        let current = self.fetch(def, ctx.resource_id)?;
        self.authorize(ctx, def, Some(&current.fields), patch.keys())?;

        ctx.advance(MutationStage::Validating);
        if let Some(limit) = self.config.max_patch_fields {
            if patch.len() > limit {
                return Err(MutationError::ValidationFailed {
                    issues: vec![ValidationIssue::new(
                        "",
                        format!("patch touches {} fields, limit is {limit}", patch.len()),
                    )],
                });
            }
        }
        self.validate(
            def,
            &patch,
            ValidationMode::Patch {
                current: &current.fields,
            },
        )?;

        ctx.advance(MutationStage::Versioning);
        check_version(ctx, &current)?;
        let mut next = current.fields.clone();
        next.extend(patch);
        let diff = diff_fields(&current.fields, &next);
        if diff.is_empty() && self.config.skip_noop_updates {
            debug!(entity = %ctx.entity, id = %ctx.resource_id, version = %current.version, "no-op update skipped");
            return Ok(current);
        }

        let record = current.successor(next, ctx.timestamp);
        self.commit(ctx, RecordWrite::Put(record.clone()), Some(current.version), record.version, diff, None)?;
        Ok(record)
    }

    /// Removes the resource at `expected`.
    ///
    /// The live record disappears; its history, ending in a `Delete`
    /// entry, is kept.
    ///
    /// # Errors
    ///
    /// Same as [`update`](Self::update), authorized as `Delete`.
    pub fn delete(&self, actor: &Actor, entity: &str, id: ResourceId, expected: Version) -> MutationResult<()> {
        let def = self.entity(entity)?;
        let mut ctx = self.context(actor, def, ChangeKind::Delete, id, expected);
        let result = self.delete_inner(&mut ctx, def);
        finish(&mut ctx, result)
    }

    fn delete_inner(&self, ctx: &mut MutationContext, def: &EntityDef) -> MutationResult<()> {
        ctx.advance(MutationStage::Authorizing);
        let current = self.fetch(def, ctx.resource_id)?;
        self.authorize(ctx, def, Some(&current.fields), std::iter::empty())?;

        ctx.advance(MutationStage::Validating);
        ctx.advance(MutationStage::Versioning);
        check_version(ctx, &current)?;
        let diff = diff_fields(&current.fields, &Fields::new());

        self.commit(ctx, RecordWrite::Delete, Some(current.version), current.version.next(), diff, None)
    }

    /// Restores the fields the resource had at `target`.
    ///
    /// Rollback never rewrites history: it commits a new version whose
    /// fields equal those at `target`, recorded as a `Rollback` entry.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::RollbackDisabled`] for entities that do not
    /// allow rollback, [`MutationError::RollbackTargetNotFound`] unless
    /// `target` is an earlier recorded version, and an authorization error
    /// unless the actor may update every field the rollback changes.
    pub fn rollback(
        &self,
        actor: &Actor,
        entity: &str,
        id: ResourceId,
        target: Version,
    ) -> MutationResult<VersionedRecord> {
        let def = self.entity(entity)?;
        if !def.mutation_config().rollback_enabled {
            return Err(MutationError::RollbackDisabled {
                entity: def.name().clone(),
            });
        }
        let mut ctx = self.context(actor, def, ChangeKind::Rollback, id, Version::NONE);
        let result = self.rollback_inner(&mut ctx, def, target);
        finish(&mut ctx, result)
    }

    fn rollback_inner(
        &self,
        ctx: &mut MutationContext,
        def: &EntityDef,
        target: Version,
    ) -> MutationResult<VersionedRecord> {
        ctx.advance(MutationStage::Authorizing);
        let current = self.fetch(def, ctx.resource_id)?;
        ctx.expected_version = current.version;

        let history = self.history.read(&ctx.entity, ctx.resource_id);
        if history.latest_version() != current.version {
            return Err(HistoryError::Diverged {
                entity: ctx.entity.clone(),
                id: ctx.resource_id,
                live: current.version,
                recorded: history.latest_version(),
            }
            .into());
        }
        if target >= current.version || history.get(target).is_none() {
            return Err(MutationError::RollbackTargetNotFound {
                target,
                current: current.version,
            });
        }

        let mut restored = current.fields.clone();
        for entry in history.iter().rev().take_while(|entry| entry.version > target) {
            apply_inverse(&mut restored, &entry.diff);
        }
        let diff = diff_fields(&current.fields, &restored);
        self.authorize(ctx, def, Some(&current.fields), diff.keys())?;

        ctx.advance(MutationStage::Validating);
        let written: Fields = diff
            .iter()
            .filter_map(|(name, change)| change.after.clone().map(|value| (name.clone(), value)))
            .collect();
        self.validate(
            def,
            &written,
            ValidationMode::Patch {
                current: &current.fields,
            },
        )?;

        ctx.advance(MutationStage::Versioning);
        let record = current.successor(restored, ctx.timestamp);
        self.commit(
            ctx,
            RecordWrite::Put(record.clone()),
            Some(current.version),
            record.version,
            diff,
            Some(target),
        )?;
        Ok(record)
    }

    /// Reads a resource, projected onto the fields `actor` may see.
    ///
    /// # Errors
    ///
    /// Returns an authorization error if `actor` may not read the resource
    /// and [`MutationError::NotFound`] if it does not exist.
    pub fn get(&self, actor: &Actor, entity: &str, id: ResourceId) -> MutationResult<VersionedRecord> {
        let def = self.entity(entity)?;
        let mut record = self.fetch(def, id)?;
        let decision = self.engine.check(actor, def, Operation::Read, Some(&record.fields));
        if !decision.allowed {
            return Err(denial(Operation::Read, decision.denied_reason));
        }
        record.fields.retain(|field, _| !decision.denied_fields.contains(field));
        Ok(record)
    }

    /// Returns the audit history of a resource.
    ///
    /// Reading history requires `Read` on the resource. For deleted
    /// resources the check runs against the fields they had when deleted.
    ///
    /// # Errors
    ///
    /// Returns an authorization error if `actor` may not read the resource
    /// and [`MutationError::NotFound`] if it never existed.
    pub fn history(&self, actor: &Actor, entity: &str, id: ResourceId) -> MutationResult<History> {
        let def = self.entity(entity)?;
        let history = self.history.read(def.name(), id);
        let resource = match self.store.get(def.name(), id)? {
            Some(record) => record.fields,
            None => match history.latest() {
                Some(entry) if entry.kind == ChangeKind::Delete => {
                    let mut fields = Fields::new();
                    apply_inverse(&mut fields, &entry.diff);
                    fields
                }
                Some(entry) => {
                    return Err(HistoryError::Diverged {
                        entity: def.name().clone(),
                        id,
                        live: Version::NONE,
                        recorded: entry.version,
                    }
                    .into());
                }
                None => {
                    return Err(MutationError::NotFound {
                        entity: def.name().clone(),
                        id,
                    });
                }
            },
        };

        let decision = self.engine.check(actor, def, Operation::Read, Some(&resource));
        if !decision.allowed {
            return Err(denial(Operation::Read, decision.denied_reason));
        }
        Ok(history)
    }

    fn entity(&self, name: &str) -> MutationResult<&EntityDef> {
        self.registry
            .get(name)
            .map(|def| &**def)
            .ok_or_else(|| MutationError::UnknownEntity {
                entity: name.to_string(),
            })
    }

    fn context(
        &self,
        actor: &Actor,
        def: &EntityDef,
        kind: ChangeKind,
        id: ResourceId,
        expected: Version,
    ) -> MutationContext {
        MutationContext::new(actor.clone(), def.name().clone(), kind, id, expected, self.clock.now())
    }

    fn fetch(&self, def: &EntityDef, id: ResourceId) -> MutationResult<VersionedRecord> {
        self.store
            .get(def.name(), id)?
            .ok_or_else(|| MutationError::NotFound {
                entity: def.name().clone(),
                id,
            })
    }

    fn authorize<'a>(
        &self,
        ctx: &MutationContext,
        def: &EntityDef,
        resource: Option<&Fields>,
        touched: impl Iterator<Item = &'a String>,
    ) -> MutationResult<()> {
        let operation = ctx.operation();
        let decision = self.engine.check_at(&ctx.actor, def, operation, resource, ctx.timestamp);
        if !decision.allowed {
            return Err(denial(operation, decision.denied_reason));
        }

        let fields: Vec<String> = touched
            .filter(|field| decision.denied_fields.contains(*field))
            .cloned()
            .collect();
        if !fields.is_empty() {
            return Err(MutationError::FieldPermissionDenied { operation, fields });
        }
        Ok(())
    }

    fn validate(&self, def: &EntityDef, payload: &Fields, mode: ValidationMode<'_>) -> MutationResult<()> {
        match self.validator.validate(def, payload, mode) {
            ValidationOutcome::Valid => Ok(()),
            ValidationOutcome::Invalid(issues) => Err(MutationError::ValidationFailed { issues }),
        }
    }

    fn commit(
        &self,
        ctx: &mut MutationContext,
        write: RecordWrite,
        expected: Option<Version>,
        version: Version,
        diff: Diff,
        rollback_of: Option<Version>,
    ) -> MutationResult<()> {
        ctx.advance(MutationStage::Committing);
        let _guard = self.history.lock_writes();

        if self.history.is_poisoned(&ctx.entity, ctx.resource_id) {
            return Err(HistoryError::Poisoned {
                entity: ctx.entity.clone(),
                id: ctx.resource_id,
            }
            .into());
        }

        let history = self.history.read(&ctx.entity, ctx.resource_id);
        let recorded = history.latest_version();
        let actual = self
            .store
            .get(&ctx.entity, ctx.resource_id)?
            .map_or(Version::NONE, |record| record.version);
        let in_sync = if actual == Version::NONE {
            recorded == Version::NONE || history.is_deleted()
        } else {
            actual == recorded
        };
        if !in_sync {
            return Err(HistoryError::Diverged {
                entity: ctx.entity.clone(),
                id: ctx.resource_id,
                live: actual,
                recorded,
            }
            .into());
        }
        if actual != expected.unwrap_or(Version::NONE) {
            return Err(MutationError::VersionConflict {
                expected: ctx.expected_version,
                actual,
            });
        }
        if version != recorded.next() {
            return Err(HistoryError::Diverged {
                entity: ctx.entity.clone(),
                id: ctx.resource_id,
                live: actual,
                recorded,
            }
            .into());
        }

        if !self.store.commit(&ctx.entity, ctx.resource_id, write, expected)? {
            let actual = self
                .store
                .get(&ctx.entity, ctx.resource_id)?
                .map_or(Version::NONE, |record| record.version);
            return Err(MutationError::VersionConflict {
                expected: ctx.expected_version,
                actual,
            });
        }

        let appended = self.history.append_locked(HistoryEntry {
            entity: ctx.entity.clone(),
            resource_id: ctx.resource_id,
            version,
            diff,
            actor_id: ctx.actor.id().clone(),
            timestamp: ctx.timestamp,
            kind: ctx.kind,
            request_id: ctx.request_id,
            rollback_of,
            digest: GENESIS_DIGEST,
        });
        if let Err(err) = appended {
            error!(
                request = %ctx.request_id,
                entity = %ctx.entity,
                id = %ctx.resource_id,
                %version,
                error = %err,
                "record committed without history entry"
            );
            return Err(err.into());
        }

        ctx.advance(MutationStage::Committed);
        info!(
            request = %ctx.request_id,
            entity = %ctx.entity,
            id = %ctx.resource_id,
            %version,
            kind = %ctx.kind,
            actor = %ctx.actor.id(),
            "mutation committed"
        );
        Ok(())
    }
}

impl<S: RecordStore> std::fmt::Debug for MutationPipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationPipeline")
            .field("config", &self.config)
            .field("entities", &self.registry.len())
            .finish_non_exhaustive()
    }
}

fn check_version(ctx: &MutationContext, current: &VersionedRecord) -> MutationResult<()> {
    if current.version == ctx.expected_version {
        Ok(())
    } else {
        Err(MutationError::VersionConflict {
            expected: ctx.expected_version,
            actual: current.version,
        })
    }
}

fn denial(operation: Operation, reason: Option<DeniedReason>) -> MutationError {
    MutationError::denied(operation, reason.unwrap_or(DeniedReason::Role))
}

fn finish<T>(ctx: &mut MutationContext, result: MutationResult<T>) -> MutationResult<T> {
    if let Err(err) = &result {
        if let MutationError::VersionConflict { expected, actual } = err {
            ctx.advance(MutationStage::Conflict);
            warn!(
                request = %ctx.request_id,
                entity = %ctx.entity,
                id = %ctx.resource_id,
                %expected,
                %actual,
                "version conflict"
            );
        } else {
            ctx.advance(MutationStage::Failed);
            if err.is_fatal() {
                error!(request = %ctx.request_id, entity = %ctx.entity, id = %ctx.resource_id, error = %err, "mutation failed");
            } else if err.is_authorization() {
                warn!(request = %ctx.request_id, entity = %ctx.entity, id = %ctx.resource_id, error = %err, "mutation denied");
            } else {
                debug!(request = %ctx.request_id, entity = %ctx.entity, id = %ctx.resource_id, error = %err, "mutation rejected");
            }
        }
    }
    result
}
