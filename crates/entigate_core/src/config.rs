//! Mutation pipeline configuration.

/// Configuration for a [`crate::MutationPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Whether payload fields the entity does not declare are rejected.
    pub reject_unknown_fields: bool,

    /// Whether an update that changes nothing returns the current record
    /// instead of committing an empty version.
    pub skip_noop_updates: bool,

    /// Maximum number of fields a single update may touch (`None` = no limit).
    pub max_patch_fields: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reject_unknown_fields: true,
            skip_noop_updates: false,
            max_patch_fields: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether unknown payload fields are rejected.
    #[must_use]
    pub const fn reject_unknown_fields(mut self, value: bool) -> Self {
        self.reject_unknown_fields = value;
        self
    }

    /// Sets whether no-op updates skip the commit.
    #[must_use]
    pub const fn skip_noop_updates(mut self, value: bool) -> Self {
        self.skip_noop_updates = value;
        self
    }

    /// Limits how many fields an update may touch.
    #[must_use]
    pub const fn max_patch_fields(mut self, limit: usize) -> Self {
        self.max_patch_fields = Some(limit);
        self
    }
}
