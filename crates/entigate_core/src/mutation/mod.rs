//! Versioned mutations.

mod context;
mod pipeline;
mod state;

pub use context::MutationContext;
pub use pipeline::MutationPipeline;
pub use state::MutationStage;
