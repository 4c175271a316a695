//! Interaction resolution: the login/consent prompt state machine, the grant
//! accumulator, and the session engine seam it finalizes through.

mod consent;
mod engine;
mod orchestrator;
mod types;
mod view;

pub use consent::{accumulate, ConsentDelta, Grant};
pub use engine::{EngineError, FinalizeRecord, MemorySessionEngine, SessionEngine, Submission};
pub use orchestrator::{InteractionError, InteractionService};
pub use types::{
    ConsentOutcome, FinalizeOptions, Finalized, GrantId, InteractionResult, LoginOutcome, PendingInteraction, Prompt,
    PromptKind, RequestParams, Resolution, SessionInfo, ABORTED_DESCRIPTION,
};
pub use view::{DebugEntries, DebugInfo, PromptView};
