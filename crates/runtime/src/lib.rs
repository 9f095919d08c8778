//! The turn orchestrator: glues validation, the agent pipeline, search, and
//! session persistence into a single `handle_turn` entry point.

mod cart;
mod envelope;
mod orchestrator;
mod research;

pub use cart::{CartService, InMemoryCart, UserAction};
pub use envelope::{ResponseType, StageTiming, Trace, TurnResult};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TurnError, TurnRequest};
pub use research::ResearchService;
