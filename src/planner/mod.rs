//! Budget plan generation and the interactive planner flow

pub mod generator;
pub mod prompt;
mod session;

pub use generator::{GeminiGenerator, OpenAiGenerator, PlanGenerator, from_config};
pub use session::PlannerSession;
