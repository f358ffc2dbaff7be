//! Budget Assistant - voice-enabled budget planning
//!
//! This library provides the core of the budget assistant:
//! - Plan form state and validation with spoken input routing
//! - Budget plan generation through a hosted LLM
//! - Plan read-back through text-to-speech, buffered or streamed
//! - Per-user plan storage
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                       │
//! │        HTTP API (browser)  │  CLI (terminal)        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Planner                           │
//! │   Form  │  Speech bridge  │  Generator  │  Playback │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │         Plan store (SQLite or per-user files)       │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod budget;
pub mod config;
pub mod db;
pub mod error;
pub mod planner;
pub mod render;
pub mod store;
pub mod voice;

pub use budget::form::{InputTarget, PlanForm};
pub use budget::{BudgetInput, Expense, Plan, PlanDraft, PlanId, SharingInfo};
pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use planner::{PlanGenerator, PlannerSession};
pub use store::{FilePlanStore, Identity, PlanStore, SqlitePlanStore};
