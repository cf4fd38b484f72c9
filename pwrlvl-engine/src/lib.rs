//! # pwrlvl-engine
//!
//! The task orchestrator. Each catalog entry is an [`Operation`] driven by its own
//! [`Controller`], which enforces single-flight starts, idempotent stops and guaranteed
//! cleanup. Routines reach shared state, the event bus, the process registry and the loot
//! store only through an [`OperationContext`].

pub mod context;
pub mod controller;
pub mod error;
pub mod loot;
pub mod operation;
pub mod operations;
pub mod orchestrator;
pub mod params;
pub mod progress;
pub mod settings;
pub mod tools;
pub mod wireless;

pub use context::{OperationContext, Services};
pub use controller::Controller;
pub use error::OperationError;
pub use loot::{Loot, LootError, LootFile};
pub use operation::Operation;
pub use orchestrator::Orchestrator;
pub use params::Params;
pub use progress::{level_for, Progress, ProgressStore, Tally};
pub use settings::EngineSettings;
pub use tools::{run_command, CommandOutput, ToolLocator};

pub mod prelude {
    pub use crate::context::*;
    pub use crate::error::*;
    pub use crate::operation::*;
    pub use crate::orchestrator::*;
    pub use crate::params::*;
}
