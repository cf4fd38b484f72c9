//! # pwrlvl-core
//!
//! Shared machinery of the control plane. Everything here is synchronous and thread-based;
//! each component guards its own state with a lock held only around pure mutation.
//!
//! ### Key Submodules:
//! - `events`: immutable [`Event`] records and the bounded, fan-out [`EventBus`]
//! - `state`: the [`StateStore`] holding per-operation lifecycle phases and last results
//! - `process`: [`ProcessHandle`], an owned external process with terminate/kill escalation
//! - `registry`: the [`ProcessRegistry`] mapping operation roles to live processes

pub mod error;
pub mod events;
pub mod process;
pub mod registry;
pub mod state;

pub use error::{ProcessError, RegistryError, StateError};
pub use events::{BusStats, Event, EventBus, EventLevel, Recv, Subscription};
pub use process::{LineEvent, LineStream, ProcessHandle, ProcessSpec, ProcessStatus, Termination};
pub use registry::{process_key, ProcessRegistry};
pub use state::{OperationView, Phase, StateSnapshot, StateStore};

pub mod prelude {
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::process::*;
    pub use crate::registry::*;
    pub use crate::state::*;
}
