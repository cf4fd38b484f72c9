//! ## pwrlvl-core::events
//! **Bounded event log with best-effort fan-out to live subscribers**
//!
//! Producers (operation routines) never block: the log evicts its oldest entry at capacity
//! and each subscriber queue drops deliveries it has no room for.
//!
//! ### Components:
//! - `event`: the immutable [`Event`] record and its level tags
//! - `bus`: the [`EventBus`] and the consumer-side [`Subscription`]

pub mod bus;
pub mod event;

pub use bus::{BusStats, EventBus, Recv, Subscription};
pub use event::{Event, EventLevel};
