//! Rule evaluation and temporal synchronization engine for disciplined
//!
//! This crate is the heart of disciplined, containing:
//! - Tick-driven countdowns
//! - Conditionals and their lifecycle state machines (countdown, plea)
//! - Rules (activator + protector) and capacity-bounded rule groups
//! - The daily allowance tracker and its persisted record
//! - Saved protector state, so pleas and countdowns survive restarts
//! - The synchronization driver that turns all of it into access decisions

mod allowance;
mod conditionals;
mod countdown;
mod engine;
mod events;
mod group;
mod protector_state;
mod rule;

pub use allowance::*;
pub use conditionals::*;
pub use countdown::*;
pub use engine::*;
pub use events::*;
pub use group::*;
pub use protector_state::*;
pub use rule::*;
