//! Explicit state machine for event moderation and lifecycle.
//!
//! This module implements a pure functional state machine deciding whether
//! an event is publicly visible. The design separates:
//! - **State**: What the system knows (`Event`)
//! - **Events**: What happened (`ModerationEvent`)
//! - **Effects**: What to do (`Effect`)
//! - **Transition**: Pure function `(Event, ModerationEvent, now) -> (Event, Vec<Effect>)`
//!
//! The store persists the new record; the interpreter executes the remaining
//! effects.

pub mod effect;
pub mod event;
pub mod interpreter;
pub mod repository;
pub mod state;
pub mod store;
pub mod transition;

pub use effect::*;
pub use event::*;
pub use state::*;
pub use transition::*;
