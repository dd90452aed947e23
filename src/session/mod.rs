//! Session orchestration
//!
//! This module sequences capture → resolve → transcribe → present:
//! - `SessionStateMachine` consumes a single event queue and applies one
//!   transition function per event
//! - `UiState` is the single authoritative value a display layer renders
//! - `SessionHandle` is the cheap clonable surface for user actions

mod events;
mod machine;
mod state;

pub use events::SessionEvent;
pub use machine::{SessionHandle, SessionStateMachine};
pub use state::UiState;
