//! The conversation turn-taking core: one active channel at a time.

pub mod controller;
pub mod events;

pub use controller::TurnController;
pub use events::{ChannelState, Command, TurnEvent};
