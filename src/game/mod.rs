//! Game simulation modules

pub mod kick;
pub mod r#match;
pub mod physics;
pub mod room;
pub mod snapshot;

pub use r#match::{MatchRules, MatchState};
pub use room::{Room, RoomCommand, RoomHandle, RoomRegistry, RoomTask};
