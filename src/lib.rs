//! solball - authoritative realtime server for a multiplayer 2D football game
//!
//! The server half runs one fixed-rate physics simulation per named room and
//! fans state snapshots out over WebSockets. The `client` half keeps a short
//! buffer of those snapshots and renders an interpolated view slightly behind
//! real time.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
