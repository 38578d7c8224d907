//! Amma Server - authoritative server for a shared 2D world
//!
//! Clients connect over WebSocket and speak a fixed-layout binary protocol
//! ([`ws::protocol`]). Connection tasks only queue events; a single tick loop
//! ([`game::TickLoop`]) reconciles them, broadcasts the resulting deltas and
//! integrates movement at a fixed rate.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
