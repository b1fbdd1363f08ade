//! The realtime conversation relay: presence tracking, message persistence,
//! and per-connection event dispatch.

pub mod conversation;
pub mod engine;
pub mod presence;
pub mod store;
