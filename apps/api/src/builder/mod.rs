// Builder sessions: the five-step flow, bounded version history, persistence
// through the record store, and the live-session cache with auto-save.

pub mod handlers;
pub mod history;
pub mod manager;
pub mod persistence;
pub mod session;
pub mod step;
