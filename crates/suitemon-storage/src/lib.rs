//! Persistence layer for the polling engine.
//!
//! Two stores, each backed by its own SQLite database with WAL mode:
//!
//! - [`state_store`]: the two time-bounded alert-state tables (dedup and
//!   notification throttle), addressed as key-value rows so the backend can
//!   be swapped for a network key-value service without touching call sites.
//! - [`poll_store::PollStore`]: monitored tenants (with their poll watermark
//!   and status) and the newest-first run history.

pub mod poll_store;
pub mod state_store;
