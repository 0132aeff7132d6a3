//! The per-run polling engine.
//!
//! A [`scheduler::PollScheduler`] fires the [`orchestrator::PollOrchestrator`]
//! on a fixed cadence. Each run reloads the rule catalog, walks the monitored
//! tenants sequentially, fans out to the three upstream feeds concurrently
//! per tenant, evaluates every fetched event against the rules, drives
//! matches through the two-layer alert state machine, and finally uploads the
//! alert batch to the log-ingestion sink, notifies operators, sweeps expired
//! state, and records a run summary.
//!
//! Per-tenant failures are classified and recorded against the tenant; they
//! never abort the run. The poll watermark only advances on tenant success,
//! so a failing tenant retries the same window next tick, bounded by the
//! maximum lookback.

pub mod extract;
pub mod orchestrator;
pub mod processor;
pub mod scheduler;
pub mod sink;
pub mod window;

#[cfg(test)]
mod tests;
