//! NutriChain reporting service.
//!
//! Authenticated report endpoints over Postgres with idempotent request
//! handling: a process-local response cache keyed by the client-supplied
//! `Idempotency-Key` header replays completed responses and collapses
//! concurrent retries onto a single handler execution.

pub mod application;
pub mod config;
pub mod domain;
pub mod idempotency;
pub mod infra;
pub mod util;
