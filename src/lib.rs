//! JudgeHub - Judge Dispatch and Judge-Server Pool Manager
//!
//! This library drives the judging side of an online judge: it tracks a pool
//! of sandbox workers through their heartbeats, hands each PENDING submission
//! to the least loaded healthy worker, turns the per-test-case report into a
//! verdict and folds that verdict into problem, profile and contest rank
//! counters.
//!
//! # Architecture
//!
//! - **Handlers**: heartbeat and health endpoints (thin layer)
//! - **Judge**: language table, sandbox client, selector, dispatcher, queue workers, reconciler
//! - **Services**: heartbeat processing, enqueue/rejudge, counter rules
//! - **Store**: `ServerRegistry` / `JudgeStore` seams with Postgres and in-memory backends
//! - **Repositories**: Database access
//! - **Models**: Domain models and typed JSON records

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod handlers;
pub mod judge;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
