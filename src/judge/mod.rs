//! Judge dispatch
//!
//! Everything between "a submission is PENDING" and "its verdict is in the
//! counters": the language table, the sandbox RPC client, worker selection,
//! verdict aggregation, the per-submission dispatcher and the queue workers
//! and reconciler that drive it.

pub mod aggregate;
pub mod client;
pub mod dispatcher;
pub mod languages;
pub mod queue;
pub mod reconciler;
pub mod selector;
pub mod worker;

pub use client::{HttpSandboxClient, SandboxClient};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use queue::{JudgeTask, MemoryQueue, RedisQueue, TaskQueue};
pub use reconciler::Reconciler;
pub use selector::ServerLock;
pub use worker::DispatchWorker;
