//! Business logic services

pub mod heartbeat_service;
pub mod statistics;
pub mod submission_service;

pub use heartbeat_service::{HeartbeatService, PoolSummary};
pub use submission_service::SubmissionService;
