//! Domain models
//!
//! This module contains all domain models used throughout the application.
//! JSON-bearing columns are modeled as typed records so malformed rows are
//! rejected when they are read.

pub mod contest;
pub mod effects;
pub mod judge_server;
pub mod problem;
pub mod profile;
pub mod submission;

pub use contest::*;
pub use effects::*;
pub use judge_server::*;
pub use problem::*;
pub use profile::*;
pub use submission::*;
