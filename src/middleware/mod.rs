//! HTTP middleware

pub mod judge_token;
pub mod logging;

pub use judge_token::VerifiedJudgeServer;
pub use logging::logging_middleware;
