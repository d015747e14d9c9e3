//! Database repositories
//!
//! Repositories handle all direct database interactions. Every function
//! takes any executor, so the same query runs on the pool or inside a
//! transaction.

pub mod contest_repo;
pub mod judge_server_repo;
pub mod problem_repo;
pub mod profile_repo;
pub mod submission_repo;

pub use contest_repo::ContestRepository;
pub use judge_server_repo::JudgeServerRepository;
pub use problem_repo::ProblemRepository;
pub use profile_repo::ProfileRepository;
pub use submission_repo::SubmissionRepository;
