//! rulemend library crate
//!
//! Lints a documentation corpus with Vale, deduplicates the findings, has an
//! agent review the offending rules for false positives, and proposes the
//! verified edits as a pull request. Modules are public so benchmarks can
//! exercise the hot paths without going through CLI startup.

pub mod cache;
pub mod config;
pub mod corpus;
pub mod error;
pub mod git_ops;
pub mod github;
pub mod lint;
pub mod pipeline;
pub mod publish;
pub mod review;
pub mod util;
