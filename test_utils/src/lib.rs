//! Shared helpers for the syntax-sync test suites and benchmarks.

pub mod edits;
