//! Shared store contract tests.
//!
//! Tests the RelationalStore and DistributedCache interfaces against all
//! implementations. Each implementation's test binary runs these suites.

#![allow(dead_code)]

pub mod cache_tests;
pub mod relational_tests;
