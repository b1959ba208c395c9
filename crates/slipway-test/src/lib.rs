//! Test harnesses for Slipway.
//!
//! Provides `TestProject`, a throwaway tool home seeded from the shared
//! fixtures, for end-to-end release runs.

#[cfg(test)]
pub mod cli;
pub mod project;

pub use project::{fixtures_dir, TestError, TestProject};
