//! Shared test utilities for kbstore integration tests.
//!
//! This module provides:
//! - `TestHarness` owning a temporary on-disk store
//! - helpers for inspecting field tables directly

pub mod harness;

pub use harness::TestHarness;
