//! Deterministic, pure logic shared by the agent loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod backlog;
pub mod entropy;
pub mod focus;
pub mod normalize;
pub mod policy;
pub mod state;
pub mod types;
