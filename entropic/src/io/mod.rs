//! I/O helpers for the agent loop.

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod human;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod state_store;
pub mod workspace;
pub mod worklog;
