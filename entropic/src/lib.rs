//! Risk-entropy driven agent loop.
//!
//! An oracle proposes structured plans; the loop samples several risk
//! registers, treats disagreement between them as uncertainty, and spends each
//! iteration on the most uncertain thing first: asking the user, running a
//! small experiment, implementing the backlog head, or checking for done.
//!
//! - **[`core`]**: Pure, deterministic logic (entropy scoring, focus choice,
//!   backlog rules, command policy). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem, processes, terminal,
//!   backend). Isolated behind traits so tests can script them.
//! - **[`oracle`]**: Structured-output calls with coercion, retry and repair.
//!
//! Orchestration modules ([`intake`], [`scan`], [`execute`], [`repair`],
//! [`looping`]) combine the two over a [`session::Session`].

pub mod core;
pub mod execute;
pub mod exit_codes;
pub mod intake;
pub mod io;
pub mod logging;
pub mod looping;
pub mod oracle;
pub mod repair;
pub mod scan;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
