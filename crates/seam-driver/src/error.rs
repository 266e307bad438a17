// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Driver runtime errors.
//!
//! These are machine faults (a broken descriptor or host), distinct from
//! in-language exceptions, which flow through `Status::Faulted`.

#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("undefined function: {0}")]
    UndefinedFunction(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("no such state: s{0}")]
    NoSuchState(u32),

    #[error("invocation is not suspended")]
    NotSuspended,

    #[error("rethrow without an active exception")]
    NoActiveException,
}
