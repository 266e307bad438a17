// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Minimal runtime for lowered machines.
//!
//! Executes a `seam_machine::MachineDescriptor` directly: one
//! [`Invocation`] per run, a [`Host`] supplying every external call, and
//! a [`Status`] telling the caller whether the run suspended, yielded,
//! returned, or faulted. Single-threaded and cooperative; the caller is
//! the scheduler.

mod driver;
mod error;
mod value;

pub use driver::{Host, Invocation, Status, SuspendRequest};
pub use error::RuntimeError;
pub use value::{Thrown, Value};
