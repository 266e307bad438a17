// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lowering engine: structured control flow with suspension points in,
//! explicit resumable state machine out.
//!
//! The entry point is [`lower_method`]. It takes one resolved method body
//! from `seam-hir` and produces a [`MachineDescriptor`]: an entry state,
//! a state table, a persistent-frame layout, and an exception dispatch
//! table. A driver (see the `seam-driver` crate) can then execute the
//! machine, suspending and resuming at the recorded boundaries, while the
//! original program's control-flow and exception semantics are preserved
//! exactly.

mod builder;
mod capture;
mod descriptor;
mod display;
mod error;
mod operand;
mod regions;
mod state;

pub mod lower;

pub use builder::StateBuilder;
pub use descriptor::{
    CapturedVariable, LocalDecl, MachineDescriptor, State, StateId, SuspensionPoint, VarId,
};
pub use error::{JumpKind, LoweringError};
pub use lower::{lower_method, LowerOptions};
pub use operand::{BinOp, Const, Operand, Rvalue, UnaryOp};
pub use regions::{CatchHandler, ExceptionRegion, RegionBuilder, RegionId, TypeFilter};
pub use state::{Awaitable, Operation, Transition};
