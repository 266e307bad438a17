// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Resolved input tree for the seam lowering engine.
//!
//! A front-end hands us one method body at a time: statements and
//! expressions with types already resolved, labels already bound, and
//! suspending calls flagged. This crate defines those nodes; it performs
//! no analysis of its own.

pub mod span;
pub mod expr;
pub mod stmt;

pub use span::{LineMap, Span};
pub use expr::{BinOp, Expr, ExprKind, Ty, UnaryOp};
pub use stmt::{CatchClause, Method, Param, Stmt, StmtKind};

/// Unique identifier for tree nodes.
///
/// Assigned by the front-end; the lowering engine only uses it to key
/// diagnostics back to source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const DUMMY: NodeId = NodeId(u32::MAX);
}
