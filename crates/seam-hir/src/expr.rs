// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expression nodes.

use crate::{NodeId, Span};

/// A resolved type annotation.
///
/// The front-end resolves every expression to one of these before handing
/// the tree over. `Named` covers user-defined types, including the
/// exception types that catch filters match against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    Named(String),
}

/// An expression with its resolved type.
#[derive(Debug, Clone)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub ty: Ty,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// Reference to a local or parameter, already name-resolved.
    Local(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Both operands are evaluated unconditionally, `And`/`Or` included.
    /// The front-end desugars short-circuit forms to `If` before handing
    /// the tree over, so a suspending call only ever sits on a branch
    /// that actually runs.
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Call to an external function. `suspends` marks it as a suspension
    /// point: the machine must stop at the call and resume with its result.
    Call {
        callee: String,
        args: Vec<Expr>,
        suspends: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Ty, span: Span) -> Self {
        Expr { id: NodeId::DUMMY, kind, ty, span }
    }

    pub fn int(v: i64) -> Self {
        Expr::new(ExprKind::Int(v), Ty::Int, Span::DUMMY)
    }

    pub fn bool(v: bool) -> Self {
        Expr::new(ExprKind::Bool(v), Ty::Bool, Span::DUMMY)
    }

    pub fn str(v: impl Into<String>) -> Self {
        Expr::new(ExprKind::Str(v.into()), Ty::Str, Span::DUMMY)
    }

    pub fn local(name: impl Into<String>, ty: Ty) -> Self {
        Expr::new(ExprKind::Local(name.into()), ty, Span::DUMMY)
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr, ty: Ty) -> Self {
        Expr::new(
            ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
            ty,
            Span::DUMMY,
        )
    }

    pub fn unary(op: UnaryOp, operand: Expr, ty: Ty) -> Self {
        Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, ty, Span::DUMMY)
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>, ty: Ty) -> Self {
        Expr::new(
            ExprKind::Call { callee: callee.into(), args, suspends: false },
            ty,
            Span::DUMMY,
        )
    }

    /// A call flagged as a suspension point.
    pub fn suspending_call(callee: impl Into<String>, args: Vec<Expr>, ty: Ty) -> Self {
        Expr::new(
            ExprKind::Call { callee: callee.into(), args, suspends: true },
            ty,
            Span::DUMMY,
        )
    }
}
