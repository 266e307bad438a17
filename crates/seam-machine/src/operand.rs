// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Machine-level operands and rvalues.
//!
//! After lowering, expressions no longer nest: every intermediate value
//! lives in a variable, and rvalues are one operator deep.

use crate::descriptor::VarId;

/// A value usable as an input: a variable or a constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Var(VarId),
    Const(Const),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Right-hand side of an `Assign` or the payload of an `Eval`.
#[derive(Debug, Clone, PartialEq)]
pub enum Rvalue {
    Use(Operand),
    Unary {
        op: UnaryOp,
        operand: Operand,
    },
    Binary {
        op: BinOp,
        left: Operand,
        right: Operand,
    },
    /// Non-suspending call to a host function.
    Call {
        callee: String,
        args: Vec<Operand>,
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

impl From<seam_hir::BinOp> for BinOp {
    fn from(op: seam_hir::BinOp) -> Self {
        use seam_hir::BinOp as H;
        match op {
            H::Add => BinOp::Add,
            H::Sub => BinOp::Sub,
            H::Mul => BinOp::Mul,
            H::Div => BinOp::Div,
            H::Mod => BinOp::Mod,
            H::Eq => BinOp::Eq,
            H::Ne => BinOp::Ne,
            H::Lt => BinOp::Lt,
            H::Gt => BinOp::Gt,
            H::Le => BinOp::Le,
            H::Ge => BinOp::Ge,
            H::And => BinOp::And,
            H::Or => BinOp::Or,
        }
    }
}

impl From<seam_hir::UnaryOp> for UnaryOp {
    fn from(op: seam_hir::UnaryOp) -> Self {
        match op {
            seam_hir::UnaryOp::Neg => UnaryOp::Neg,
            seam_hir::UnaryOp::Not => UnaryOp::Not,
        }
    }
}

impl Rvalue {
    /// Variables read by this rvalue, appended to `out`.
    pub fn uses(&self, out: &mut Vec<VarId>) {
        match self {
            Rvalue::Use(op) => op.uses(out),
            Rvalue::Unary { operand, .. } => operand.uses(out),
            Rvalue::Binary { left, right, .. } => {
                left.uses(out);
                right.uses(out);
            }
            Rvalue::Call { args, .. } => {
                for arg in args {
                    arg.uses(out);
                }
            }
        }
    }
}

impl Operand {
    pub fn uses(&self, out: &mut Vec<VarId>) {
        if let Operand::Var(id) = self {
            out.push(*id);
        }
    }
}
