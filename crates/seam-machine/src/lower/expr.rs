// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expression lowering: flatten nested expressions into operands.
//!
//! Operands are lowered strictly left to right, so a suspension in the
//! middle of an expression splits the state with every already-computed
//! piece held in a temporary.

use seam_hir::{Expr, ExprKind};

use crate::descriptor::SuspensionPoint;
use crate::error::LoweringError;
use crate::operand::{Const, Operand, Rvalue};
use crate::state::{Awaitable, Operation};

use super::Lowerer;

impl<'m> Lowerer<'m> {
    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> Result<Operand, LoweringError> {
        match &expr.kind {
            ExprKind::Int(v) => Ok(Operand::Const(Const::Int(*v))),
            ExprKind::Float(v) => Ok(Operand::Const(Const::Float(*v))),
            ExprKind::Bool(v) => Ok(Operand::Const(Const::Bool(*v))),
            ExprKind::Str(v) => Ok(Operand::Const(Const::Str(v.clone()))),

            ExprKind::Local(name) => {
                let var = self.lookup(name, expr.span)?;
                Ok(Operand::Var(var))
            }

            ExprKind::Unary { op, operand } => {
                let o = self.lower_expr(operand)?;
                let dst = self.builder.alloc_temp(expr.ty.clone());
                self.builder.push_op(Operation::Assign {
                    dst,
                    rvalue: Rvalue::Unary {
                        op: (*op).into(),
                        operand: o,
                    },
                });
                Ok(Operand::Var(dst))
            }

            ExprKind::Binary { op, left, right } => {
                let l = self.lower_expr(left)?;
                let r = self.lower_expr(right)?;
                let dst = self.builder.alloc_temp(expr.ty.clone());
                self.builder.push_op(Operation::Assign {
                    dst,
                    rvalue: Rvalue::Binary {
                        op: (*op).into(),
                        left: l,
                        right: r,
                    },
                });
                Ok(Operand::Var(dst))
            }

            ExprKind::Call {
                callee,
                args,
                suspends,
            } => {
                let arg_ops = self.lower_args(args)?;
                if *suspends {
                    self.check_suspend_allowed(expr.span)?;
                    let result = self.builder.alloc_temp(expr.ty.clone());
                    let resume = self.builder.create_state();
                    self.suspension_points.push(SuspensionPoint {
                        before: self.builder.current_state(),
                        resume,
                        captured: Vec::new(),
                    });
                    self.builder.push_terminal(Operation::Suspend {
                        awaited: Awaitable::Future(Rvalue::Call {
                            callee: callee.clone(),
                            args: arg_ops,
                        }),
                        resume,
                        result: Some(result),
                    });
                    self.enter(resume);
                    Ok(Operand::Var(result))
                } else {
                    let dst = self.builder.alloc_temp(expr.ty.clone());
                    self.builder.push_op(Operation::Assign {
                        dst,
                        rvalue: Rvalue::Call {
                            callee: callee.clone(),
                            args: arg_ops,
                        },
                    });
                    Ok(Operand::Var(dst))
                }
            }
        }
    }

    pub(crate) fn lower_args(&mut self, args: &[Expr]) -> Result<Vec<Operand>, LoweringError> {
        args.iter().map(|a| self.lower_expr(a)).collect()
    }
}
