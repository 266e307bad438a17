// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Statement lowering rules.
//!
//! Every lowering function returns `Ok(Some(state))` when control can
//! fall out of the construct normally, with `state` the open state the
//! next statement should continue in, or `Ok(None)` when the construct
//! diverges on every path.

use seam_hir::{CatchClause, ExprKind, Span, Stmt, StmtKind, Ty};

use crate::descriptor::{StateId, SuspensionPoint};
use crate::error::{JumpKind, LoweringError};
use crate::operand::{Operand, Rvalue};
use crate::regions::TypeFilter;
use crate::state::{Awaitable, Operation, Transition};

use super::Lowerer;

fn own_labels(label: &Option<String>) -> Vec<String> {
    label.iter().cloned().collect()
}

fn wrapped_labels(wrapper: &str, own: Option<&str>) -> Vec<String> {
    let mut labels = vec![wrapper.to_string()];
    if let Some(own) = own {
        if own != wrapper {
            labels.push(own.to_string());
        }
    }
    labels
}

impl<'m> Lowerer<'m> {
    /// Lower a statement list into the current state. Statements after a
    /// diverging one are dead and skipped, except labeled statements,
    /// which stay reachable through their label.
    pub(crate) fn lower_block(
        &mut self,
        stmts: &[Stmt],
    ) -> Result<Option<StateId>, LoweringError> {
        let mut open = Some(self.builder.current_state());
        for stmt in stmts {
            let live = open.is_some() || matches!(stmt.kind, StmtKind::Labeled { .. });
            if live {
                open = self.lower_stmt(stmt)?;
            }
        }
        Ok(open)
    }

    pub(crate) fn lower_stmt(&mut self, stmt: &Stmt) -> Result<Option<StateId>, LoweringError> {
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.lower_effect_expr(e)?;
                Ok(Some(self.builder.current_state()))
            }

            StmtKind::Let { name, ty, init } => {
                if self.locals.contains_key(name) {
                    return Err(LoweringError::InvalidCaptureConflict {
                        name: name.clone(),
                        span: stmt.span,
                    });
                }
                let init_op = match init {
                    Some(e) => Some(self.lower_expr(e)?),
                    None => None,
                };
                let var = self.builder.alloc_local(name.clone(), ty.clone());
                self.locals.insert(name.clone(), var);
                if let Some(op) = init_op {
                    self.builder.push_op(Operation::Assign {
                        dst: var,
                        rvalue: Rvalue::Use(op),
                    });
                }
                Ok(Some(self.builder.current_state()))
            }

            StmtKind::Assign { name, value } => {
                let var = self.lookup(name, stmt.span)?;
                let op = self.lower_expr(value)?;
                self.builder.push_op(Operation::Assign {
                    dst: var,
                    rvalue: Rvalue::Use(op),
                });
                Ok(Some(self.builder.current_state()))
            }

            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => self.lower_if(cond, then_body, else_body),

            StmtKind::While { label, cond, body } => {
                self.lower_while(own_labels(label), cond, body, None)
            }

            StmtKind::DoWhile { label, body, cond } => {
                self.lower_do_while(own_labels(label), body, cond, None)
            }

            StmtKind::For {
                label,
                init,
                cond,
                step,
                body,
            } => self.lower_for(
                own_labels(label),
                init.as_deref(),
                cond.as_ref(),
                step.as_deref(),
                body,
                None,
            ),

            StmtKind::Block(body) => self.lower_block(body),

            StmtKind::Break(label) => {
                let target =
                    self.loop_stack
                        .resolve(JumpKind::Break, label.as_deref(), stmt.span)?;
                self.goto_state(target);
                Ok(None)
            }

            StmtKind::Continue(label) => {
                let target =
                    self.loop_stack
                        .resolve(JumpKind::Continue, label.as_deref(), stmt.span)?;
                self.goto_state(target);
                Ok(None)
            }

            StmtKind::Labeled { name, body } => self.lower_labeled(name, body),

            StmtKind::Goto(label) => {
                if self.finally_depth > 0 {
                    return Err(LoweringError::UnsupportedConstruct {
                        detail: "goto inside a finally body".to_string(),
                        span: stmt.span,
                    });
                }
                let target = self.resolve_label(label, stmt.span)?;
                self.goto_state(target);
                Ok(None)
            }

            StmtKind::Return(value) => {
                if self.finally_depth > 0 {
                    return Err(LoweringError::UnsupportedConstruct {
                        detail: "return inside a finally body".to_string(),
                        span: stmt.span,
                    });
                }
                let op = match value {
                    Some(e) => Some(self.lower_expr(e)?),
                    None => None,
                };
                self.builder.push_terminal(Operation::Return(op));
                Ok(None)
            }

            StmtKind::Throw(e) => {
                let op = self.lower_expr(e)?;
                self.builder.push_terminal(Operation::Throw(op));
                Ok(None)
            }

            StmtKind::Rethrow => {
                if self.catch_depth == 0 {
                    return Err(LoweringError::UnsupportedConstruct {
                        detail: "rethrow outside a catch body".to_string(),
                        span: stmt.span,
                    });
                }
                self.builder.push_terminal(Operation::Rethrow);
                Ok(None)
            }

            StmtKind::Try {
                body,
                catches,
                finally,
            } => self.lower_try(body, catches, finally.as_deref(), stmt.span),

            StmtKind::Yield(e) => {
                self.check_suspend_allowed(stmt.span)?;
                let op = self.lower_expr(e)?;
                let resume = self.builder.create_state();
                self.suspension_points.push(SuspensionPoint {
                    before: self.builder.current_state(),
                    resume,
                    captured: Vec::new(),
                });
                self.builder.push_terminal(Operation::Suspend {
                    awaited: Awaitable::Yield(op),
                    resume,
                    result: None,
                });
                self.enter(resume);
                Ok(Some(resume))
            }
        }
    }

    fn lower_if(
        &mut self,
        cond: &seam_hir::Expr,
        then_body: &[Stmt],
        else_body: &[Stmt],
    ) -> Result<Option<StateId>, LoweringError> {
        let cond_op = self.lower_expr(cond)?;
        let then_state = self.builder.create_state();
        // Without an else arm the false edge falls straight to the join.
        let mut join: Option<StateId> = None;
        let else_state = if else_body.is_empty() {
            let j = self.builder.create_state();
            join = Some(j);
            j
        } else {
            self.builder.create_state()
        };
        self.builder.push_terminal(Operation::Branch {
            cond: cond_op,
            then_state,
            else_state,
        });

        self.enter(then_state);
        if self.lower_block(then_body)?.is_some() {
            let j = *join.get_or_insert_with(|| self.builder.create_state());
            self.builder.terminate(Transition::Goto(j));
        }

        if !else_body.is_empty() {
            self.enter(else_state);
            if self.lower_block(else_body)?.is_some() {
                let j = *join.get_or_insert_with(|| self.builder.create_state());
                self.builder.terminate(Transition::Goto(j));
            }
        }

        match join {
            Some(j) => {
                self.enter(j);
                Ok(Some(j))
            }
            None => Ok(None),
        }
    }

    /// `continue_state`, when supplied by a wrapping label, becomes the
    /// loop's continue target so a goto to the label re-enters the loop
    /// where a continue would.
    fn lower_while(
        &mut self,
        labels: Vec<String>,
        cond: &seam_hir::Expr,
        body: &[Stmt],
        continue_state: Option<StateId>,
    ) -> Result<Option<StateId>, LoweringError> {
        let header = continue_state.unwrap_or_else(|| self.builder.create_state());
        self.goto_state(header);
        self.enter(header);
        let cond_op = self.lower_expr(cond)?;

        let body_state = self.builder.create_state();
        let exit = self.builder.create_state();
        self.builder.push_terminal(Operation::Branch {
            cond: cond_op,
            then_state: body_state,
            else_state: exit,
        });

        self.enter(body_state);
        self.loop_stack.push(super::LoopContext {
            labels,
            continue_target: header,
            break_target: exit,
        });
        let falls = self.lower_block(body)?;
        self.loop_stack.pop();
        if falls.is_some() {
            self.builder.terminate(Transition::Goto(header));
        }

        self.enter(exit);
        Ok(Some(exit))
    }

    fn lower_do_while(
        &mut self,
        labels: Vec<String>,
        body: &[Stmt],
        cond: &seam_hir::Expr,
        continue_state: Option<StateId>,
    ) -> Result<Option<StateId>, LoweringError> {
        let check = continue_state.unwrap_or_else(|| self.builder.create_state());
        let body_state = self.builder.create_state();
        let exit = self.builder.create_state();

        self.goto_state(body_state);
        self.enter(body_state);
        self.loop_stack.push(super::LoopContext {
            labels,
            continue_target: check,
            break_target: exit,
        });
        let falls = self.lower_block(body)?;
        self.loop_stack.pop();
        if falls.is_some() {
            self.builder.terminate(Transition::Goto(check));
        }

        self.enter(check);
        let cond_op = self.lower_expr(cond)?;
        self.builder.push_terminal(Operation::Branch {
            cond: cond_op,
            then_state: body_state,
            else_state: exit,
        });

        self.enter(exit);
        Ok(Some(exit))
    }

    fn lower_for(
        &mut self,
        labels: Vec<String>,
        init: Option<&Stmt>,
        cond: Option<&seam_hir::Expr>,
        step: Option<&Stmt>,
        body: &[Stmt],
        continue_state: Option<StateId>,
    ) -> Result<Option<StateId>, LoweringError> {
        if let Some(init) = init {
            if self.lower_stmt(init)?.is_none() {
                return Ok(None);
            }
        }

        let header = self.builder.create_state();
        // The step state doubles as the continue target.
        let step_state = continue_state.unwrap_or_else(|| self.builder.create_state());
        let exit = self.builder.create_state();

        self.goto_state(header);
        self.enter(header);
        let cond_op = match cond {
            Some(c) => self.lower_expr(c)?,
            None => Operand::Const(crate::operand::Const::Bool(true)),
        };
        let body_state = self.builder.create_state();
        self.builder.push_terminal(Operation::Branch {
            cond: cond_op,
            then_state: body_state,
            else_state: exit,
        });

        self.enter(body_state);
        self.loop_stack.push(super::LoopContext {
            labels,
            continue_target: step_state,
            break_target: exit,
        });
        let falls = self.lower_block(body)?;
        self.loop_stack.pop();
        if falls.is_some() {
            self.builder.terminate(Transition::Goto(step_state));
        }

        self.enter(step_state);
        if let Some(step) = step {
            if self.lower_stmt(step)?.is_none() {
                self.enter(exit);
                return Ok(Some(exit));
            }
        }
        self.builder.terminate(Transition::Goto(header));

        self.enter(exit);
        Ok(Some(exit))
    }

    /// A label on a loop aliases the loop's continue target, so a goto to
    /// the label behaves like a continue: re-entering the loop machinery
    /// rather than re-running its initialization. The wrapper name and
    /// the loop's own label both resolve to the same loop.
    fn lower_labeled(
        &mut self,
        name: &str,
        body: &Stmt,
    ) -> Result<Option<StateId>, LoweringError> {
        let entry = self.label_state(name);
        self.bind_label(name);
        match &body.kind {
            StmtKind::While { label, cond, body } => {
                let labels = wrapped_labels(name, label.as_deref());
                self.lower_while(labels, cond, body, Some(entry))
            }
            StmtKind::DoWhile { label, body, cond } => {
                let labels = wrapped_labels(name, label.as_deref());
                self.lower_do_while(labels, body, cond, Some(entry))
            }
            StmtKind::For {
                label,
                init,
                cond,
                step,
                body,
            } => {
                let labels = wrapped_labels(name, label.as_deref());
                self.lower_for(
                    labels,
                    init.as_deref(),
                    cond.as_ref(),
                    step.as_deref(),
                    body,
                    Some(entry),
                )
            }
            _ => {
                self.goto_state(entry);
                self.enter(entry);
                self.lower_stmt(body)
            }
        }
    }

    fn lower_try(
        &mut self,
        body: &[Stmt],
        catches: &[CatchClause],
        finally: Option<&[Stmt]>,
        span: Span,
    ) -> Result<Option<StateId>, LoweringError> {
        let region = self.regions.open_region();
        let try_entry = self.builder.create_state();
        self.goto_state(try_entry);
        self.enter(try_entry);

        // Continuation lives outside the region: a transfer to it is an
        // exit and routes through the finally range.
        let after = self.builder.create_state();

        let mut any_falls = false;
        if self.lower_block(body)?.is_some() {
            self.builder.terminate(Transition::Goto(after));
            any_falls = true;
        }

        self.regions.begin_catches(region, span)?;
        self.catch_depth += 1;
        for clause in catches {
            let entry = self.builder.create_state();
            let binding = match &clause.binding {
                Some(name) => {
                    if self.locals.contains_key(name) {
                        self.catch_depth -= 1;
                        return Err(LoweringError::InvalidCaptureConflict {
                            name: name.clone(),
                            span: clause.span,
                        });
                    }
                    let ty = match &clause.filter {
                        Some(f) => Ty::Named(f.clone()),
                        None => Ty::Named("object".to_string()),
                    };
                    let var = self.builder.alloc_local(name.clone(), ty);
                    self.locals.insert(name.clone(), var);
                    Some(var)
                }
                None => None,
            };
            let filter = match &clause.filter {
                Some(f) => TypeFilter::Named(f.clone()),
                None => TypeFilter::Any,
            };
            self.regions
                .add_catch(region, filter, binding, entry, clause.span)?;
            self.enter(entry);
            if self.lower_block(&clause.body)?.is_some() {
                self.builder.terminate(Transition::Goto(after));
                any_falls = true;
            }
        }
        self.catch_depth -= 1;

        if let Some(fin) = finally {
            let fin_entry = self.builder.create_state();
            self.regions.begin_finally(region, fin_entry, span)?;
            self.enter(fin_entry);
            self.enter_finally_lowering();
            let falls = self.lower_block(fin)?;
            self.leave_finally_lowering();
            if falls.is_some() {
                // End inside a finally range hands control back to the
                // driver, which resumes the pending exit action.
                self.builder.terminate(Transition::End);
            }
        }

        self.regions.close_region(region, span)?;
        self.enter(after);
        if any_falls {
            Ok(Some(after))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn lookup(&self, name: &str, span: Span) -> Result<crate::VarId, LoweringError> {
        self.locals
            .get(name)
            .copied()
            .ok_or_else(|| LoweringError::UnresolvedVariable {
                name: name.to_string(),
                span,
            })
    }

    /// Lower an expression statement. A call at the root evaluates for
    /// effect without materializing a temporary.
    fn lower_effect_expr(&mut self, e: &seam_hir::Expr) -> Result<(), LoweringError> {
        if let ExprKind::Call {
            callee,
            args,
            suspends,
        } = &e.kind
        {
            let arg_ops = self.lower_args(args)?;
            if *suspends {
                self.check_suspend_allowed(e.span)?;
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
                    result: None,
                });
                self.enter(resume);
            } else {
                self.builder.push_op(Operation::Eval(Rvalue::Call {
                    callee: callee.clone(),
                    args: arg_ops,
                }));
            }
            return Ok(());
        }
        self.lower_expr(e)?;
        Ok(())
    }
}
