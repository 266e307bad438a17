// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Statement lowering: drives the whole pass.
//!
//! The lowerer walks one method body depth-first, threading the current
//! open state through the [`StateBuilder`], resolving jumps against the
//! loop context stack and the label table, reporting region boundaries
//! to the [`RegionBuilder`], and cutting a fresh state at every
//! suspension point. The capture fix-up runs last, over the finished
//! state graph.

mod expr;
mod stmt;

use std::collections::HashMap;

use seam_hir::{Method, Span, Stmt, StmtKind};

use crate::builder::StateBuilder;
use crate::capture;
use crate::descriptor::{MachineDescriptor, StateId, SuspensionPoint, VarId};
use crate::error::{JumpKind, LoweringError};
use crate::regions::RegionBuilder;
use crate::state::Transition;

/// Lowering policy knobs, threaded explicitly into the pass.
#[derive(Debug, Clone)]
pub struct LowerOptions {
    /// Permit suspension points inside finally bodies. Off by default:
    /// a suspension during unwind stretches the pending action across
    /// an arbitrarily long async gap.
    pub allow_suspend_in_finally: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            allow_suspend_in_finally: false,
        }
    }
}

/// Lower one method body into a self-contained machine descriptor.
pub fn lower_method(
    method: &Method,
    options: &LowerOptions,
) -> Result<MachineDescriptor, LoweringError> {
    Lowerer::new(method, options.clone()).run()
}

/// Jump targets of one enclosing loop. A loop can be reachable under
/// more than one name: its own label plus the name of a `Labeled`
/// statement wrapping it.
pub(crate) struct LoopContext {
    pub labels: Vec<String>,
    pub continue_target: StateId,
    pub break_target: StateId,
}

/// Stack of enclosing loops, innermost last. A finally body pushes a
/// barrier: jumps may not resolve to loops opened outside it, because
/// control is not allowed to leave a finally range early.
pub(crate) struct LoopContextStack {
    stack: Vec<LoopContext>,
    floors: Vec<usize>,
}

impl LoopContextStack {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            floors: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, ctx: LoopContext) {
        self.stack.push(ctx);
    }

    pub(crate) fn pop(&mut self) {
        self.stack.pop();
    }

    fn enter_barrier(&mut self) {
        self.floors.push(self.stack.len());
    }

    fn leave_barrier(&mut self) {
        self.floors.pop();
    }

    fn floor(&self) -> usize {
        self.floors.last().copied().unwrap_or(0)
    }

    /// Resolve a break/continue to a concrete state. Walks outward from
    /// the innermost context; an unlabeled jump always takes the
    /// innermost loop regardless of intervening labels.
    pub(crate) fn resolve(
        &self,
        kind: JumpKind,
        label: Option<&str>,
        span: Span,
    ) -> Result<StateId, LoweringError> {
        let found = self
            .stack
            .iter()
            .enumerate()
            .rev()
            .find(|(_, ctx)| match label {
                None => true,
                Some(l) => ctx.labels.iter().any(|have| have == l),
            });
        match found {
            Some((idx, ctx)) if idx >= self.floor() => Ok(match kind {
                JumpKind::Break => ctx.break_target,
                JumpKind::Continue => ctx.continue_target,
                JumpKind::Goto => unreachable!("goto resolves via the label table"),
            }),
            Some(_) => Err(LoweringError::UnsupportedConstruct {
                detail: format!("{} would leave a finally body early", kind),
                span,
            }),
            None => Err(LoweringError::UnresolvedJump {
                kind,
                label: label.map(str::to_string),
                span,
            }),
        }
    }
}

struct LabelEntry {
    state: StateId,
    bound: bool,
    used: bool,
    use_span: Span,
}

pub(crate) struct Lowerer<'m> {
    method: &'m Method,
    pub(crate) builder: StateBuilder,
    pub(crate) regions: RegionBuilder,
    pub(crate) loop_stack: LoopContextStack,
    labels: HashMap<String, LabelEntry>,
    pub(crate) locals: HashMap<String, VarId>,
    pub(crate) suspension_points: Vec<SuspensionPoint>,
    pub(crate) finally_depth: u32,
    pub(crate) catch_depth: u32,
    options: LowerOptions,
}

impl<'m> Lowerer<'m> {
    fn new(method: &'m Method, options: LowerOptions) -> Self {
        Self {
            method,
            builder: StateBuilder::new(),
            regions: RegionBuilder::new(),
            loop_stack: LoopContextStack::new(),
            labels: HashMap::new(),
            locals: HashMap::new(),
            suspension_points: Vec::new(),
            finally_depth: 0,
            catch_depth: 0,
            options,
        }
    }

    fn run(mut self) -> Result<MachineDescriptor, LoweringError> {
        let method = self.method;
        for param in &method.params {
            if self.locals.contains_key(&param.name) {
                return Err(LoweringError::InvalidCaptureConflict {
                    name: param.name.clone(),
                    span: Span::DUMMY,
                });
            }
            let id = self.builder.add_param(param.name.clone(), param.ty.clone());
            self.locals.insert(param.name.clone(), id);
        }

        self.collect_labels(&method.body)?;

        if self.lower_block(&method.body)?.is_some() {
            self.builder.terminate(Transition::End);
        }

        for (name, entry) in &self.labels {
            if entry.used && !entry.bound {
                return Err(LoweringError::UnresolvedJump {
                    kind: JumpKind::Goto,
                    label: Some(name.clone()),
                    span: entry.use_span,
                });
            }
        }

        let regions = self.regions.finish(Span::DUMMY)?;
        let (states, locals, params) = self.builder.finish();
        let mut suspension_points = self.suspension_points;
        let frame = capture::run(&states, &locals, &regions, &mut suspension_points);

        Ok(MachineDescriptor {
            name: method.name.clone(),
            entry: StateId(0),
            states,
            locals,
            params,
            frame,
            suspension_points,
            regions,
        })
    }

    // ── Labels ──────────────────────────────────────────────────────

    /// Pre-pass: allocate one state per label so forward gotos have a
    /// concrete target before the labeled statement is reached.
    fn collect_labels(&mut self, stmts: &[Stmt]) -> Result<(), LoweringError> {
        for stmt in stmts {
            self.collect_labels_stmt(stmt)?;
        }
        Ok(())
    }

    fn collect_labels_stmt(&mut self, stmt: &Stmt) -> Result<(), LoweringError> {
        match &stmt.kind {
            StmtKind::Labeled { name, body } => {
                if self.labels.contains_key(name) {
                    return Err(LoweringError::UnsupportedConstruct {
                        detail: format!("duplicate label `{}`", name),
                        span: stmt.span,
                    });
                }
                let state = self.builder.create_state();
                self.labels.insert(
                    name.clone(),
                    LabelEntry {
                        state,
                        bound: false,
                        used: false,
                        use_span: Span::DUMMY,
                    },
                );
                self.collect_labels_stmt(body)
            }
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                self.collect_labels(then_body)?;
                self.collect_labels(else_body)
            }
            StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => {
                self.collect_labels(body)
            }
            StmtKind::For {
                init, step, body, ..
            } => {
                if let Some(init) = init {
                    self.collect_labels_stmt(init)?;
                }
                if let Some(step) = step {
                    self.collect_labels_stmt(step)?;
                }
                self.collect_labels(body)
            }
            StmtKind::Block(body) => self.collect_labels(body),
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                self.collect_labels(body)?;
                for clause in catches {
                    self.collect_labels(&clause.body)?;
                }
                if let Some(fin) = finally {
                    self.collect_labels(fin)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn resolve_label(
        &mut self,
        name: &str,
        span: Span,
    ) -> Result<StateId, LoweringError> {
        match self.labels.get_mut(name) {
            Some(entry) => {
                if !entry.used {
                    entry.used = true;
                    entry.use_span = span;
                }
                Ok(entry.state)
            }
            None => Err(LoweringError::UnresolvedJump {
                kind: JumpKind::Goto,
                label: Some(name.to_string()),
                span,
            }),
        }
    }

    pub(crate) fn label_state(&self, name: &str) -> StateId {
        self.labels[name].state
    }

    pub(crate) fn bind_label(&mut self, name: &str) {
        if let Some(entry) = self.labels.get_mut(name) {
            entry.bound = true;
        }
    }

    // ── State threading helpers ─────────────────────────────────────

    /// Make `state` current and record its region membership.
    pub(crate) fn enter(&mut self, state: StateId) {
        self.builder.switch_to(state);
        self.regions.record_state(state);
    }

    /// Seal the current state with a fall-through to `target`, if it is
    /// still open (dead-code positions arrive sealed).
    pub(crate) fn goto_state(&mut self, target: StateId) {
        if self.builder.current_open() {
            self.builder.terminate(Transition::Goto(target));
        }
    }

    pub(crate) fn check_suspend_allowed(&self, span: Span) -> Result<(), LoweringError> {
        if self.finally_depth > 0 && !self.options.allow_suspend_in_finally {
            return Err(LoweringError::UnsupportedConstruct {
                detail: "suspension point inside a finally body".to_string(),
                span,
            });
        }
        Ok(())
    }

    pub(crate) fn enter_finally_lowering(&mut self) {
        self.finally_depth += 1;
        self.loop_stack.enter_barrier();
    }

    pub(crate) fn leave_finally_lowering(&mut self) {
        self.finally_depth -= 1;
        self.loop_stack.leave_barrier();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Awaitable, Operation};
    use crate::Rvalue;
    use seam_hir::{BinOp, Expr, Param, Ty};

    fn lower(method: Method) -> Result<MachineDescriptor, LoweringError> {
        lower_method(&method, &LowerOptions::default())
    }

    fn method(body: Vec<Stmt>) -> Method {
        Method::new("test", vec![], Ty::Unit, body)
    }

    fn count_suspends(desc: &MachineDescriptor) -> usize {
        desc.states
            .iter()
            .flat_map(|s| s.ops.iter())
            .filter(|op| matches!(op, Operation::Suspend { .. }))
            .count()
    }

    #[test]
    fn straight_line_body_stays_in_entry_state() {
        let desc = lower(method(vec![
            Stmt::let_("x", Ty::Int, Some(Expr::int(1))),
            Stmt::assign("x", Expr::binary(BinOp::Add, Expr::local("x", Ty::Int), Expr::int(2), Ty::Int)),
            Stmt::ret(Some(Expr::local("x", Ty::Int))),
        ]))
        .unwrap();

        assert_eq!(desc.entry, StateId(0));
        assert!(desc.suspension_points.is_empty());
        let entry = desc.state(StateId(0)).unwrap();
        assert!(matches!(entry.ops.last(), Some(Operation::Return(_))));
        assert_eq!(entry.transition, Transition::Return);
    }

    #[test]
    fn suspension_splits_the_state() {
        let desc = lower(method(vec![
            Stmt::let_(
                "v",
                Ty::Int,
                Some(Expr::suspending_call("fetch", vec![], Ty::Int)),
            ),
            Stmt::ret(Some(Expr::local("v", Ty::Int))),
        ]))
        .unwrap();

        assert_eq!(desc.suspension_points.len(), 1);
        let sp = &desc.suspension_points[0];
        assert_ne!(sp.before, sp.resume);
        let before = desc.state(sp.before).unwrap();
        assert!(matches!(
            before.ops.last(),
            Some(Operation::Suspend {
                awaited: Awaitable::Future(Rvalue::Call { .. }),
                ..
            })
        ));
    }

    #[test]
    fn two_awaits_in_one_expression_decompose_left_to_right() {
        // fetch_a() + fetch_b(): each await closes its own state.
        let sum = Expr::binary(
            BinOp::Add,
            Expr::suspending_call("fetch_a", vec![], Ty::Int),
            Expr::suspending_call("fetch_b", vec![], Ty::Int),
            Ty::Int,
        );
        let desc = lower(method(vec![Stmt::ret(Some(sum))])).unwrap();

        assert_eq!(desc.suspension_points.len(), 2);
        assert_eq!(count_suspends(&desc), 2);
        let first = &desc.suspension_points[0];
        let second = &desc.suspension_points[1];
        // Left operand suspends first; its resume state issues the next.
        assert!(first.before < second.before);
        assert_eq!(first.resume, second.before);
    }

    #[test]
    fn while_loop_has_header_and_exit() {
        let desc = lower(method(vec![
            Stmt::let_("i", Ty::Int, Some(Expr::int(0))),
            Stmt::while_(
                Expr::binary(BinOp::Lt, Expr::local("i", Ty::Int), Expr::int(3), Ty::Bool),
                vec![Stmt::assign(
                    "i",
                    Expr::binary(BinOp::Add, Expr::local("i", Ty::Int), Expr::int(1), Ty::Int),
                )],
            ),
        ]))
        .unwrap();

        // A branch op somewhere tests the loop condition.
        let branch = desc
            .states
            .iter()
            .flat_map(|s| s.ops.iter())
            .find(|op| matches!(op, Operation::Branch { .. }));
        assert!(branch.is_some());
        // The body loops back: some state's transition targets an
        // earlier state.
        let has_back_edge = desc.states.iter().any(|s| {
            matches!(s.transition, Transition::Goto(t) if t < s.id)
        });
        assert!(has_back_edge);
    }

    #[test]
    fn break_outside_loop_is_unresolved() {
        let err = lower(method(vec![Stmt::new(StmtKind::Break(None))])).unwrap_err();
        assert!(matches!(
            err,
            LoweringError::UnresolvedJump {
                kind: JumpKind::Break,
                ..
            }
        ));
    }

    #[test]
    fn labeled_break_targets_the_named_loop() {
        let inner = Stmt::while_(
            Expr::bool(true),
            vec![Stmt::new(StmtKind::Break(Some("outer".to_string())))],
        );
        let outer = Stmt::new(StmtKind::While {
            label: Some("outer".to_string()),
            cond: Expr::bool(true),
            body: vec![inner],
        });
        lower(method(vec![outer])).unwrap();
    }

    #[test]
    fn wrapper_label_and_loop_label_name_the_same_loop() {
        // outer: while'inner (true) { break outer; }  and  break inner;
        // both leave the one loop.
        let make = |target: &str| {
            Stmt::labeled(
                "outer",
                Stmt::new(StmtKind::While {
                    label: Some("inner".to_string()),
                    cond: Expr::bool(true),
                    body: vec![Stmt::new(StmtKind::Break(Some(target.to_string())))],
                }),
            )
        };
        lower(method(vec![make("outer")])).unwrap();
        lower(method(vec![make("inner")])).unwrap();
    }

    #[test]
    fn continue_label_not_found_walks_all_contexts() {
        let inner = Stmt::while_(
            Expr::bool(true),
            vec![Stmt::new(StmtKind::Continue(Some("missing".to_string())))],
        );
        let err = lower(method(vec![Stmt::while_(Expr::bool(true), vec![inner])])).unwrap_err();
        assert!(matches!(
            err,
            LoweringError::UnresolvedJump {
                kind: JumpKind::Continue,
                label: Some(l),
                ..
            } if l == "missing"
        ));
    }

    #[test]
    fn goto_unknown_label_is_unresolved() {
        let err = lower(method(vec![Stmt::goto("nowhere")])).unwrap_err();
        assert!(matches!(
            err,
            LoweringError::UnresolvedJump {
                kind: JumpKind::Goto,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_local_declaration_conflicts() {
        let err = lower(method(vec![
            Stmt::let_("x", Ty::Int, Some(Expr::int(1))),
            Stmt::let_("x", Ty::Int, Some(Expr::int(2))),
        ]))
        .unwrap_err();
        assert!(matches!(err, LoweringError::InvalidCaptureConflict { name, .. } if name == "x"));
    }

    #[test]
    fn param_shadowing_conflicts() {
        let m = Method::new(
            "test",
            vec![Param {
                name: "x".to_string(),
                ty: Ty::Int,
            }],
            Ty::Unit,
            vec![Stmt::let_("x", Ty::Int, Some(Expr::int(1)))],
        );
        let err = lower(m).unwrap_err();
        assert!(matches!(err, LoweringError::InvalidCaptureConflict { .. }));
    }

    #[test]
    fn suspend_in_finally_rejected_by_default() {
        let body = vec![Stmt::try_(
            vec![Stmt::expr(Expr::call("work", vec![], Ty::Unit))],
            vec![],
            Some(vec![Stmt::expr(Expr::suspending_call(
                "flush",
                vec![],
                Ty::Unit,
            ))]),
        )];
        let err = lower(method(body.clone())).unwrap_err();
        assert!(matches!(err, LoweringError::UnsupportedConstruct { .. }));

        // The policy switch lifts the restriction.
        let m = method(body);
        let opts = LowerOptions {
            allow_suspend_in_finally: true,
        };
        lower_method(&m, &opts).unwrap();
    }

    #[test]
    fn return_inside_finally_rejected() {
        let err = lower(method(vec![Stmt::try_(
            vec![],
            vec![],
            Some(vec![Stmt::ret(None)]),
        )]))
        .unwrap_err();
        assert!(matches!(err, LoweringError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn rethrow_outside_catch_rejected() {
        let err = lower(method(vec![Stmt::new(StmtKind::Rethrow)])).unwrap_err();
        assert!(matches!(err, LoweringError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn goto_to_labeled_loop_binds_continue_target() {
        // top: while (c) { body } ... goto top;
        let m = method(vec![
            Stmt::let_("c", Ty::Bool, Some(Expr::bool(false))),
            Stmt::labeled(
                "top",
                Stmt::while_(Expr::local("c", Ty::Bool), vec![]),
            ),
            Stmt::goto("top"),
        ]);
        let desc = lower(m).unwrap();

        // The goto targets the loop's condition header: that state must
        // end in a Branch.
        let goto_target = desc
            .states
            .iter()
            .filter(|s| matches!(s.transition, Transition::Goto(_)))
            .filter_map(|s| match s.transition {
                Transition::Goto(t) => Some(t),
                _ => None,
            })
            .find(|t| {
                desc.state(*t)
                    .map(|st| matches!(st.ops.last(), Some(Operation::Branch { .. })))
                    .unwrap_or(false)
            });
        assert!(goto_target.is_some());
    }

    #[test]
    fn try_regions_recorded_around_suspension() {
        let m = method(vec![Stmt::try_(
            vec![Stmt::let_(
                "v",
                Ty::Int,
                Some(Expr::suspending_call("fetch", vec![], Ty::Int)),
            )],
            vec![seam_hir::CatchClause::new(Some("IoError"), Some("e"), vec![])],
            None,
        )]);
        let desc = lower(m).unwrap();

        assert_eq!(desc.regions.len(), 1);
        let region = &desc.regions[0];
        let sp = &desc.suspension_points[0];
        // Both sides of the suspension sit inside the try range, so an
        // exception surfacing at resumption still reaches the catch.
        assert!(region.in_try(sp.before));
        assert!(region.in_try(sp.resume));
    }
}
