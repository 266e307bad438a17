// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! StateBuilder - allocates states and variables during lowering.
//!
//! This is the state allocator: lowering asks it for fresh states at
//! every suspension boundary and loop edge, and threads the "current
//! open state" through it while emitting operations.

use seam_hir::Ty;

use crate::descriptor::{LocalDecl, State, StateId, VarId};
use crate::state::{Operation, Transition};

pub struct StateBuilder {
    states: Vec<State>,
    sealed: Vec<bool>,
    locals: Vec<LocalDecl>,
    params: Vec<VarId>,
    current: StateId,
}

impl StateBuilder {
    pub fn new() -> Self {
        let entry = State {
            id: StateId(0),
            ops: Vec::new(),
            transition: Transition::End,
        };
        Self {
            states: vec![entry],
            sealed: vec![false],
            locals: Vec::new(),
            params: Vec::new(),
            current: StateId(0),
        }
    }

    pub fn create_state(&mut self) -> StateId {
        let id = StateId(self.states.len() as u32);
        self.states.push(State {
            id,
            ops: Vec::new(),
            transition: Transition::End,
        });
        self.sealed.push(false);
        id
    }

    pub fn switch_to(&mut self, state: StateId) {
        self.current = state;
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    /// True while the current state can still accept operations.
    pub fn current_open(&self) -> bool {
        !self.sealed[self.current.0 as usize]
    }

    pub fn push_op(&mut self, op: Operation) {
        debug_assert!(self.current_open(), "emitting into a sealed state");
        debug_assert!(!op.is_terminal(), "terminal ops go through push_terminal");
        self.states[self.current.0 as usize].ops.push(op);
    }

    /// Emit a control-transferring operation and seal the state with the
    /// transition summarizing it.
    pub fn push_terminal(&mut self, op: Operation) {
        debug_assert!(self.current_open(), "emitting into a sealed state");
        let transition = op
            .summary_transition()
            .expect("push_terminal requires a control-transferring operation");
        let idx = self.current.0 as usize;
        self.states[idx].ops.push(op);
        self.states[idx].transition = transition;
        self.sealed[idx] = true;
    }

    /// Seal the current state with a plain transition (fall-through
    /// `Goto` or body-exhausted `End`).
    pub fn terminate(&mut self, transition: Transition) {
        debug_assert!(self.current_open(), "re-terminating a sealed state");
        let idx = self.current.0 as usize;
        self.states[idx].transition = transition;
        self.sealed[idx] = true;
    }

    pub fn alloc_temp(&mut self, ty: Ty) -> VarId {
        let id = VarId(self.locals.len() as u32);
        self.locals.push(LocalDecl {
            id,
            name: None,
            ty,
            is_param: false,
        });
        id
    }

    pub fn alloc_local(&mut self, name: String, ty: Ty) -> VarId {
        let id = VarId(self.locals.len() as u32);
        self.locals.push(LocalDecl {
            id,
            name: Some(name),
            ty,
            is_param: false,
        });
        id
    }

    pub fn add_param(&mut self, name: String, ty: Ty) -> VarId {
        let id = VarId(self.locals.len() as u32);
        self.locals.push(LocalDecl {
            id,
            name: Some(name),
            ty,
            is_param: true,
        });
        self.params.push(id);
        id
    }

    pub fn finish(self) -> (Vec<State>, Vec<LocalDecl>, Vec<VarId>) {
        (self.states, self.locals, self.params)
    }
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::{Const, Operand, Rvalue};

    #[test]
    fn entry_state_is_zero_and_open() {
        let b = StateBuilder::new();
        assert_eq!(b.current_state(), StateId(0));
        assert!(b.current_open());
    }

    #[test]
    fn terminal_op_seals_with_summary() {
        let mut b = StateBuilder::new();
        let next = b.create_state();
        b.push_op(Operation::Eval(Rvalue::Use(Operand::Const(Const::Unit))));
        b.push_terminal(Operation::Suspend {
            awaited: crate::state::Awaitable::Future(Rvalue::Call {
                callee: "fetch".to_string(),
                args: vec![],
            }),
            resume: next,
            result: None,
        });
        assert!(!b.current_open());
        let (states, _, _) = b.finish();
        assert_eq!(states[0].transition, Transition::Goto(next));
    }

    #[test]
    fn ids_are_monotonic() {
        let mut b = StateBuilder::new();
        assert_eq!(b.create_state(), StateId(1));
        assert_eq!(b.create_state(), StateId(2));
        assert_eq!(b.alloc_temp(Ty::Int), VarId(0));
        assert_eq!(b.alloc_local("x".to_string(), Ty::Int), VarId(1));
    }
}
