// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Operations and transitions: the instruction set of a lowered machine.

use crate::descriptor::{StateId, VarId};
use crate::operand::{Operand, Rvalue};

/// One primitive step. Operations execute strictly in sequence within a
/// state; a control-transferring operation (`Branch`, `Suspend`, `Throw`,
/// `Rethrow`, `Return`) is only ever the last operation of its state.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Evaluate for effect, discard the result.
    Eval(Rvalue),
    Assign {
        dst: VarId,
        rvalue: Rvalue,
    },
    /// Two-way transfer on a boolean.
    Branch {
        cond: Operand,
        then_state: StateId,
        else_state: StateId,
    },
    /// Stop stepping; the driver resumes at `resume`, storing the
    /// completion value into `result` when present.
    Suspend {
        awaited: Awaitable,
        resume: StateId,
        result: Option<VarId>,
    },
    Throw(Operand),
    /// Re-raise the exception bound by the innermost active catch.
    Rethrow,
    Return(Option<Operand>),
}

/// What a `Suspend` is waiting on.
#[derive(Debug, Clone, PartialEq)]
pub enum Awaitable {
    /// An asynchronous host call; resumption carries its result.
    Future(Rvalue),
    /// An iterator yield; the value goes out, resumption carries nothing.
    Yield(Operand),
}

/// Terminal control of a state.
///
/// For a state whose last operation already transfers control, the
/// transition summarizes it: `Goto` points at the fall-through successor
/// (`Branch`'s false edge, `Suspend`'s resume state), `Return`/`Throw`
/// mirror a terminal `Return`/`Throw`/`Rethrow` operation, and `End`
/// means the method body is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Goto(StateId),
    Return,
    Throw,
    End,
}

impl Operation {
    /// True if executing this operation always transfers control.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Operation::Branch { .. }
                | Operation::Suspend { .. }
                | Operation::Throw(_)
                | Operation::Rethrow
                | Operation::Return(_)
        )
    }

    /// The transition summarizing this operation as a state terminator.
    /// `None` for straight-line operations.
    pub fn summary_transition(&self) -> Option<Transition> {
        match self {
            Operation::Branch { else_state, .. } => Some(Transition::Goto(*else_state)),
            Operation::Suspend { resume, .. } => Some(Transition::Goto(*resume)),
            Operation::Throw(_) | Operation::Rethrow => Some(Transition::Throw),
            Operation::Return(_) => Some(Transition::Return),
            Operation::Eval(_) | Operation::Assign { .. } => None,
        }
    }

    /// Variables written by this operation, appended to `out`.
    pub fn defs(&self, out: &mut Vec<VarId>) {
        match self {
            Operation::Assign { dst, .. } => out.push(*dst),
            // A suspend result is written on resumption, not here; the
            // capture pass models it as an entry definition of the
            // resume state.
            _ => {}
        }
    }

    /// Variables read by this operation, appended to `out`.
    pub fn uses(&self, out: &mut Vec<VarId>) {
        match self {
            Operation::Eval(rv) | Operation::Assign { rvalue: rv, .. } => rv.uses(out),
            Operation::Branch { cond, .. } => cond.uses(out),
            Operation::Suspend { awaited, .. } => match awaited {
                Awaitable::Future(rv) => rv.uses(out),
                Awaitable::Yield(op) => op.uses(out),
            },
            Operation::Throw(op) => op.uses(out),
            Operation::Return(Some(op)) => op.uses(out),
            Operation::Return(None) | Operation::Rethrow => {}
        }
    }
}
