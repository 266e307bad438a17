// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The invocation driver: steps a lowered machine.
//!
//! One `Invocation` owns one run of one machine. It holds the persistent
//! frame (promoted variables), a scratch environment for everything
//! else, and the unwind bookkeeping that makes finally ranges run
//! exactly once per exit path. Scratch is dropped at every suspension;
//! only frame slots survive, so capture promotion is observable.

use indexmap::IndexMap;

use seam_machine::{
    Awaitable, BinOp, Const, MachineDescriptor, Operand, Operation, RegionId, Rvalue, StateId,
    Transition, UnaryOp, VarId,
};

use crate::error::RuntimeError;
use crate::value::{Thrown, Value};

/// Environment the machine runs against: every `Call` rvalue and every
/// awaited future names a host function.
pub trait Host {
    fn call(&mut self, callee: &str, args: &[Value]) -> Result<Value, RuntimeError>;
}

impl<F> Host for F
where
    F: FnMut(&str, &[Value]) -> Result<Value, RuntimeError>,
{
    fn call(&mut self, callee: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        self(callee, args)
    }
}

/// What a suspended invocation is waiting for.
#[derive(Debug, Clone, PartialEq)]
pub struct SuspendRequest {
    pub callee: String,
    pub args: Vec<Value>,
}

/// Result of driving an invocation until it cannot proceed.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// An awaited call was reached; complete it and `resume`.
    Suspended(SuspendRequest),
    /// A yield was reached; take the value and `resume_yield`.
    Yielded(Value),
    /// The method returned (or ran off the end of its body).
    Done(Option<Value>),
    /// An exception left the method unhandled.
    Faulted(Thrown),
}

/// The exit intent recorded while a finally range runs.
#[derive(Debug, Clone)]
enum PendingAction {
    FallThrough(StateId),
    Return(Option<Value>),
    Throw(Thrown),
}

#[derive(Debug)]
struct UnwindFrame {
    region: RegionId,
    action: PendingAction,
}

#[derive(Debug)]
enum Mode {
    Ready,
    Suspended {
        resume: StateId,
        result: Option<VarId>,
        yielded: bool,
    },
    Finished(Status),
}

/// Control decision of one state's terminal operation or transition.
enum Flow {
    Transfer(StateId),
    Raise(Thrown),
    Return(Option<Value>),
    EndOfRange,
}

/// One live run of a machine.
pub struct Invocation<'d> {
    desc: &'d MachineDescriptor,
    state: StateId,
    frame: Vec<Option<Value>>,
    scratch: IndexMap<VarId, Value>,
    unwind: Vec<UnwindFrame>,
    /// Exceptions bound by catch handlers still on the path, innermost
    /// last. `Rethrow` re-raises from here.
    caught: Vec<(RegionId, Thrown)>,
    mode: Mode,
}

impl<'d> Invocation<'d> {
    pub fn new(desc: &'d MachineDescriptor, args: Vec<Value>) -> Result<Self, RuntimeError> {
        if args.len() != desc.params.len() {
            return Err(RuntimeError::TypeError(format!(
                "machine `{}` takes {} arguments, got {}",
                desc.name,
                desc.params.len(),
                args.len()
            )));
        }
        let mut inv = Invocation {
            desc,
            state: desc.entry,
            frame: vec![None; desc.frame.len()],
            scratch: IndexMap::new(),
            unwind: Vec::new(),
            caught: Vec::new(),
            mode: Mode::Ready,
        };
        for (&param, value) in desc.params.iter().zip(args) {
            inv.write_var(param, value);
        }
        Ok(inv)
    }

    /// Step until the invocation suspends, yields, or finishes.
    pub fn run(&mut self, host: &mut dyn Host) -> Result<Status, RuntimeError> {
        match &self.mode {
            Mode::Ready => self.step_loop(host),
            Mode::Suspended { .. } => Err(RuntimeError::TypeError(
                "invocation is suspended; resume it instead".to_string(),
            )),
            Mode::Finished(status) => Ok(status.clone()),
        }
    }

    /// Complete the awaited call with `value` and keep stepping.
    pub fn resume(&mut self, host: &mut dyn Host, value: Value) -> Result<Status, RuntimeError> {
        match self.mode {
            Mode::Suspended {
                resume,
                result,
                yielded: false,
            } => {
                if let Some(var) = result {
                    self.write_var(var, value);
                }
                self.state = resume;
                self.mode = Mode::Ready;
                self.step_loop(host)
            }
            _ => Err(RuntimeError::NotSuspended),
        }
    }

    /// Fail the awaited call (or inject cancellation): the exception
    /// surfaces at the resume state and dispatches from there, so
    /// enclosing catches and finallys see it.
    pub fn resume_err(
        &mut self,
        host: &mut dyn Host,
        thrown: Thrown,
    ) -> Result<Status, RuntimeError> {
        match self.mode {
            Mode::Suspended { resume, .. } => {
                self.state = resume;
                self.mode = Mode::Ready;
                if let Some(status) = self.dispatch_throw(resume, thrown, None) {
                    self.mode = Mode::Finished(status.clone());
                    return Ok(status);
                }
                self.step_loop(host)
            }
            _ => Err(RuntimeError::NotSuspended),
        }
    }

    /// Demand the next value after a yield.
    pub fn resume_yield(&mut self, host: &mut dyn Host) -> Result<Status, RuntimeError> {
        match self.mode {
            Mode::Suspended {
                resume,
                yielded: true,
                ..
            } => {
                self.state = resume;
                self.mode = Mode::Ready;
                self.step_loop(host)
            }
            _ => Err(RuntimeError::NotSuspended),
        }
    }

    // ── Stepping ────────────────────────────────────────────────────

    fn step_loop(&mut self, host: &mut dyn Host) -> Result<Status, RuntimeError> {
        let desc = self.desc;
        loop {
            let state = desc
                .state(self.state)
                .ok_or(RuntimeError::NoSuchState(self.state.0))?;

            let mut outcome: Option<Flow> = None;
            for op in &state.ops {
                match op {
                    Operation::Eval(rv) => {
                        self.eval_rvalue(rv, host)?;
                    }
                    Operation::Assign { dst, rvalue } => {
                        let v = self.eval_rvalue(rvalue, host)?;
                        self.write_var(*dst, v);
                    }
                    Operation::Branch {
                        cond,
                        then_state,
                        else_state,
                    } => {
                        let target = match self.eval_operand(cond)? {
                            Value::Bool(true) => *then_state,
                            Value::Bool(false) => *else_state,
                            other => {
                                return Err(RuntimeError::TypeError(format!(
                                    "branch on non-bool value of type {}",
                                    other.type_name()
                                )))
                            }
                        };
                        outcome = Some(Flow::Transfer(target));
                        break;
                    }
                    Operation::Suspend {
                        awaited,
                        resume,
                        result,
                    } => match awaited {
                        Awaitable::Future(rv) => {
                            let (callee, args) = match rv {
                                Rvalue::Call { callee, args } => {
                                    let vals = args
                                        .iter()
                                        .map(|a| self.eval_operand(a))
                                        .collect::<Result<Vec<_>, _>>()?;
                                    (callee.clone(), vals)
                                }
                                _ => {
                                    return Err(RuntimeError::TypeError(
                                        "awaited value is not a call".to_string(),
                                    ))
                                }
                            };
                            self.scratch.clear();
                            self.mode = Mode::Suspended {
                                resume: *resume,
                                result: *result,
                                yielded: false,
                            };
                            return Ok(Status::Suspended(SuspendRequest { callee, args }));
                        }
                        Awaitable::Yield(op) => {
                            let v = self.eval_operand(op)?;
                            self.scratch.clear();
                            self.mode = Mode::Suspended {
                                resume: *resume,
                                result: *result,
                                yielded: true,
                            };
                            return Ok(Status::Yielded(v));
                        }
                    },
                    Operation::Throw(op) => {
                        let v = self.eval_operand(op)?;
                        outcome = Some(Flow::Raise(Thrown::from_value(v)));
                        break;
                    }
                    Operation::Rethrow => {
                        let found = self
                            .caught
                            .iter()
                            .rev()
                            .find(|(rid, _)| {
                                desc.region(*rid)
                                    .map(|r| r.guards(self.state))
                                    .unwrap_or(false)
                            })
                            .map(|(_, t)| t.clone());
                        match found {
                            Some(t) => {
                                outcome = Some(Flow::Raise(t));
                                break;
                            }
                            None => return Err(RuntimeError::NoActiveException),
                        }
                    }
                    Operation::Return(op) => {
                        let v = match op {
                            Some(op) => Some(self.eval_operand(op)?),
                            None => None,
                        };
                        outcome = Some(Flow::Return(v));
                        break;
                    }
                }
            }

            let flow = match outcome {
                Some(f) => f,
                None => match state.transition {
                    Transition::Goto(t) => Flow::Transfer(t),
                    Transition::End => Flow::EndOfRange,
                    Transition::Return | Transition::Throw => {
                        return Err(RuntimeError::TypeError(
                            "state transition without a terminal operation".to_string(),
                        ))
                    }
                },
            };

            if let Some(status) = self.apply_flow(flow) {
                self.mode = Mode::Finished(status.clone());
                return Ok(status);
            }
        }
    }

    fn apply_flow(&mut self, flow: Flow) -> Option<Status> {
        match flow {
            Flow::Transfer(t) => {
                self.transfer(self.state, t, None);
                None
            }
            Flow::Return(v) => self.do_return(self.state, v, None),
            Flow::Raise(t) => self.dispatch_throw(self.state, t, None),
            Flow::EndOfRange => self.resolve_end(),
        }
    }

    /// `End` inside a finally range resumes the recorded exit action;
    /// anywhere else the body is exhausted and the invocation is done.
    fn resolve_end(&mut self) -> Option<Status> {
        let desc = self.desc;
        let current = self.state;
        let resuming = self
            .unwind
            .last()
            .and_then(|f| desc.region(f.region))
            .map(|r| r.in_finally(current))
            .unwrap_or(false);
        if resuming {
            if let Some(frame) = self.unwind.pop() {
                let rid = frame.region;
                return match frame.action {
                    PendingAction::FallThrough(t) => {
                        self.transfer(current, t, Some(rid));
                        None
                    }
                    PendingAction::Return(v) => self.do_return(current, v, Some(rid)),
                    PendingAction::Throw(t) => self.dispatch_throw(current, t, Some(rid)),
                };
            }
        }
        Some(Status::Done(None))
    }

    // ── Unwind routing ──────────────────────────────────────────────

    /// Move control from `from` to `target`. A region left behind with a
    /// finally range intercepts the move: the target is parked as the
    /// pending action and the finally runs first. `start_after` skips
    /// regions already unwound, for resuming a parked action.
    fn transfer(&mut self, from: StateId, target: StateId, start_after: Option<RegionId>) {
        let desc = self.desc;
        let mut started = start_after.is_none();
        for region in desc.regions_involving(from) {
            if !started {
                if Some(region.id) == start_after {
                    started = true;
                }
                continue;
            }
            if region.involves(target) {
                break;
            }
            if let Some(fin) = region.finally_entry {
                self.unwind.push(UnwindFrame {
                    region: region.id,
                    action: PendingAction::FallThrough(target),
                });
                self.state = fin;
                return;
            }
        }
        self.caught.retain(|(rid, _)| {
            desc.region(*rid)
                .map(|r| r.involves(target))
                .unwrap_or(false)
        });
        self.state = target;
    }

    fn do_return(
        &mut self,
        from: StateId,
        value: Option<Value>,
        start_after: Option<RegionId>,
    ) -> Option<Status> {
        let desc = self.desc;
        let mut started = start_after.is_none();
        for region in desc.regions_involving(from) {
            if !started {
                if Some(region.id) == start_after {
                    started = true;
                }
                continue;
            }
            if let Some(fin) = region.finally_entry {
                if !region.in_finally(from) {
                    self.unwind.push(UnwindFrame {
                        region: region.id,
                        action: PendingAction::Return(value),
                    });
                    self.state = fin;
                    return None;
                }
            }
        }
        Some(Status::Done(value))
    }

    /// Dispatch a thrown value from `from`: innermost catch-protected
    /// region with a matching filter wins; regions passed on the way out
    /// run their finally with the throw parked. An exception raised
    /// inside a finally discards that region's pending action.
    fn dispatch_throw(
        &mut self,
        from: StateId,
        thrown: Thrown,
        start_after: Option<RegionId>,
    ) -> Option<Status> {
        let desc = self.desc;
        let mut started = start_after.is_none();
        for region in desc.regions_involving(from) {
            if !started {
                if Some(region.id) == start_after {
                    started = true;
                }
                continue;
            }
            if region.in_finally(from) {
                if let Some(top) = self.unwind.last() {
                    if top.region == region.id {
                        self.unwind.pop();
                    }
                }
                continue;
            }
            if region.in_try(from) {
                if let Some(handler) = region
                    .catches
                    .iter()
                    .find(|c| c.filter.matches(&thrown.class))
                {
                    if let Some(var) = handler.binding {
                        self.write_var(var, thrown.value.clone());
                    }
                    self.caught.push((region.id, thrown));
                    self.state = handler.entry;
                    return None;
                }
            }
            if let Some(fin) = region.finally_entry {
                self.unwind.push(UnwindFrame {
                    region: region.id,
                    action: PendingAction::Throw(thrown),
                });
                self.state = fin;
                return None;
            }
        }
        Some(Status::Faulted(thrown))
    }

    // ── Evaluation ──────────────────────────────────────────────────

    fn eval_operand(&self, op: &Operand) -> Result<Value, RuntimeError> {
        match op {
            Operand::Var(v) => self.read_var(*v),
            Operand::Const(c) => Ok(match c {
                Const::Unit => Value::Unit,
                Const::Bool(b) => Value::Bool(*b),
                Const::Int(i) => Value::Int(*i),
                Const::Float(f) => Value::Float(*f),
                Const::Str(s) => Value::Str(s.clone()),
            }),
        }
    }

    fn eval_rvalue(&mut self, rv: &Rvalue, host: &mut dyn Host) -> Result<Value, RuntimeError> {
        match rv {
            Rvalue::Use(op) => self.eval_operand(op),
            Rvalue::Unary { op, operand } => {
                let v = self.eval_operand(operand)?;
                eval_unary(*op, v)
            }
            Rvalue::Binary { op, left, right } => {
                let l = self.eval_operand(left)?;
                let r = self.eval_operand(right)?;
                eval_binary(*op, l, r)
            }
            Rvalue::Call { callee, args } => {
                let vals = args
                    .iter()
                    .map(|a| self.eval_operand(a))
                    .collect::<Result<Vec<_>, _>>()?;
                host.call(callee, &vals)
            }
        }
    }

    fn read_var(&self, var: VarId) -> Result<Value, RuntimeError> {
        let stored = match self.desc.frame_slot(var) {
            Some(slot) => self.frame[slot as usize].clone(),
            None => self.scratch.get(&var).cloned(),
        };
        stored.ok_or_else(|| RuntimeError::UndefinedVariable(self.var_name(var)))
    }

    fn write_var(&mut self, var: VarId, value: Value) {
        match self.desc.frame_slot(var) {
            Some(slot) => self.frame[slot as usize] = Some(value),
            None => {
                self.scratch.insert(var, value);
            }
        }
    }

    fn var_name(&self, var: VarId) -> String {
        self.desc
            .local(var)
            .and_then(|d| d.name.clone())
            .unwrap_or_else(|| format!("_t{}", var.0))
    }
}

fn eval_unary(op: UnaryOp, v: Value) -> Result<Value, RuntimeError> {
    match (op, v) {
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (op, v) => Err(RuntimeError::TypeError(format!(
            "cannot apply {:?} to {}",
            op,
            v.type_name()
        ))),
    }
}

fn eval_binary(op: BinOp, l: Value, r: Value) -> Result<Value, RuntimeError> {
    use Value::*;
    match (op, l, r) {
        (BinOp::Add, Int(a), Int(b)) => Ok(Int(a + b)),
        (BinOp::Sub, Int(a), Int(b)) => Ok(Int(a - b)),
        (BinOp::Mul, Int(a), Int(b)) => Ok(Int(a * b)),
        (BinOp::Div, Int(_), Int(0)) => Err(RuntimeError::DivisionByZero),
        (BinOp::Div, Int(a), Int(b)) => Ok(Int(a / b)),
        (BinOp::Mod, Int(_), Int(0)) => Err(RuntimeError::DivisionByZero),
        (BinOp::Mod, Int(a), Int(b)) => Ok(Int(a % b)),

        (BinOp::Add, Float(a), Float(b)) => Ok(Float(a + b)),
        (BinOp::Sub, Float(a), Float(b)) => Ok(Float(a - b)),
        (BinOp::Mul, Float(a), Float(b)) => Ok(Float(a * b)),
        (BinOp::Div, Float(a), Float(b)) => Ok(Float(a / b)),

        (BinOp::Add, Str(a), Str(b)) => Ok(Str(a + &b)),

        (BinOp::Eq, a, b) => Ok(Bool(a == b)),
        (BinOp::Ne, a, b) => Ok(Bool(a != b)),

        (BinOp::Lt, Int(a), Int(b)) => Ok(Bool(a < b)),
        (BinOp::Gt, Int(a), Int(b)) => Ok(Bool(a > b)),
        (BinOp::Le, Int(a), Int(b)) => Ok(Bool(a <= b)),
        (BinOp::Ge, Int(a), Int(b)) => Ok(Bool(a >= b)),
        (BinOp::Lt, Float(a), Float(b)) => Ok(Bool(a < b)),
        (BinOp::Gt, Float(a), Float(b)) => Ok(Bool(a > b)),
        (BinOp::Le, Float(a), Float(b)) => Ok(Bool(a <= b)),
        (BinOp::Ge, Float(a), Float(b)) => Ok(Bool(a >= b)),
        (BinOp::Lt, Str(a), Str(b)) => Ok(Bool(a < b)),
        (BinOp::Gt, Str(a), Str(b)) => Ok(Bool(a > b)),

        (BinOp::And, Bool(a), Bool(b)) => Ok(Bool(a && b)),
        (BinOp::Or, Bool(a), Bool(b)) => Ok(Bool(a || b)),

        (op, l, r) => Err(RuntimeError::TypeError(format!(
            "cannot apply {:?} to {} and {}",
            op,
            l.type_name(),
            r.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_eval_basics() {
        assert_eq!(
            eval_binary(BinOp::Add, Value::Int(2), Value::Int(3)).unwrap(),
            Value::Int(5)
        );
        assert_eq!(
            eval_binary(BinOp::Lt, Value::Int(2), Value::Int(3)).unwrap(),
            Value::Bool(true)
        );
        assert!(matches!(
            eval_binary(BinOp::Div, Value::Int(1), Value::Int(0)),
            Err(RuntimeError::DivisionByZero)
        ));
        assert!(matches!(
            eval_binary(BinOp::Add, Value::Bool(true), Value::Int(1)),
            Err(RuntimeError::TypeError(_))
        ));
    }

    #[test]
    fn unary_eval_basics() {
        assert_eq!(
            eval_unary(UnaryOp::Neg, Value::Int(4)).unwrap(),
            Value::Int(-4)
        );
        assert_eq!(
            eval_unary(UnaryOp::Not, Value::Bool(false)).unwrap(),
            Value::Bool(true)
        );
    }
}
