// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Closure capture: decide which variables outlive a single state run.
//!
//! Backward liveness over the finished state graph. A variable is
//! promoted to the persistent frame when it is live into any resume
//! state (its value must survive a suspension) or live across a
//! loop-back edge with a definition elsewhere (re-entry must observe the
//! previous iteration's value). Everything else stays scratch.

use std::collections::{HashMap, HashSet};

use crate::descriptor::{CapturedVariable, LocalDecl, State, StateId, SuspensionPoint, VarId};
use crate::regions::ExceptionRegion;
use crate::state::{Operation, Transition};

/// Compute the frame layout and fill in each suspension point's captured
/// set. Slots are assigned in ascending `VarId` order, so the layout is
/// deterministic for a given input.
pub(crate) fn run(
    states: &[State],
    locals: &[LocalDecl],
    regions: &[ExceptionRegion],
    suspension_points: &mut [SuspensionPoint],
) -> Vec<CapturedVariable> {
    let successors = successor_map(states, regions);
    let entry_defs = entry_def_map(states, locals);
    let live_in = liveness(states, &successors, &entry_defs);
    let def_states = def_state_map(states, &entry_defs);

    let mut promoted: HashSet<VarId> = HashSet::new();

    for sp in suspension_points.iter() {
        promoted.extend(&live_in[sp.resume.0 as usize]);
    }

    for state in states {
        for &succ in &successors[state.id.0 as usize] {
            if succ >= state.id {
                continue;
            }
            for &var in &live_in[succ.0 as usize] {
                let defined_elsewhere = def_states
                    .get(&var)
                    .map(|ds| ds.iter().any(|&d| d != succ))
                    .unwrap_or(false);
                if defined_elsewhere {
                    promoted.insert(var);
                }
            }
        }
    }

    let mut frame_vars: Vec<VarId> = promoted.into_iter().collect();
    frame_vars.sort();

    let frame: Vec<CapturedVariable> = frame_vars
        .iter()
        .enumerate()
        .map(|(slot, &var)| {
            let decl = &locals[var.0 as usize];
            CapturedVariable {
                var,
                name: decl
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("_t{}", var.0)),
                ty: decl.ty.clone(),
                slot: slot as u32,
            }
        })
        .collect();

    let frame_set: HashSet<VarId> = frame_vars.iter().copied().collect();
    for sp in suspension_points.iter_mut() {
        let mut captured: Vec<VarId> = live_in[sp.resume.0 as usize]
            .iter()
            .copied()
            .filter(|v| frame_set.contains(v))
            .collect();
        captured.sort();
        sp.captured = captured;
    }

    frame
}

/// Control-flow successors of each state, including exception edges: an
/// exception anywhere in a try range can surface at that region's catch
/// entries, and any guarded state can unwind into the finally range.
fn successor_map(states: &[State], regions: &[ExceptionRegion]) -> Vec<Vec<StateId>> {
    let mut succ: Vec<Vec<StateId>> = vec![Vec::new(); states.len()];
    for state in states {
        let out = &mut succ[state.id.0 as usize];
        for op in &state.ops {
            match op {
                Operation::Branch {
                    then_state,
                    else_state,
                    ..
                } => {
                    out.push(*then_state);
                    out.push(*else_state);
                }
                Operation::Suspend { resume, .. } => out.push(*resume),
                _ => {}
            }
        }
        if let Transition::Goto(t) = state.transition {
            out.push(t);
        }
        for region in regions {
            if region.in_try(state.id) {
                for catch in &region.catches {
                    out.push(catch.entry);
                }
            }
            if region.guards(state.id) {
                if let Some(fin) = region.finally_entry {
                    out.push(fin);
                }
            }
        }
        out.sort();
        out.dedup();
    }
    succ
}

/// Variables defined on entry to a state rather than by one of its ops:
/// suspend results materialize at the resume state, catch bindings at
/// the handler entry, and parameters at the machine entry.
fn entry_def_map(states: &[State], locals: &[LocalDecl]) -> HashMap<StateId, Vec<VarId>> {
    let mut map: HashMap<StateId, Vec<VarId>> = HashMap::new();
    for decl in locals {
        if decl.is_param {
            map.entry(StateId(0)).or_default().push(decl.id);
        }
    }
    for state in states {
        for op in &state.ops {
            if let Operation::Suspend {
                resume,
                result: Some(var),
                ..
            } = op
            {
                map.entry(*resume).or_default().push(*var);
            }
        }
    }
    map
}

fn liveness(
    states: &[State],
    successors: &[Vec<StateId>],
    entry_defs: &HashMap<StateId, Vec<VarId>>,
) -> Vec<HashSet<VarId>> {
    let mut live_in: Vec<HashSet<VarId>> = vec![HashSet::new(); states.len()];
    let mut changed = true;
    while changed {
        changed = false;
        for state in states.iter().rev() {
            let idx = state.id.0 as usize;
            let mut live: HashSet<VarId> = HashSet::new();
            for succ in &successors[idx] {
                live.extend(&live_in[succ.0 as usize]);
            }
            let mut defs = Vec::new();
            let mut uses = Vec::new();
            for op in state.ops.iter().rev() {
                defs.clear();
                uses.clear();
                op.defs(&mut defs);
                op.uses(&mut uses);
                for d in &defs {
                    live.remove(d);
                }
                live.extend(uses.iter().copied());
            }
            if let Some(entry) = entry_defs.get(&state.id) {
                for d in entry {
                    live.remove(d);
                }
            }
            if live != live_in[idx] {
                live_in[idx] = live;
                changed = true;
            }
        }
    }
    live_in
}

fn def_state_map(
    states: &[State],
    entry_defs: &HashMap<StateId, Vec<VarId>>,
) -> HashMap<VarId, Vec<StateId>> {
    let mut map: HashMap<VarId, Vec<StateId>> = HashMap::new();
    let mut defs = Vec::new();
    for state in states {
        for op in &state.ops {
            defs.clear();
            op.defs(&mut defs);
            for &d in &defs {
                map.entry(d).or_default().push(state.id);
            }
        }
    }
    for (&state, vars) in entry_defs {
        for &v in vars {
            map.entry(v).or_default().push(state);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::{lower_method, LowerOptions};
    use seam_hir::{BinOp, Expr, Method, Stmt, Ty};

    fn lower(body: Vec<Stmt>) -> crate::MachineDescriptor {
        let method = Method::new("test", vec![], Ty::Unit, body);
        lower_method(&method, &LowerOptions::default()).unwrap()
    }

    #[test]
    fn local_live_across_suspension_is_promoted() {
        let desc = lower(vec![
            Stmt::let_("x", Ty::Int, Some(Expr::int(7))),
            Stmt::expr(Expr::suspending_call("pause", vec![], Ty::Unit)),
            Stmt::ret(Some(Expr::local("x", Ty::Int))),
        ]);

        let x = desc
            .locals
            .iter()
            .find(|d| d.name.as_deref() == Some("x"))
            .unwrap()
            .id;
        assert!(desc.frame_slot(x).is_some());
        assert_eq!(desc.suspension_points.len(), 1);
        assert!(desc.suspension_points[0].captured.contains(&x));
    }

    #[test]
    fn local_dead_after_suspension_stays_scratch() {
        let desc = lower(vec![
            Stmt::let_("x", Ty::Int, Some(Expr::int(7))),
            Stmt::expr(Expr::call("use", vec![Expr::local("x", Ty::Int)], Ty::Unit)),
            Stmt::expr(Expr::suspending_call("pause", vec![], Ty::Unit)),
        ]);

        let x = desc
            .locals
            .iter()
            .find(|d| d.name.as_deref() == Some("x"))
            .unwrap()
            .id;
        assert!(desc.frame_slot(x).is_none());
        assert!(desc.suspension_points[0].captured.is_empty());
    }

    #[test]
    fn suspend_result_not_captured_at_its_own_resume() {
        // The driver writes the result on resumption; it only joins the
        // frame if a later suspension needs it.
        let desc = lower(vec![
            Stmt::let_(
                "v",
                Ty::Int,
                Some(Expr::suspending_call("fetch", vec![], Ty::Int)),
            ),
            Stmt::expr(Expr::call("use", vec![Expr::local("v", Ty::Int)], Ty::Unit)),
        ]);
        assert!(desc.suspension_points[0].captured.is_empty());
    }

    #[test]
    fn value_crossing_two_suspensions_is_captured_at_the_second() {
        let desc = lower(vec![
            Stmt::let_(
                "a",
                Ty::Int,
                Some(Expr::suspending_call("fetch_a", vec![], Ty::Int)),
            ),
            Stmt::let_(
                "b",
                Ty::Int,
                Some(Expr::suspending_call("fetch_b", vec![], Ty::Int)),
            ),
            Stmt::ret(Some(Expr::binary(
                BinOp::Add,
                Expr::local("a", Ty::Int),
                Expr::local("b", Ty::Int),
                Ty::Int,
            ))),
        ]);

        let a = desc
            .locals
            .iter()
            .find(|d| d.name.as_deref() == Some("a"))
            .unwrap()
            .id;
        let second = &desc.suspension_points[1];
        assert!(second.captured.contains(&a));
        assert!(desc.frame_slot(a).is_some());
    }

    #[test]
    fn frame_slots_are_dense_and_ordered() {
        let desc = lower(vec![
            Stmt::let_("x", Ty::Int, Some(Expr::int(1))),
            Stmt::let_("y", Ty::Int, Some(Expr::int(2))),
            Stmt::expr(Expr::suspending_call("pause", vec![], Ty::Unit)),
            Stmt::ret(Some(Expr::binary(
                BinOp::Add,
                Expr::local("x", Ty::Int),
                Expr::local("y", Ty::Int),
                Ty::Int,
            ))),
        ]);

        let slots: Vec<u32> = desc.frame.iter().map(|c| c.slot).collect();
        assert_eq!(slots, (0..desc.frame.len() as u32).collect::<Vec<_>>());
        let vars: Vec<VarId> = desc.frame.iter().map(|c| c.var).collect();
        let mut sorted = vars.clone();
        sorted.sort();
        assert_eq!(vars, sorted);
    }

    #[test]
    fn loop_counter_promoted_across_back_edge() {
        let desc = lower(vec![
            Stmt::let_("i", Ty::Int, Some(Expr::int(0))),
            Stmt::while_(
                Expr::binary(BinOp::Lt, Expr::local("i", Ty::Int), Expr::int(3), Ty::Bool),
                vec![Stmt::assign(
                    "i",
                    Expr::binary(BinOp::Add, Expr::local("i", Ty::Int), Expr::int(1), Ty::Int),
                )],
            ),
        ]);

        let i = desc
            .locals
            .iter()
            .find(|d| d.name.as_deref() == Some("i"))
            .unwrap()
            .id;
        assert!(desc.frame_slot(i).is_some());
    }

    #[test]
    fn exception_edge_keeps_try_locals_live_into_catch() {
        // `x` is only read in the catch body, so without the exception
        // edge it would look dead at the suspension inside the try.
        let desc = lower(vec![
            Stmt::let_("x", Ty::Int, Some(Expr::int(9))),
            Stmt::try_(
                vec![Stmt::expr(Expr::suspending_call("pause", vec![], Ty::Unit))],
                vec![seam_hir::CatchClause::new(
                    None,
                    None,
                    vec![Stmt::expr(Expr::call(
                        "log",
                        vec![Expr::local("x", Ty::Int)],
                        Ty::Unit,
                    ))],
                )],
                None,
            ),
        ]);

        let x = desc
            .locals
            .iter()
            .find(|d| d.name.as_deref() == Some("x"))
            .unwrap()
            .id;
        assert!(desc.suspension_points[0].captured.contains(&x));
    }
}
