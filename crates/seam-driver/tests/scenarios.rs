// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! End-to-end lower-then-drive scenarios.
//!
//! Each test builds a method body, lowers it to a machine, and drives
//! the machine against a recording host, checking both the final status
//! and the order of host-visible calls.

use std::collections::HashMap;

use seam_driver::{Host, Invocation, RuntimeError, Status, Thrown, Value};
use seam_hir::{BinOp, CatchClause, Expr, Method, Param, Stmt, StmtKind, Ty};
use seam_machine::{lower_method, LowerOptions, MachineDescriptor};

/// Host that records every call and replies from a script (or `Unit`).
#[derive(Default)]
struct Recorder {
    calls: Vec<String>,
    replies: HashMap<String, Value>,
}

impl Recorder {
    fn reply(mut self, callee: &str, value: Value) -> Self {
        self.replies.insert(callee.to_string(), value);
        self
    }
}

impl Host for Recorder {
    fn call(&mut self, callee: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        self.calls.push(callee.to_string());
        let _ = args;
        Ok(self.replies.get(callee).cloned().unwrap_or(Value::Unit))
    }
}

fn lower(body: Vec<Stmt>) -> MachineDescriptor {
    let method = Method::new("scenario", vec![], Ty::Int, body);
    lower_method(&method, &LowerOptions::default()).unwrap()
}

// Expression shorthand for the test bodies.
fn n(v: i64) -> Expr {
    Expr::int(v)
}
fn var(name: &str) -> Expr {
    Expr::local(name, Ty::Int)
}
fn add(l: Expr, r: Expr) -> Expr {
    Expr::binary(BinOp::Add, l, r, Ty::Int)
}
fn mul(l: Expr, r: Expr) -> Expr {
    Expr::binary(BinOp::Mul, l, r, Ty::Int)
}
fn lt(l: Expr, r: Expr) -> Expr {
    Expr::binary(BinOp::Lt, l, r, Ty::Bool)
}
fn eq(l: Expr, r: Expr) -> Expr {
    Expr::binary(BinOp::Eq, l, r, Ty::Bool)
}
fn inc(name: &str) -> Stmt {
    Stmt::assign(name, add(var(name), n(1)))
}
fn counted_for(label: Option<&str>, v: &str, limit: i64, body: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::For {
        label: label.map(str::to_string),
        init: Some(Box::new(Stmt::let_(v, Ty::Int, Some(n(0))))),
        cond: Some(lt(var(v), n(limit))),
        step: Some(Box::new(inc(v))),
        body,
    })
}

#[test]
fn no_suspension_points_complete_in_one_run() {
    let desc = lower(vec![
        Stmt::let_("x", Ty::Int, Some(n(1))),
        Stmt::if_(
            lt(var("x"), n(2)),
            vec![Stmt::ret(Some(n(10)))],
            vec![Stmt::ret(Some(n(20)))],
        ),
    ]);
    assert!(desc.suspension_points.is_empty());

    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(10))));
}

#[test]
fn arguments_bind_to_parameters() {
    let method = Method::new(
        "succ",
        vec![Param {
            name: "v".to_string(),
            ty: Ty::Int,
        }],
        Ty::Int,
        vec![Stmt::ret(Some(add(var("v"), n(1))))],
    );
    let desc = lower_method(&method, &LowerOptions::default()).unwrap();

    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![Value::Int(41)]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(42))));

    assert!(matches!(
        Invocation::new(&desc, vec![]),
        Err(RuntimeError::TypeError(_))
    ));
}

#[test]
fn labeled_break_leaves_the_named_loop() {
    // 'outer: for i in 0..3 { for j in 0..3 {
    //     if i == 1 && j == 1 { break 'outer } count += 1 } }
    let break_cond = Expr::binary(
        BinOp::And,
        eq(var("i"), n(1)),
        eq(var("j"), n(1)),
        Ty::Bool,
    );
    let inner = counted_for(
        None,
        "j",
        3,
        vec![
            Stmt::if_(
                break_cond,
                vec![Stmt::new(StmtKind::Break(Some("outer".to_string())))],
                vec![],
            ),
            inc("count"),
        ],
    );
    let desc = lower(vec![
        Stmt::let_("count", Ty::Int, Some(n(0))),
        counted_for(Some("outer"), "i", 3, vec![inner]),
        Stmt::ret(Some(var("count"))),
    ]);

    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(4))));
}

#[test]
fn labeled_continue_advances_the_named_loop() {
    // Each outer iteration bumps count once, then continues outward.
    let inner = counted_for(
        None,
        "j",
        3,
        vec![
            Stmt::if_(
                eq(var("j"), n(1)),
                vec![Stmt::new(StmtKind::Continue(Some("outer".to_string())))],
                vec![],
            ),
            inc("count"),
        ],
    );
    let desc = lower(vec![
        Stmt::let_("count", Ty::Int, Some(n(0))),
        counted_for(Some("outer"), "i", 3, vec![inner]),
        Stmt::ret(Some(var("count"))),
    ]);

    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(3))));
}

#[test]
fn goto_reenters_outer_loop_without_reinitializing() {
    // top: for i in 0..3 {
    //     if i == 1 { goto top }          // lands at the step: i becomes 2
    //     for j in 0..3 { counter += 1 }
    // }
    // i=0 contributes 3, i=1 jumps, i=2 contributes 3: counter == 6.
    let body = counted_for(
        None,
        "i",
        3,
        vec![
            Stmt::if_(eq(var("i"), n(1)), vec![Stmt::goto("top")], vec![]),
            counted_for(None, "j", 3, vec![inc("counter")]),
        ],
    );
    let desc = lower(vec![
        Stmt::let_("counter", Ty::Int, Some(n(0))),
        Stmt::labeled("top", body),
        Stmt::ret(Some(var("counter"))),
    ]);

    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(6))));
}

#[test]
fn do_while_runs_body_before_first_test() {
    let desc = lower(vec![
        Stmt::let_("i", Ty::Int, Some(n(0))),
        Stmt::new(StmtKind::DoWhile {
            label: None,
            body: vec![inc("i")],
            cond: lt(var("i"), n(3)),
        }),
        Stmt::ret(Some(var("i"))),
    ]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(3))));

    // A false condition still runs the body once.
    let desc = lower(vec![
        Stmt::let_("i", Ty::Int, Some(n(0))),
        Stmt::new(StmtKind::DoWhile {
            label: None,
            body: vec![inc("i")],
            cond: Expr::bool(false),
        }),
        Stmt::ret(Some(var("i"))),
    ]);
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(1))));
}

#[test]
fn host_call_errors_abort_the_run() {
    let desc = lower(vec![
        Stmt::expr(Expr::call("missing", vec![], Ty::Unit)),
        Stmt::ret(Some(n(0))),
    ]);
    let mut host = |callee: &str, _args: &[Value]| -> Result<Value, RuntimeError> {
        Err(RuntimeError::UndefinedFunction(callee.to_string()))
    };
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert!(matches!(
        inv.run(&mut host),
        Err(RuntimeError::UndefinedFunction(name)) if name == "missing"
    ));
}

// ── Finally semantics ───────────────────────────────────────────────

#[test]
fn finally_runs_once_on_normal_exit() {
    let desc = lower(vec![
        Stmt::try_(
            vec![Stmt::expr(Expr::call("work", vec![], Ty::Unit))],
            vec![],
            Some(vec![Stmt::expr(Expr::call("cleanup", vec![], Ty::Unit))]),
        ),
        Stmt::ret(Some(n(0))),
    ]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(0))));
    assert_eq!(host.calls, vec!["work", "cleanup"]);
}

#[test]
fn finally_runs_once_on_break() {
    let desc = lower(vec![
        Stmt::while_(
            Expr::bool(true),
            vec![Stmt::try_(
                vec![Stmt::new(StmtKind::Break(None))],
                vec![],
                Some(vec![Stmt::expr(Expr::call("cleanup", vec![], Ty::Unit))]),
            )],
        ),
        Stmt::expr(Expr::call("after", vec![], Ty::Unit)),
        Stmt::ret(Some(n(0))),
    ]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(0))));
    assert_eq!(host.calls, vec!["cleanup", "after"]);
}

#[test]
fn finally_runs_once_on_continue() {
    // Iterations 0 and 2 do the work; iteration 1 skips it with a
    // continue. Every iteration runs the cleanup exactly once.
    let desc = lower(vec![
        counted_for(
            None,
            "i",
            3,
            vec![Stmt::try_(
                vec![
                    Stmt::if_(
                        eq(var("i"), n(1)),
                        vec![Stmt::new(StmtKind::Continue(None))],
                        vec![],
                    ),
                    Stmt::expr(Expr::call("work", vec![], Ty::Unit)),
                ],
                vec![],
                Some(vec![Stmt::expr(Expr::call("cleanup", vec![], Ty::Unit))]),
            )],
        ),
        Stmt::ret(Some(n(0))),
    ]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(0))));
    assert_eq!(
        host.calls,
        vec!["work", "cleanup", "cleanup", "work", "cleanup"]
    );
}

#[test]
fn finally_runs_once_on_return_and_preserves_the_value() {
    let desc = lower(vec![Stmt::try_(
        vec![Stmt::ret(Some(n(5)))],
        vec![],
        Some(vec![Stmt::expr(Expr::call("cleanup", vec![], Ty::Unit))]),
    )]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(5))));
    assert_eq!(host.calls, vec!["cleanup"]);
}

#[test]
fn finally_runs_once_on_unhandled_throw() {
    let desc = lower(vec![Stmt::try_(
        vec![Stmt::throw(Expr::str("boom"))],
        vec![],
        Some(vec![Stmt::expr(Expr::call("cleanup", vec![], Ty::Unit))]),
    )]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    match inv.run(&mut host).unwrap() {
        Status::Faulted(thrown) => assert_eq!(thrown.value, Value::Str("boom".to_string())),
        other => panic!("expected fault, got {:?}", other),
    }
    assert_eq!(host.calls, vec!["cleanup"]);
}

#[test]
fn nested_finallys_run_innermost_first() {
    let desc = lower(vec![Stmt::try_(
        vec![Stmt::try_(
            vec![Stmt::ret(Some(n(7)))],
            vec![],
            Some(vec![Stmt::expr(Expr::call("f_inner", vec![], Ty::Unit))]),
        )],
        vec![],
        Some(vec![Stmt::expr(Expr::call("f_outer", vec![], Ty::Unit))]),
    )]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(7))));
    assert_eq!(host.calls, vec!["f_inner", "f_outer"]);
}

// ── Catch dispatch ──────────────────────────────────────────────────

#[test]
fn catch_filters_match_in_declaration_order() {
    let desc = lower(vec![Stmt::try_(
        vec![Stmt::throw(Expr::call("make_err", vec![], Ty::Named("IoError".into())))],
        vec![
            CatchClause::new(Some("NetError"), None, vec![Stmt::ret(Some(n(1)))]),
            CatchClause::new(Some("IoError"), None, vec![Stmt::ret(Some(n(2)))]),
            CatchClause::new(None, None, vec![Stmt::ret(Some(n(3)))]),
        ],
        None,
    )]);
    let mut host = Recorder::default().reply("make_err", Value::exception("IoError", "gone"));
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(2))));
}

#[test]
fn catch_binding_carries_the_thrown_value() {
    let desc = lower(vec![Stmt::try_(
        vec![Stmt::throw(Expr::call("make_err", vec![], Ty::Named("IoError".into())))],
        vec![CatchClause::new(
            Some("IoError"),
            Some("e"),
            vec![
                Stmt::expr(Expr::call(
                    "log",
                    vec![Expr::local("e", Ty::Named("IoError".into()))],
                    Ty::Unit,
                )),
                Stmt::ret(Some(n(1))),
            ],
        )],
        None,
    )]);
    let mut host = Recorder::default().reply("make_err", Value::exception("IoError", "gone"));
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(1))));
    assert_eq!(host.calls, vec!["make_err", "log"]);
}

#[test]
fn rethrow_escapes_through_finally_to_the_outer_catch() {
    let inner = Stmt::try_(
        vec![Stmt::throw(Expr::call("make_err", vec![], Ty::Named("IoError".into())))],
        vec![CatchClause::new(
            None,
            None,
            vec![
                Stmt::expr(Expr::call("saw", vec![], Ty::Unit)),
                Stmt::new(StmtKind::Rethrow),
            ],
        )],
        Some(vec![Stmt::expr(Expr::call("cleanup", vec![], Ty::Unit))]),
    );
    let desc = lower(vec![Stmt::try_(
        vec![inner],
        vec![CatchClause::new(Some("IoError"), None, vec![Stmt::ret(Some(n(9)))])],
        None,
    )]);
    let mut host = Recorder::default().reply("make_err", Value::exception("IoError", "gone"));
    let mut inv = Invocation::new(&desc, vec![]).unwrap();
    assert_eq!(inv.run(&mut host).unwrap(), Status::Done(Some(Value::Int(9))));
    assert_eq!(host.calls, vec!["make_err", "saw", "cleanup"]);
}

// ── Suspension ──────────────────────────────────────────────────────

#[test]
fn captured_values_survive_suspension() {
    let desc = lower(vec![
        Stmt::let_("x", Ty::Int, Some(n(41))),
        Stmt::expr(Expr::suspending_call("pause", vec![], Ty::Unit)),
        Stmt::ret(Some(add(var("x"), n(1)))),
    ]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();

    match inv.run(&mut host).unwrap() {
        Status::Suspended(req) => assert_eq!(req.callee, "pause"),
        other => panic!("expected suspension, got {:?}", other),
    }
    assert_eq!(
        inv.resume(&mut host, Value::Unit).unwrap(),
        Status::Done(Some(Value::Int(42)))
    );
}

#[test]
fn sequential_awaits_thread_values_through() {
    // base flows into the first await, its result into the second.
    let desc = lower(vec![
        Stmt::let_("base", Ty::Int, Some(n(10))),
        Stmt::let_(
            "a",
            Ty::Int,
            Some(Expr::suspending_call("fetch_a", vec![var("base")], Ty::Int)),
        ),
        Stmt::let_(
            "b",
            Ty::Int,
            Some(Expr::suspending_call("fetch_b", vec![var("a")], Ty::Int)),
        ),
        Stmt::ret(Some(var("b"))),
    ]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();

    let req = match inv.run(&mut host).unwrap() {
        Status::Suspended(req) => req,
        other => panic!("expected suspension, got {:?}", other),
    };
    assert_eq!(req.callee, "fetch_a");
    assert_eq!(req.args, vec![Value::Int(10)]);

    let req = match inv.resume(&mut host, Value::Int(11)).unwrap() {
        Status::Suspended(req) => req,
        other => panic!("expected suspension, got {:?}", other),
    };
    assert_eq!(req.callee, "fetch_b");
    assert_eq!(req.args, vec![Value::Int(11)]);

    assert_eq!(
        inv.resume(&mut host, Value::Int(22)).unwrap(),
        Status::Done(Some(Value::Int(22)))
    );
}

#[test]
fn awaits_inside_one_expression_decompose_left_to_right() {
    // fetch_a() * 10 + fetch_b()
    let sum = add(
        mul(Expr::suspending_call("fetch_a", vec![], Ty::Int), n(10)),
        Expr::suspending_call("fetch_b", vec![], Ty::Int),
    );
    let desc = lower(vec![Stmt::ret(Some(sum))]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();

    match inv.run(&mut host).unwrap() {
        Status::Suspended(req) => assert_eq!(req.callee, "fetch_a"),
        other => panic!("expected suspension, got {:?}", other),
    }
    match inv.resume(&mut host, Value::Int(3)).unwrap() {
        Status::Suspended(req) => assert_eq!(req.callee, "fetch_b"),
        other => panic!("expected suspension, got {:?}", other),
    }
    assert_eq!(
        inv.resume(&mut host, Value::Int(4)).unwrap(),
        Status::Done(Some(Value::Int(34)))
    );
}

#[test]
fn throw_after_completed_suspension_matches_enclosing_catch() {
    let desc = lower(vec![Stmt::try_(
        vec![
            Stmt::expr(Expr::suspending_call("pause", vec![], Ty::Unit)),
            Stmt::throw(Expr::call("make_err", vec![], Ty::Named("IoError".into()))),
        ],
        vec![CatchClause::new(Some("IoError"), Some("e"), vec![Stmt::ret(Some(n(1)))])],
        None,
    )]);
    let mut host = Recorder::default().reply("make_err", Value::exception("IoError", "gone"));
    let mut inv = Invocation::new(&desc, vec![]).unwrap();

    assert!(matches!(inv.run(&mut host).unwrap(), Status::Suspended(_)));
    assert_eq!(
        inv.resume(&mut host, Value::Unit).unwrap(),
        Status::Done(Some(Value::Int(1)))
    );
}

#[test]
fn resume_err_dispatches_into_the_enclosing_catch() {
    let desc = lower(vec![Stmt::try_(
        vec![
            Stmt::expr(Expr::suspending_call("pause", vec![], Ty::Unit)),
            Stmt::expr(Expr::call("not_reached", vec![], Ty::Unit)),
        ],
        vec![CatchClause::new(Some("IoError"), None, vec![Stmt::ret(Some(n(8)))])],
        None,
    )]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();

    assert!(matches!(inv.run(&mut host).unwrap(), Status::Suspended(_)));
    let thrown = Thrown::new("IoError", Value::exception("IoError", "failed"));
    assert_eq!(
        inv.resume_err(&mut host, thrown).unwrap(),
        Status::Done(Some(Value::Int(8)))
    );
    assert!(host.calls.is_empty());
}

#[test]
fn cancellation_at_a_suspension_point_still_runs_finally() {
    let desc = lower(vec![Stmt::try_(
        vec![
            Stmt::expr(Expr::suspending_call("pause", vec![], Ty::Unit)),
            Stmt::expr(Expr::call("not_reached", vec![], Ty::Unit)),
        ],
        vec![],
        Some(vec![Stmt::expr(Expr::call("cleanup", vec![], Ty::Unit))]),
    )]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();

    assert!(matches!(inv.run(&mut host).unwrap(), Status::Suspended(_)));
    let cancel = Thrown::new("Cancelled", Value::Unit);
    match inv.resume_err(&mut host, cancel.clone()).unwrap() {
        Status::Faulted(thrown) => assert_eq!(thrown, cancel),
        other => panic!("expected fault, got {:?}", other),
    }
    assert_eq!(host.calls, vec!["cleanup"]);
}

// ── Yield ───────────────────────────────────────────────────────────

#[test]
fn yield_iteration_produces_values_in_order() {
    let desc = lower(vec![counted_for(
        None,
        "i",
        3,
        vec![Stmt::yield_(mul(var("i"), n(2)))],
    )]);
    let mut host = Recorder::default();
    let mut inv = Invocation::new(&desc, vec![]).unwrap();

    let mut values = Vec::new();
    let mut status = inv.run(&mut host).unwrap();
    loop {
        match status {
            Status::Yielded(v) => {
                values.push(v);
                status = inv.resume_yield(&mut host).unwrap();
            }
            Status::Done(None) => break,
            other => panic!("unexpected status {:?}", other),
        }
    }
    assert_eq!(
        values,
        vec![Value::Int(0), Value::Int(2), Value::Int(4)]
    );
}
