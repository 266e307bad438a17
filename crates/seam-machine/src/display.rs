// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Human-readable dumps of lowered machines.

use std::fmt;

use crate::descriptor::{MachineDescriptor, VarId};
use crate::operand::{BinOp, Const, Operand, Rvalue, UnaryOp};
use crate::state::{Awaitable, Operation, Transition};

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.0)
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Unit => write!(f, "unit"),
            Const::Bool(v) => write!(f, "{}", v),
            Const::Int(v) => write!(f, "{}", v),
            Const::Float(v) => write!(f, "{}", v),
            Const::Str(v) => write!(f, "{:?}", v),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(v) => write!(f, "{}", v),
            Operand::Const(c) => write!(f, "const {}", c),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

impl fmt::Display for Rvalue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rvalue::Use(op) => write!(f, "{}", op),
            Rvalue::Unary { op, operand } => write!(f, "{}{}", op, operand),
            Rvalue::Binary { op, left, right } => write!(f, "{} {} {}", left, op, right),
            Rvalue::Call { callee, args } => {
                write!(f, "call {}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Eval(rv) => write!(f, "eval {}", rv),
            Operation::Assign { dst, rvalue } => write!(f, "{} = {}", dst, rvalue),
            Operation::Branch {
                cond,
                then_state,
                else_state,
            } => write!(f, "branch {} ? s{} : s{}", cond, then_state.0, else_state.0),
            Operation::Suspend {
                awaited,
                resume,
                result,
            } => {
                match awaited {
                    Awaitable::Future(rv) => write!(f, "suspend await {}", rv)?,
                    Awaitable::Yield(op) => write!(f, "suspend yield {}", op)?,
                }
                if let Some(var) = result {
                    write!(f, " -> {}", var)?;
                }
                write!(f, " resume s{}", resume.0)
            }
            Operation::Throw(op) => write!(f, "throw {}", op),
            Operation::Rethrow => write!(f, "rethrow"),
            Operation::Return(Some(op)) => write!(f, "return {}", op),
            Operation::Return(None) => write!(f, "return"),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Goto(t) => write!(f, "goto s{}", t.0),
            Transition::Return => write!(f, "return"),
            Transition::Throw => write!(f, "throw"),
            Transition::End => write!(f, "end"),
        }
    }
}

impl fmt::Display for MachineDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "machine {} (entry s{}) {{", self.name, self.entry.0)?;

        if !self.frame.is_empty() {
            write!(f, "  frame:")?;
            for cap in &self.frame {
                write!(f, " [{}] {}: {:?}", cap.slot, cap.name, cap.ty)?;
            }
            writeln!(f)?;
        }

        for region in &self.regions {
            write!(f, "  region {}: try {{", region.id.0)?;
            for (i, s) in region.try_states.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, " s{}", s.0)?;
            }
            write!(f, " }}")?;
            for catch in &region.catches {
                match &catch.filter {
                    crate::regions::TypeFilter::Named(name) => {
                        write!(f, " catch {} -> s{}", name, catch.entry.0)?
                    }
                    crate::regions::TypeFilter::Any => {
                        write!(f, " catch * -> s{}", catch.entry.0)?
                    }
                }
            }
            if let Some(fin) = region.finally_entry {
                write!(f, " finally -> s{}", fin.0)?;
            }
            writeln!(f)?;
        }

        for state in &self.states {
            writeln!(f, "  s{}:", state.id.0)?;
            for op in &state.ops {
                writeln!(f, "    {}", op)?;
            }
            // The transition line is redundant when the last op already
            // transfers control.
            let summarized = state.ops.last().map(|op| op.is_terminal()).unwrap_or(false);
            if !summarized {
                writeln!(f, "    {}", state.transition)?;
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use crate::lower::{lower_method, LowerOptions};
    use seam_hir::{Expr, Method, Stmt, Ty};

    #[test]
    fn dump_names_entry_and_states() {
        let method = Method::new(
            "demo",
            vec![],
            Ty::Unit,
            vec![
                Stmt::let_("x", Ty::Int, Some(Expr::int(1))),
                Stmt::expr(Expr::suspending_call("pause", vec![], Ty::Unit)),
                Stmt::ret(Some(Expr::local("x", Ty::Int))),
            ],
        );
        let desc = lower_method(&method, &LowerOptions::default()).unwrap();
        let dump = desc.to_string();

        assert!(dump.starts_with("machine demo (entry s0)"));
        assert!(dump.contains("suspend await"));
        assert!(dump.contains("frame:"));
        assert!(dump.contains("return"));
    }
}
