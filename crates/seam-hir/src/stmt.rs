// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Statement nodes and the per-method root.

use crate::expr::{Expr, Ty};
use crate::{NodeId, Span};

/// One method body, the unit the lowering engine works on.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_ty: Ty,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

/// A statement in a method body.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
    pub span: Span,
}

/// The kind of statement. Lowering matches exhaustively over this enum,
/// so adding a construct is a compile-time obligation there.
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// Expression evaluated for its effect.
    Expr(Expr),
    /// Local declaration, optionally initialized.
    Let {
        name: String,
        ty: Ty,
        init: Option<Expr>,
    },
    /// Assignment to a local. The front-end resolves compound targets
    /// down to locals before handing the tree over.
    Assign {
        name: String,
        value: Expr,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        label: Option<String>,
        cond: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        label: Option<String>,
        body: Vec<Stmt>,
        cond: Expr,
    },
    For {
        label: Option<String>,
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    /// Nested block scope.
    Block(Vec<Stmt>),
    Break(Option<String>),
    Continue(Option<String>),
    /// A named statement, targetable by `Goto`.
    Labeled {
        name: String,
        body: Box<Stmt>,
    },
    /// Jump to a label. Already name-resolved by the front-end; the
    /// lowering still verifies the label exists in this method.
    Goto(String),
    Return(Option<Expr>),
    Throw(Expr),
    /// Re-raise the exception of the textually enclosing catch.
    Rethrow,
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    /// Iterator yield; a suspension point that hands a value to the
    /// consumer and resumes when the next value is demanded.
    Yield(Expr),
}

/// One catch arm of a try statement.
#[derive(Debug, Clone)]
pub struct CatchClause {
    /// Exception type name to match, or `None` for catch-all.
    pub filter: Option<String>,
    /// Local bound to the caught value inside the handler.
    pub binding: Option<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt { id: NodeId::DUMMY, kind, span: Span::DUMMY }
    }

    pub fn expr(e: Expr) -> Self {
        Stmt::new(StmtKind::Expr(e))
    }

    pub fn let_(name: impl Into<String>, ty: Ty, init: Option<Expr>) -> Self {
        Stmt::new(StmtKind::Let { name: name.into(), ty, init })
    }

    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Stmt::new(StmtKind::Assign { name: name.into(), value })
    }

    pub fn if_(cond: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt>) -> Self {
        Stmt::new(StmtKind::If { cond, then_body, else_body })
    }

    pub fn while_(cond: Expr, body: Vec<Stmt>) -> Self {
        Stmt::new(StmtKind::While { label: None, cond, body })
    }

    pub fn for_(
        init: Option<Stmt>,
        cond: Option<Expr>,
        step: Option<Stmt>,
        body: Vec<Stmt>,
    ) -> Self {
        Stmt::new(StmtKind::For {
            label: None,
            init: init.map(Box::new),
            cond,
            step: step.map(Box::new),
            body,
        })
    }

    pub fn labeled(name: impl Into<String>, body: Stmt) -> Self {
        Stmt::new(StmtKind::Labeled { name: name.into(), body: Box::new(body) })
    }

    pub fn goto(label: impl Into<String>) -> Self {
        Stmt::new(StmtKind::Goto(label.into()))
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Stmt::new(StmtKind::Return(value))
    }

    pub fn throw(value: Expr) -> Self {
        Stmt::new(StmtKind::Throw(value))
    }

    pub fn try_(body: Vec<Stmt>, catches: Vec<CatchClause>, finally: Option<Vec<Stmt>>) -> Self {
        Stmt::new(StmtKind::Try { body, catches, finally })
    }

    pub fn yield_(value: Expr) -> Self {
        Stmt::new(StmtKind::Yield(value))
    }
}

impl CatchClause {
    pub fn new(filter: Option<&str>, binding: Option<&str>, body: Vec<Stmt>) -> Self {
        CatchClause {
            filter: filter.map(str::to_string),
            binding: binding.map(str::to_string),
            body,
            span: Span::DUMMY,
        }
    }
}

impl Method {
    pub fn new(name: impl Into<String>, params: Vec<Param>, ret_ty: Ty, body: Vec<Stmt>) -> Self {
        Method { name: name.into(), params, ret_ty, body }
    }
}
