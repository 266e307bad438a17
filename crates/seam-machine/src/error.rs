// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lowering errors. All are fatal to the method being lowered: no
//! partially-correct descriptor is ever emitted.

use seam_hir::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Break,
    Continue,
    Goto,
}

impl std::fmt::Display for JumpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JumpKind::Break => write!(f, "break"),
            JumpKind::Continue => write!(f, "continue"),
            JumpKind::Goto => write!(f, "goto"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LoweringError {
    #[error("unresolved {kind}{}", fmt_label(.label))]
    UnresolvedJump {
        kind: JumpKind,
        label: Option<String>,
        span: Span,
    },

    #[error("unsupported construct: {detail}")]
    UnsupportedConstruct { detail: String, span: Span },

    #[error("conflicting declarations of `{name}` resolve to the same frame slot")]
    InvalidCaptureConflict { name: String, span: Span },

    #[error("malformed exception region: {detail}")]
    MalformedRegion { detail: String, span: Span },

    #[error("unresolved variable: `{name}`")]
    UnresolvedVariable { name: String, span: Span },
}

fn fmt_label(label: &Option<String>) -> String {
    match label {
        Some(l) => format!(" to label `{}`", l),
        None => String::new(),
    }
}

impl LoweringError {
    /// Source position the diagnostic is keyed by.
    pub fn span(&self) -> Span {
        match self {
            LoweringError::UnresolvedJump { span, .. }
            | LoweringError::UnsupportedConstruct { span, .. }
            | LoweringError::InvalidCaptureConflict { span, .. }
            | LoweringError::MalformedRegion { span, .. }
            | LoweringError::UnresolvedVariable { span, .. } => *span,
        }
    }
}
