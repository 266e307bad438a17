// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Conversions from engine error types to `Diagnostic`.

use seam_machine::{JumpKind, LoweringError};

use crate::{Diagnostic, ToDiagnostic};

impl ToDiagnostic for LoweringError {
    fn to_diagnostic(&self) -> Diagnostic {
        match self {
            LoweringError::UnresolvedJump { kind, label, span } => {
                let (code, what) = match kind {
                    JumpKind::Break => ("E0300", "loop"),
                    JumpKind::Continue => ("E0301", "loop"),
                    JumpKind::Goto => ("E0302", "label"),
                };
                let msg = match label {
                    Some(l) => format!("unresolved {} to label `{}`", kind, l),
                    None => format!("{} outside of loop", kind),
                };
                let mut diag = Diagnostic::error(msg)
                    .with_code(code)
                    .with_primary(*span, format!("no matching {} in scope", what));
                if matches!(kind, JumpKind::Goto) {
                    diag = diag.with_help("labels are method-scoped; check the spelling");
                }
                diag
            }

            LoweringError::UnsupportedConstruct { detail, span } => {
                Diagnostic::error(format!("unsupported construct: {}", detail))
                    .with_code("E0310")
                    .with_primary(*span, "cannot be lowered")
            }

            LoweringError::InvalidCaptureConflict { name, span } => {
                Diagnostic::error(format!(
                    "conflicting declarations of `{}` resolve to the same frame slot",
                    name
                ))
                .with_code("E0320")
                .with_primary(*span, "redeclared here")
                .with_help("rename one of the declarations; captured locals need distinct names")
            }

            LoweringError::MalformedRegion { detail, span } => {
                Diagnostic::error(format!("malformed exception region: {}", detail))
                    .with_code("E0330")
                    .with_primary(*span, "in this try statement")
            }

            LoweringError::UnresolvedVariable { name, span } => {
                Diagnostic::error(format!("unresolved variable: `{}`", name))
                    .with_code("E0311")
                    .with_primary(*span, "not declared in this method")
            }
        }
    }
}
