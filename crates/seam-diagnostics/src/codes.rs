// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Error code registry.
//!
//! Maps error codes (E0300, E0304, etc.) to titles and categories.

use std::collections::HashMap;

/// Registry of all known error codes.
pub struct ErrorCodeRegistry {
    codes: HashMap<&'static str, ErrorCodeInfo>,
}

/// Information about a single error code.
pub struct ErrorCodeInfo {
    pub code: &'static str,
    pub title: &'static str,
    pub category: ErrorCategory,
}

/// Error category for grouping.
#[derive(Debug, Clone, Copy)]
pub enum ErrorCategory {
    Jump,
    Construct,
    Capture,
    Region,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Jump => write!(f, "Jump"),
            ErrorCategory::Construct => write!(f, "Construct"),
            ErrorCategory::Capture => write!(f, "Capture"),
            ErrorCategory::Region => write!(f, "Region"),
        }
    }
}

macro_rules! register_codes {
    ($($code:literal => ($title:literal, $cat:expr)),* $(,)?) => {{
        let mut map = HashMap::new();
        $(
            map.insert($code, ErrorCodeInfo {
                code: $code,
                title: $title,
                category: $cat,
            });
        )*
        map
    }};
}

impl Default for ErrorCodeRegistry {
    fn default() -> Self {
        use ErrorCategory::*;

        Self {
            codes: register_codes! {
                // Jump resolution (E030x)
                "E0300" => ("break has no matching loop", Jump),
                "E0301" => ("continue has no matching loop", Jump),
                "E0302" => ("goto targets an unknown label", Jump),

                // Unsupported constructs (E031x)
                "E0310" => ("construct not supported by lowering", Construct),
                "E0311" => ("unresolved variable", Construct),

                // Capture conflicts (E032x)
                "E0320" => ("conflicting declarations share a frame slot", Capture),

                // Exception regions (E033x)
                "E0330" => ("malformed exception region", Region),
            },
        }
    }
}

impl ErrorCodeRegistry {
    pub fn get(&self, code: &str) -> Option<&ErrorCodeInfo> {
        self.codes.get(code)
    }

    pub fn all(&self) -> impl Iterator<Item = &ErrorCodeInfo> {
        self.codes.values()
    }
}
