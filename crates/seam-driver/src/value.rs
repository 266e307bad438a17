// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Runtime values.

/// A runtime value in the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unit value
    Unit,
    /// Boolean
    Bool(bool),
    /// Integer (i64 for all integer widths in the driver)
    Int(i64),
    /// Float (f64 for all float widths in the driver)
    Float(f64),
    /// String
    Str(String),
    /// An exception object carrying its type name for filter matching.
    Exception { class: String, message: String },
}

impl Value {
    pub fn type_name(&self) -> &str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Exception { class, .. } => class,
        }
    }

    pub fn exception(class: impl Into<String>, message: impl Into<String>) -> Self {
        Value::Exception {
            class: class.into(),
            message: message.into(),
        }
    }
}

/// An in-flight thrown value: the payload plus the class name that catch
/// filters are tested against.
#[derive(Debug, Clone, PartialEq)]
pub struct Thrown {
    pub class: String,
    pub value: Value,
}

impl Thrown {
    pub fn new(class: impl Into<String>, value: Value) -> Self {
        Thrown {
            class: class.into(),
            value,
        }
    }

    /// Wrap a value; the class comes from the value itself.
    pub fn from_value(value: Value) -> Self {
        Thrown {
            class: value.type_name().to_string(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thrown_class_tracks_exception_values() {
        let t = Thrown::from_value(Value::exception("IoError", "disk gone"));
        assert_eq!(t.class, "IoError");
        let t = Thrown::from_value(Value::Int(3));
        assert_eq!(t.class, "int");
    }
}
