//!
//! Runtime Values and Native Callables
//!
//! The values that cross the boundary between the host runtime and a
//! native module: arguments handed to native functions, their results,
//! and the constants the host materializes for object-kind symbols.
//!

use std::fmt;

use thiserror::Error;

use crate::types::TypeTag;

/// Signature every native function exported through a linkage table has.
pub type NativeFn = fn(&[Value]) -> Result<Value, CallError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Double(f64),
    Boolean(bool),
    String(String),
    Bytes(Vec<u8>),
    Unit,
    List(Vec<Value>),
    Tuple(Vec<Value>),
}

impl Value {
    /// Structural check against a declared type tag. Lists must be
    /// homogeneous in the element type; tuples must match arity and
    /// each position.
    pub fn conforms_to(&self, ty: &TypeTag) -> bool {
        match (self, ty) {
            (Value::Integer(_), TypeTag::Integer) => true,
            (Value::Double(_), TypeTag::Double) => true,
            (Value::Boolean(_), TypeTag::Boolean) => true,
            (Value::String(_), TypeTag::String) => true,
            (Value::Bytes(_), TypeTag::Bytes) => true,
            (Value::Unit, TypeTag::Unit) => true,
            (Value::List(items), TypeTag::List(elem)) => items.iter().all(|v| v.conforms_to(elem)),
            (Value::Tuple(items), TypeTag::Tuple(types)) => {
                items.len() == types.len()
                    && items.iter().zip(types).all(|(v, t)| v.conforms_to(t))
            }
            _ => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Double(_) => "Double",
            Value::Boolean(_) => "Boolean",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Unit => "Unit",
            Value::List(_) => "List",
            Value::Tuple(_) => "Tuple",
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Unit => f.write_str("unit"),
            Value::List(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("<[")?;
                write_items(f, items)?;
                f.write_str("]>")
            }
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("'{name}' expects {expected} argument(s), found {found}")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {index} of '{name}' must be {expected}, found {found}")]
    ArgumentType {
        name: String,
        index: usize,
        expected: String,
        found: &'static str,
    },

    #[error("'{name}' is a constant and cannot be called")]
    NotCallable { name: String },

    #[error("{0}")]
    Native(String),
}
