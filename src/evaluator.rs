use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;

use crate::{node::NodeRef, utils::IntRange};

/// The value a parsed node evaluates to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Range(IntRange),
    Time { hour: u32, minute: u32 },
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("the node has no child named `{0}`.")]
    NoSuchChild(String),
    #[error("the node has no child at index {0}.")]
    NoSuchIndex(usize),
    #[error("`{0}` is not a valid number.")]
    InvalidNumber(String),
    #[error("`{0}` is not a valid time of day.")]
    InvalidTime(String),
    #[error("expected {expected}, found {found:?}.")]
    UnexpectedValue {
        expected: &'static str,
        found: Value,
    },
}

pub type Evaluator = Rc<dyn Fn(&NodeRef<'_>) -> Result<Value, EvaluationError>>;

pub fn first_child(node: &NodeRef<'_>) -> Result<Value, EvaluationError> {
    node.evaluate_child(0)
}

pub fn all_children(node: &NodeRef<'_>) -> Result<Value, EvaluationError> {
    node.children()
        .map(|child| child.evaluate())
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

pub fn parsed_string(node: &NodeRef<'_>) -> Result<Value, EvaluationError> {
    Ok(Value::Str(node.parsed_str().to_string()))
}

pub(crate) fn expect_int(value: Value) -> Result<i64, EvaluationError> {
    match value {
        Value::Int(i) => Ok(i),
        found => Err(EvaluationError::UnexpectedValue {
            expected: "an integer",
            found,
        }),
    }
}
