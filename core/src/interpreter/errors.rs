//! Script-visible error values
//!
//! Runtime failures surface to scripts as `Val::Error` values carrying a
//! name (`TypeError`, `ReferenceError`, ...) and a message, which `catch`
//! can inspect through `e.name` / `e.message`.

use super::types::{ExecError, Val};
use std::fmt;

pub const ERROR: &str = "Error";
pub const TYPE_ERROR: &str = "TypeError";
pub const REFERENCE_ERROR: &str = "ReferenceError";
pub const RANGE_ERROR: &str = "RangeError";
pub const SYNTAX_ERROR: &str = "SyntaxError";

/// Error payload of `Val::Error`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

/// Build a thrown error value
pub fn throw(name: &str, message: impl Into<String>) -> ExecError {
    ExecError::Throw(Val::Error(ErrorInfo::new(name, message)))
}

pub fn type_error(message: impl Into<String>) -> ExecError {
    throw(TYPE_ERROR, message)
}

pub fn reference_error(message: impl Into<String>) -> ExecError {
    throw(REFERENCE_ERROR, message)
}

pub fn range_error(message: impl Into<String>) -> ExecError {
    throw(RANGE_ERROR, message)
}

pub fn syntax_error(message: impl Into<String>) -> ExecError {
    throw(SYNTAX_ERROR, message)
}
