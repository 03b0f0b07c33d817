//! String methods

use super::arg;
use crate::interpreter::errors;
use crate::interpreter::types::{ExecError, Val};

fn as_str(this: &Val) -> Result<&str, ExecError> {
    match this {
        Val::Str(s) => Ok(s),
        other => Err(errors::type_error(format!(
            "expected a string receiver, got {}",
            other.type_name()
        ))),
    }
}

pub fn to_upper_case(this: &Val) -> Result<Val, ExecError> {
    Ok(Val::Str(as_str(this)?.to_uppercase()))
}

pub fn to_lower_case(this: &Val) -> Result<Val, ExecError> {
    Ok(Val::Str(as_str(this)?.to_lowercase()))
}

/// str.indexOf(search) - position in characters, -1 when absent
pub fn index_of(this: &Val, args: &[Val]) -> Result<Val, ExecError> {
    let haystack = as_str(this)?;
    let needle = arg(args, 0).to_display_string();
    let position = haystack
        .find(&needle)
        .map(|byte_pos| haystack[..byte_pos].chars().count() as f64);
    Ok(Val::Num(position.unwrap_or(-1.0)))
}
