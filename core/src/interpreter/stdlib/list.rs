//! List methods

use super::arg;
use crate::interpreter::errors;
use crate::interpreter::expressions::ensure_nestable;
use crate::interpreter::types::{ExecError, Val};

fn items_mut(this: &mut Val) -> Result<&mut Vec<Val>, ExecError> {
    match this {
        Val::List(items) => Ok(items),
        other => Err(errors::type_error(format!(
            "expected a list receiver, got {}",
            other.type_name()
        ))),
    }
}

/// list.push(...values) - returns the new length
pub fn push(this: &mut Val, args: Vec<Val>) -> Result<Val, ExecError> {
    let items = items_mut(this)?;
    for value in &args {
        ensure_nestable(value, 1)?;
    }
    items
        .try_reserve(args.len())
        .map_err(|e| errors::range_error(format!("Cannot extend list: {}", e)))?;
    items.extend(args);
    Ok(Val::Num(items.len() as f64))
}

/// list.pop() - removes and returns the last element
pub fn pop(this: &mut Val) -> Result<Val, ExecError> {
    Ok(items_mut(this)?.pop().unwrap_or(Val::Undefined))
}

/// list.concat(...values) - lists are flattened one level
pub fn concat(this: &mut Val, args: Vec<Val>) -> Result<Val, ExecError> {
    let mut result = items_mut(this)?.clone();
    for value in args {
        match value {
            Val::List(more) => result.extend(more),
            other => {
                ensure_nestable(&other, 1)?;
                result.push(other)
            }
        }
    }
    Ok(Val::List(result))
}

/// list.join(separator = ",")
pub fn join(this: &mut Val, args: &[Val]) -> Result<Val, ExecError> {
    let separator = match arg(args, 0) {
        Val::Undefined => ",".to_string(),
        other => other.to_display_string(),
    };
    let parts: Vec<String> = items_mut(this)?
        .iter()
        .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
        .collect();
    Ok(Val::Str(parts.join(&separator)))
}

/// list.indexOf(value) - strict equality, -1 when absent
pub fn index_of(this: &mut Val, args: &[Val]) -> Result<Val, ExecError> {
    let needle = arg(args, 0);
    let position = items_mut(this)?.iter().position(|v| *v == needle);
    Ok(Val::Num(position.map_or(-1.0, |i| i as f64)))
}
