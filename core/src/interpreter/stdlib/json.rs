//! JSON stdlib functions

use super::arg;
use crate::interpreter::convert::{json_to_val, val_to_json};
use crate::interpreter::errors;
use crate::interpreter::types::{ExecError, Val};

/// JSON.stringify(value, replacer, indent)
///
/// The replacer is ignored; any positive indent pretty-prints.
/// Returns `undefined` for values JSON cannot represent at top level.
pub fn stringify(args: &[Val]) -> Result<Val, ExecError> {
    let value = arg(args, 0);
    if matches!(value, Val::Undefined | Val::Func(_) | Val::Native(_)) {
        return Ok(Val::Undefined);
    }

    let json = val_to_json(&value);
    let pretty = arg(args, 2).to_number() > 0.0;
    let text = if pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    }
    .map_err(|e| errors::type_error(e.to_string()))?;

    Ok(Val::Str(text))
}

/// JSON.parse(text)
pub fn parse(args: &[Val]) -> Result<Val, ExecError> {
    let text = match arg(args, 0) {
        Val::Str(s) => s,
        other => other.to_display_string(),
    };
    let json: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| errors::syntax_error(format!("JSON.parse: {}", e)))?;
    Ok(json_to_val(json))
}
