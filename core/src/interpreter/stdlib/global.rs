//! Free-standing globals: `Date.now` and `Error`

use super::arg;
use crate::interpreter::errors::{self, ErrorInfo};
use crate::interpreter::types::{ExecError, Val};
use chrono::Utc;

/// Date.now() - milliseconds since the Unix epoch
pub fn date_now() -> Result<Val, ExecError> {
    Ok(Val::Num(Utc::now().timestamp_millis() as f64))
}

/// Error(message) - builds an error value (no `new` needed)
pub fn error_new(args: &[Val]) -> Result<Val, ExecError> {
    let message = match arg(args, 0) {
        Val::Undefined => String::new(),
        other => other.to_display_string(),
    };
    Ok(Val::Error(ErrorInfo::new(errors::ERROR, message)))
}
