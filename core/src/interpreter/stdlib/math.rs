//! Math stdlib functions

use super::arg;
use crate::interpreter::types::{ExecError, Val};

fn num(args: &[Val], i: usize) -> f64 {
    arg(args, i).to_number()
}

/// Math.floor(x)
pub fn floor(args: &[Val]) -> Result<Val, ExecError> {
    Ok(Val::Num(num(args, 0).floor()))
}

/// Math.ceil(x)
pub fn ceil(args: &[Val]) -> Result<Val, ExecError> {
    Ok(Val::Num(num(args, 0).ceil()))
}

/// Math.abs(x)
pub fn abs(args: &[Val]) -> Result<Val, ExecError> {
    Ok(Val::Num(num(args, 0).abs()))
}

/// Math.round(x) - halves round towards +Infinity
pub fn round(args: &[Val]) -> Result<Val, ExecError> {
    Ok(Val::Num((num(args, 0) + 0.5).floor()))
}

/// Math.min(...xs) - `Infinity` with no arguments
pub fn min(args: &[Val]) -> Result<Val, ExecError> {
    let mut result = f64::INFINITY;
    for v in args {
        let n = v.to_number();
        if n.is_nan() {
            return Ok(Val::Num(f64::NAN));
        }
        result = result.min(n);
    }
    Ok(Val::Num(result))
}

/// Math.max(...xs) - `-Infinity` with no arguments
pub fn max(args: &[Val]) -> Result<Val, ExecError> {
    let mut result = f64::NEG_INFINITY;
    for v in args {
        let n = v.to_number();
        if n.is_nan() {
            return Ok(Val::Num(f64::NAN));
        }
        result = result.max(n);
    }
    Ok(Val::Num(result))
}

pub fn pow(args: &[Val]) -> Result<Val, ExecError> {
    Ok(Val::Num(num(args, 0).powf(num(args, 1))))
}

pub fn sqrt(args: &[Val]) -> Result<Val, ExecError> {
    Ok(Val::Num(num(args, 0).sqrt()))
}
