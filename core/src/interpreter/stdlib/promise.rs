//! Promise stdlib functions

use super::arg;
use crate::interpreter::errors;
use crate::interpreter::promise::Reaction;
use crate::interpreter::types::{ExecError, PromiseId, Val};
use crate::interpreter::vm::Vm;

/// Promise.resolve(value) - promises are returned as-is
pub fn resolve(vm: &mut Vm, args: Vec<Val>) -> Result<Val, ExecError> {
    let value = args.into_iter().next().unwrap_or(Val::Undefined);
    if let Val::Promise(_) = value {
        return Ok(value);
    }
    let id = vm.create_promise();
    vm.resolve_promise(id, value)?;
    Ok(Val::Promise(id))
}

/// Promise.reject(reason)
pub fn reject(vm: &mut Vm, args: Vec<Val>) -> Result<Val, ExecError> {
    let reason = args.into_iter().next().unwrap_or(Val::Undefined);
    let id = vm.create_promise();
    vm.reject_promise(id, reason)?;
    Ok(Val::Promise(id))
}

fn receiver(this: &Val) -> Result<PromiseId, ExecError> {
    match this {
        Val::Promise(id) => Ok(*id),
        other => Err(errors::type_error(format!(
            "expected a promise receiver, got {}",
            other.type_name()
        ))),
    }
}

fn handler(value: Val) -> Option<Val> {
    value.is_callable().then_some(value)
}

/// promise.then(onFulfilled, onRejected) - returns the derived promise
pub fn then(vm: &mut Vm, this: &Val, args: &[Val]) -> Result<Val, ExecError> {
    let id = receiver(this)?;
    let derived = vm.create_promise();
    vm.subscribe(
        id,
        Reaction {
            on_fulfilled: handler(arg(args, 0)),
            on_rejected: handler(arg(args, 1)),
            derived,
        },
    )?;
    Ok(Val::Promise(derived))
}

/// promise.catch(onRejected)
pub fn catch(vm: &mut Vm, this: &Val, args: &[Val]) -> Result<Val, ExecError> {
    let id = receiver(this)?;
    let derived = vm.create_promise();
    vm.subscribe(
        id,
        Reaction {
            on_fulfilled: None,
            on_rejected: handler(arg(args, 0)),
            derived,
        },
    )?;
    Ok(Val::Promise(derived))
}
