//! setTimeout / setInterval / clearTimeout / clearInterval

use std::time::Duration;

use crate::event_loop::{LoopHandle, Task, TaskId, TaskKind};
use crate::interpreter::errors;
use crate::interpreter::{DefineError, ExecError, Val, Vm};

pub fn install(vm: &mut Vm, handle: &LoopHandle) -> Result<(), DefineError> {
    let h = handle.clone();
    vm.define_native("setTimeout", move |_vm, args| {
        schedule(&h, TaskKind::Timeout, args)
    })?;

    let h = handle.clone();
    vm.define_native("setInterval", move |_vm, args| {
        schedule(&h, TaskKind::Interval, args)
    })?;

    let h = handle.clone();
    vm.define_native("clearTimeout", move |_vm, args| {
        clear(&h, &args);
        Ok(Val::Undefined)
    })?;

    let h = handle.clone();
    vm.define_native("clearInterval", move |_vm, args| {
        clear(&h, &args);
        Ok(Val::Undefined)
    })
}

/// `(fn, delay, ...args)` → timer id
fn schedule(handle: &LoopHandle, kind: TaskKind, args: Vec<Val>) -> Result<Val, ExecError> {
    let mut args = args.into_iter();
    let callback = args.next().unwrap_or(Val::Undefined);
    if !callback.is_callable() {
        let name = match kind {
            TaskKind::Interval => "setInterval",
            _ => "setTimeout",
        };
        return Err(errors::type_error(format!(
            "{}: callback must be a function, got {}",
            name,
            callback.type_name()
        )));
    }
    let delay = delay_of(&args.next().unwrap_or(Val::Undefined));
    let rest: Vec<Val> = args.collect();

    let task = match kind {
        TaskKind::Interval => Task::interval(callback, rest, delay),
        _ => Task::timeout(callback, rest, delay),
    };
    Ok(Val::Num(handle.add(task).as_u64() as f64))
}

/// Whole milliseconds; negative, NaN and infinite delays become zero
pub(crate) fn delay_of(value: &Val) -> Duration {
    let ms = value.to_number();
    if ms.is_finite() && ms > 0.0 {
        Duration::from_millis(ms as u64)
    } else {
        Duration::ZERO
    }
}

fn clear(handle: &LoopHandle, args: &[Val]) {
    let Some(id) = args.first().and_then(timer_id) else {
        return;
    };
    handle.clear(id);
}

fn timer_id(value: &Val) -> Option<TaskId> {
    match value {
        Val::Num(n) if *n >= 1.0 && n.fract() == 0.0 && n.is_finite() => Some(TaskId(*n as u64)),
        _ => None,
    }
}
