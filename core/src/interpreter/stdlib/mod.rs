//! Standard library function implementations
//!
//! This module contains all stdlib function implementations organized by category.
//! Global objects (`Math`, `JSON`, `Date`, `Promise`) are plain objects whose
//! members are `Val::Native` handles; methods on lists, strings and promises
//! are resolved by receiver type at call time.

pub mod global;
pub mod json;
pub mod list;
pub mod math;
pub mod promise;
pub mod string;

use super::types::{ExecError, Val};
use super::vm::Vm;
use std::collections::BTreeMap;

/* ===================== Standard Library Function Types ===================== */

/// Standard library function identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdlibFunc {
    MathFloor,
    MathCeil,
    MathAbs,
    MathRound,
    MathMin,
    MathMax,
    MathPow,
    MathSqrt,
    JsonStringify,
    JsonParse,
    DateNow,
    ErrorNew,
    PromiseResolve,
    PromiseReject,
    PromiseThen,
    PromiseCatch,
    ListPush,
    ListPop,
    ListConcat,
    ListJoin,
    ListIndexOf,
    StrToUpperCase,
    StrToLowerCase,
    StrIndexOf,
}

impl StdlibFunc {
    pub fn name(self) -> &'static str {
        match self {
            StdlibFunc::MathFloor => "Math.floor",
            StdlibFunc::MathCeil => "Math.ceil",
            StdlibFunc::MathAbs => "Math.abs",
            StdlibFunc::MathRound => "Math.round",
            StdlibFunc::MathMin => "Math.min",
            StdlibFunc::MathMax => "Math.max",
            StdlibFunc::MathPow => "Math.pow",
            StdlibFunc::MathSqrt => "Math.sqrt",
            StdlibFunc::JsonStringify => "JSON.stringify",
            StdlibFunc::JsonParse => "JSON.parse",
            StdlibFunc::DateNow => "Date.now",
            StdlibFunc::ErrorNew => "Error",
            StdlibFunc::PromiseResolve => "Promise.resolve",
            StdlibFunc::PromiseReject => "Promise.reject",
            StdlibFunc::PromiseThen => "then",
            StdlibFunc::PromiseCatch => "catch",
            StdlibFunc::ListPush => "push",
            StdlibFunc::ListPop => "pop",
            StdlibFunc::ListConcat => "concat",
            StdlibFunc::ListJoin => "join",
            StdlibFunc::ListIndexOf | StdlibFunc::StrIndexOf => "indexOf",
            StdlibFunc::StrToUpperCase => "toUpperCase",
            StdlibFunc::StrToLowerCase => "toLowerCase",
        }
    }

    /// Methods that modify their receiver in place
    ///
    /// When the receiver was read from a variable path, the caller writes the
    /// modified value back to that path.
    pub fn mutates_receiver(self) -> bool {
        matches!(self, StdlibFunc::ListPush | StdlibFunc::ListPop)
    }
}

/* ===================== Methods ===================== */

/// Receiver types that carry builtin methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodOwner {
    List,
    Str,
    Promise,
}

impl MethodOwner {
    pub fn of(value: &Val) -> Option<Self> {
        match value {
            Val::List(_) => Some(MethodOwner::List),
            Val::Str(_) => Some(MethodOwner::Str),
            Val::Promise(_) => Some(MethodOwner::Promise),
            _ => None,
        }
    }
}

pub fn lookup_method(owner: MethodOwner, name: &str) -> Option<StdlibFunc> {
    let func = match (owner, name) {
        (MethodOwner::List, "push") => StdlibFunc::ListPush,
        (MethodOwner::List, "pop") => StdlibFunc::ListPop,
        (MethodOwner::List, "concat") => StdlibFunc::ListConcat,
        (MethodOwner::List, "join") => StdlibFunc::ListJoin,
        (MethodOwner::List, "indexOf") => StdlibFunc::ListIndexOf,
        (MethodOwner::Str, "toUpperCase") => StdlibFunc::StrToUpperCase,
        (MethodOwner::Str, "toLowerCase") => StdlibFunc::StrToLowerCase,
        (MethodOwner::Str, "indexOf") => StdlibFunc::StrIndexOf,
        (MethodOwner::Promise, "then") => StdlibFunc::PromiseThen,
        (MethodOwner::Promise, "catch") => StdlibFunc::PromiseCatch,
        _ => return None,
    };
    Some(func)
}

/// Builtin method `name` of `receiver`, if it has one
pub fn method_for(receiver: &Val, name: &str) -> Option<StdlibFunc> {
    lookup_method(MethodOwner::of(receiver)?, name)
}

/* ===================== Stdlib Dispatcher ===================== */

/// Call a standard library function with arguments
///
/// `this` is the method receiver, or `Undefined` for free functions.
pub fn call_stdlib_func(
    func: StdlibFunc,
    vm: &mut Vm,
    this: &mut Val,
    args: Vec<Val>,
) -> Result<Val, ExecError> {
    match func {
        StdlibFunc::MathFloor => math::floor(&args),
        StdlibFunc::MathCeil => math::ceil(&args),
        StdlibFunc::MathAbs => math::abs(&args),
        StdlibFunc::MathRound => math::round(&args),
        StdlibFunc::MathMin => math::min(&args),
        StdlibFunc::MathMax => math::max(&args),
        StdlibFunc::MathPow => math::pow(&args),
        StdlibFunc::MathSqrt => math::sqrt(&args),
        StdlibFunc::JsonStringify => json::stringify(&args),
        StdlibFunc::JsonParse => json::parse(&args),
        StdlibFunc::DateNow => global::date_now(),
        StdlibFunc::ErrorNew => global::error_new(&args),
        StdlibFunc::PromiseResolve => promise::resolve(vm, args),
        StdlibFunc::PromiseReject => promise::reject(vm, args),
        StdlibFunc::PromiseThen => promise::then(vm, this, &args),
        StdlibFunc::PromiseCatch => promise::catch(vm, this, &args),
        StdlibFunc::ListPush => list::push(this, args),
        StdlibFunc::ListPop => list::pop(this),
        StdlibFunc::ListConcat => list::concat(this, args),
        StdlibFunc::ListJoin => list::join(this, &args),
        StdlibFunc::ListIndexOf => list::index_of(this, &args),
        StdlibFunc::StrToUpperCase => string::to_upper_case(this),
        StdlibFunc::StrToLowerCase => string::to_lower_case(this),
        StdlibFunc::StrIndexOf => string::index_of(this, &args),
    }
}

/// Argument `i`, or `Undefined` when missing
pub(crate) fn arg(args: &[Val], i: usize) -> Val {
    args.get(i).cloned().unwrap_or(Val::Undefined)
}

/* ===================== Environment Injection ===================== */

fn object(vm: &mut Vm, members: &[(&str, StdlibFunc)]) -> Val {
    let mut map = BTreeMap::new();
    for (name, func) in members {
        map.insert(name.to_string(), vm.stdlib_value(*func));
    }
    Val::Obj(map)
}

/// Inject standard library globals into a fresh VM
pub fn inject_stdlib(vm: &mut Vm) {
    let math = object(
        vm,
        &[
            ("floor", StdlibFunc::MathFloor),
            ("ceil", StdlibFunc::MathCeil),
            ("abs", StdlibFunc::MathAbs),
            ("round", StdlibFunc::MathRound),
            ("min", StdlibFunc::MathMin),
            ("max", StdlibFunc::MathMax),
            ("pow", StdlibFunc::MathPow),
            ("sqrt", StdlibFunc::MathSqrt),
        ],
    );
    vm.set_global("Math", math);

    let json = object(
        vm,
        &[
            ("stringify", StdlibFunc::JsonStringify),
            ("parse", StdlibFunc::JsonParse),
        ],
    );
    vm.set_global("JSON", json);

    let date = object(vm, &[("now", StdlibFunc::DateNow)]);
    vm.set_global("Date", date);

    let promise = object(
        vm,
        &[
            ("resolve", StdlibFunc::PromiseResolve),
            ("reject", StdlibFunc::PromiseReject),
        ],
    );
    vm.set_global("Promise", promise);

    let error = vm.stdlib_value(StdlibFunc::ErrorNew);
    vm.set_global("Error", error);

    vm.set_global("NaN", Val::Num(f64::NAN));
    vm.set_global("Infinity", Val::Num(f64::INFINITY));
}
