//! Expression evaluation
//!
//! Evaluates expressions to values. Member writes (assignment and mutating
//! methods such as `push`) go through "places": a variable name plus the
//! already evaluated keys leading from it to the target.

use super::errors;
use super::scope::{ScopeId, Slot};
use super::stdlib;
use super::types::{
    BinaryOp, Closure, Exec, ExecError, Expr, FuncDef, LogicalOp, UnaryOp, Val, MAX_VALUE_DEPTH,
};
use super::vm::Vm;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Highest list index a script may write
pub const MAX_LIST_INDEX: usize = u32::MAX as usize - 1;

/// How many elements a single index write may add past the end of a list
pub const MAX_LIST_GROWTH: usize = 1 << 16;

/// Longest string concatenation may produce, in bytes
pub const MAX_STRING_LENGTH: usize = 1 << 28;

/* ===================== Expressions ===================== */

pub fn eval_expr(vm: &mut Vm, expr: &Expr, scope: ScopeId) -> Exec<Val> {
    match expr {
        Expr::LitUndefined => Ok(Val::Undefined),
        Expr::LitNull => Ok(Val::Null),
        Expr::LitBool { v } => Ok(Val::Bool(*v)),
        Expr::LitNum { v } => Ok(Val::Num(*v)),
        Expr::LitStr { v } => Ok(Val::Str(v.clone())),

        Expr::Array { elements } => {
            let mut items = Vec::with_capacity(elements.len());
            for element in elements {
                let v = eval_expr(vm, element, scope)?;
                ensure_nestable(&v, 1)?;
                items.push(v);
            }
            Ok(Val::List(items))
        }

        Expr::Object { properties } => {
            let mut map = BTreeMap::new();
            for (key, value) in properties {
                let v = eval_expr(vm, value, scope)?;
                ensure_nestable(&v, 1)?;
                map.insert(key.clone(), v);
            }
            Ok(Val::Obj(map))
        }

        Expr::Ident { name } => lookup(vm, scope, name),

        Expr::Member { object, property } => {
            let obj = eval_expr(vm, object, scope)?;
            Ok(get_member(&obj, &Val::Str(property.clone()))?)
        }

        Expr::Index { object, index } => {
            let obj = eval_expr(vm, object, scope)?;
            let key = eval_expr(vm, index, scope)?;
            Ok(get_member(&obj, &key)?)
        }

        Expr::Call { callee, args } => eval_call(vm, callee, args, scope),

        Expr::Function { def } => Ok(make_closure(vm, def, scope)),

        Expr::Unary { op, operand } => match op {
            UnaryOp::Not => Ok(Val::Bool(!eval_expr(vm, operand, scope)?.is_truthy())),
            UnaryOp::Neg => Ok(Val::Num(-eval_expr(vm, operand, scope)?.to_number())),
            UnaryOp::TypeOf => {
                // typeof tolerates undeclared names
                if let Expr::Ident { name } = operand.as_ref() {
                    if vm.scopes.lookup(scope, name).is_none() {
                        return Ok(Val::Str("undefined".to_string()));
                    }
                }
                let v = eval_expr(vm, operand, scope)?;
                Ok(Val::Str(v.type_name().to_string()))
            }
        },

        Expr::Binary { op, left, right } => {
            let l = eval_expr(vm, left, scope)?;
            let r = eval_expr(vm, right, scope)?;
            Ok(binary_op(*op, &l, &r)?)
        }

        Expr::Logical { op, left, right } => {
            let l = eval_expr(vm, left, scope)?;
            match (op, l.is_truthy()) {
                (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(l),
                _ => eval_expr(vm, right, scope),
            }
        }

        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            if eval_expr(vm, test, scope)?.is_truthy() {
                eval_expr(vm, consequent, scope)
            } else {
                eval_expr(vm, alternate, scope)
            }
        }
    }
}

fn lookup(vm: &Vm, scope: ScopeId, name: &str) -> Exec<Val> {
    match vm.scopes.lookup(scope, name) {
        Some(v) => Ok(v.clone()),
        None => Err(errors::reference_error(format!("{} is not defined", name)).into()),
    }
}

/// Create a closure over `scope`, pinning it in the arena
pub fn make_closure(vm: &mut Vm, def: &Arc<FuncDef>, scope: ScopeId) -> Val {
    vm.scopes.capture(scope);
    Val::Func(Arc::new(Closure {
        def: def.clone(),
        scope,
    }))
}

/* ===================== Calls ===================== */

fn eval_args(vm: &mut Vm, args: &[Expr], scope: ScopeId) -> Exec<Vec<Val>> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_expr(vm, arg, scope)?);
    }
    Ok(values)
}

fn eval_call(vm: &mut Vm, callee: &Expr, args: &[Expr], scope: ScopeId) -> Exec<Val> {
    if let Expr::Member { object, property } = callee {
        return eval_method_call(vm, object, property, args, scope);
    }

    let func = eval_expr(vm, callee, scope)?;
    let args = eval_args(vm, args, scope)?;
    call_checked(vm, &func, args, || describe_callee(callee))
}

/// `object.property(args)`: builtin methods first, then object members
fn eval_method_call(
    vm: &mut Vm,
    object: &Expr,
    property: &str,
    args: &[Expr],
    scope: ScopeId,
) -> Exec<Val> {
    let place = match place_of(object) {
        Some((var, segments)) => Some((var, eval_segments(vm, &segments, scope)?)),
        None => None,
    };
    let mut this = match &place {
        Some((var, keys)) => read_place(vm, scope, var, keys)?,
        None => eval_expr(vm, object, scope)?,
    };
    let args = eval_args(vm, args, scope)?;

    if let Some(func) = stdlib::method_for(&this, property) {
        let result = stdlib::call_stdlib_func(func, vm, &mut this, args)?;
        if func.mutates_receiver() {
            if let Some((var, keys)) = &place {
                write_place(vm, scope, var, keys, this)?;
            }
        }
        return Ok(result);
    }

    let func = get_member(&this, &Val::Str(property.to_string()))?;
    call_checked(vm, &func, args, || {
        format!("{}.{}", describe_callee(object), property)
    })
}

fn call_checked(
    vm: &mut Vm,
    func: &Val,
    args: Vec<Val>,
    describe: impl FnOnce() -> String,
) -> Exec<Val> {
    if !func.is_callable() {
        return Err(errors::type_error(format!("{} is not a function", describe())).into());
    }
    Ok(vm.call(func, args)?)
}

fn describe_callee(expr: &Expr) -> String {
    match expr {
        Expr::Ident { name } => name.clone(),
        Expr::Member { object, property } => format!("{}.{}", describe_callee(object), property),
        Expr::Index { object, .. } => format!("{}[...]", describe_callee(object)),
        Expr::Call { callee, .. } => format!("{}(...)", describe_callee(callee)),
        _ => "expression".to_string(),
    }
}

/* ===================== Places ===================== */

/// One step of a member path, before evaluation
#[derive(Debug, Clone, Copy)]
pub enum Segment<'a> {
    Prop(&'a str),
    Index(&'a Expr),
}

/// Decompose `a.b[c]` into its root variable and member path
fn place_of(expr: &Expr) -> Option<(&str, Vec<Segment<'_>>)> {
    match expr {
        Expr::Ident { name } => Some((name.as_str(), Vec::new())),
        Expr::Member { object, property } => {
            let (var, mut segments) = place_of(object)?;
            segments.push(Segment::Prop(property));
            Some((var, segments))
        }
        Expr::Index { object, index } => {
            let (var, mut segments) = place_of(object)?;
            segments.push(Segment::Index(index));
            Some((var, segments))
        }
        _ => None,
    }
}

pub fn eval_segments(vm: &mut Vm, segments: &[Segment<'_>], scope: ScopeId) -> Exec<Vec<Val>> {
    let mut keys = Vec::with_capacity(segments.len());
    for segment in segments {
        keys.push(match segment {
            Segment::Prop(name) => Val::Str(name.to_string()),
            Segment::Index(expr) => eval_expr(vm, expr, scope)?,
        });
    }
    Ok(keys)
}

pub fn read_place(vm: &Vm, scope: ScopeId, var: &str, keys: &[Val]) -> Exec<Val> {
    let mut value = lookup(vm, scope, var)?;
    for key in keys {
        value = get_member(&value, key)?;
    }
    Ok(value)
}

/// Store `value` at `var` + `keys`
///
/// Assigning to an undeclared plain name creates a global.
pub fn write_place(vm: &mut Vm, scope: ScopeId, var: &str, keys: &[Val], value: Val) -> Exec<()> {
    match vm.scopes.slot_mut(scope, var) {
        Some(slot) => Ok(assign_into(slot, keys, value)?),
        None if keys.is_empty() => {
            vm.scopes.declare(ScopeId::GLOBAL, var, value, false);
            Ok(())
        }
        None => Err(errors::reference_error(format!("{} is not defined", var)).into()),
    }
}

fn assign_into(slot: &mut Slot, keys: &[Val], value: Val) -> Result<(), ExecError> {
    let Some((last, parents)) = keys.split_last() else {
        if slot.constant {
            return Err(errors::type_error("Assignment to constant variable."));
        }
        slot.value = value;
        return Ok(());
    };

    ensure_nestable(&value, keys.len())?;
    let mut target = &mut slot.value;
    for key in parents {
        target = child_mut(target, key)?;
    }
    set_member(target, last, value)
}

/* ===================== Members ===================== */

fn property_key(key: &Val) -> String {
    key.to_display_string()
}

/// Fail unless `value` can sit `levels` containers deep
pub(crate) fn ensure_nestable(value: &Val, levels: usize) -> Result<(), ExecError> {
    let limit = MAX_VALUE_DEPTH.saturating_sub(levels);
    if value.depth(limit) > limit {
        return Err(errors::range_error(format!(
            "Maximum value nesting of {} exceeded",
            MAX_VALUE_DEPTH
        )));
    }
    Ok(())
}

fn list_index(key: &Val) -> Option<usize> {
    match key {
        Val::Num(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
        Val::Str(s) => s.parse().ok(),
        _ => None,
    }
}

/// Read `object[key]`
pub fn get_member(object: &Val, key: &Val) -> Result<Val, ExecError> {
    match object {
        Val::Undefined | Val::Null => Err(errors::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            object.to_display_string(),
            property_key(key)
        ))),
        Val::Obj(map) => Ok(map.get(&property_key(key)).cloned().unwrap_or(Val::Undefined)),
        Val::List(items) => {
            if matches!(key, Val::Str(s) if s == "length") {
                return Ok(Val::Num(items.len() as f64));
            }
            Ok(list_index(key)
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Val::Undefined))
        }
        Val::Str(s) => {
            if matches!(key, Val::Str(k) if k == "length") {
                return Ok(Val::Num(s.chars().count() as f64));
            }
            Ok(list_index(key)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Val::Str(c.to_string()))
                .unwrap_or(Val::Undefined))
        }
        Val::Error(info) => Ok(match property_key(key).as_str() {
            "name" => Val::Str(info.name.clone()),
            "message" => Val::Str(info.message.clone()),
            _ => Val::Undefined,
        }),
        _ => Ok(Val::Undefined),
    }
}

fn child_mut<'v>(target: &'v mut Val, key: &Val) -> Result<&'v mut Val, ExecError> {
    let type_name = target.type_name();
    let missing = || {
        errors::type_error(format!(
            "Cannot set properties of undefined (setting '{}')",
            property_key(key)
        ))
    };
    match target {
        Val::Obj(map) => map.get_mut(&property_key(key)).ok_or_else(missing),
        Val::List(items) => list_index(key)
            .and_then(|i| items.get_mut(i))
            .ok_or_else(missing),
        _ => Err(errors::type_error(format!(
            "Cannot set properties of {} (setting '{}')",
            type_name,
            property_key(key)
        ))),
    }
}

fn set_member(target: &mut Val, key: &Val, value: Val) -> Result<(), ExecError> {
    match target {
        Val::Obj(map) => {
            map.insert(property_key(key), value);
            Ok(())
        }
        Val::List(items) => {
            let index = list_index(key).ok_or_else(|| {
                errors::type_error(format!("Invalid array index '{}'", property_key(key)))
            })?;
            if index > MAX_LIST_INDEX {
                return Err(errors::range_error(format!(
                    "Invalid array index '{}'",
                    property_key(key)
                )));
            }
            if index >= items.len() {
                let added = index - items.len() + 1;
                if added > MAX_LIST_GROWTH {
                    return Err(errors::range_error(format!(
                        "Cannot extend list of length {} to index {}",
                        items.len(),
                        index
                    )));
                }
                items
                    .try_reserve(added)
                    .map_err(|e| errors::range_error(format!("Cannot extend list: {}", e)))?;
                items.resize(index + 1, Val::Undefined);
            }
            items[index] = value;
            Ok(())
        }
        other => Err(errors::type_error(format!(
            "Cannot set properties of {} (setting '{}')",
            other.type_name(),
            property_key(key)
        ))),
    }
}

/* ===================== Operators ===================== */

fn is_primitive_number(v: &Val) -> bool {
    matches!(v, Val::Num(_) | Val::Bool(_) | Val::Null | Val::Undefined)
}

pub fn binary_op(op: BinaryOp, l: &Val, r: &Val) -> Result<Val, ExecError> {
    let value = match op {
        BinaryOp::Add => {
            if is_primitive_number(l) && is_primitive_number(r) {
                Val::Num(l.to_number() + r.to_number())
            } else {
                let (l, r) = (l.to_display_string(), r.to_display_string());
                if l.len() + r.len() > MAX_STRING_LENGTH {
                    return Err(errors::range_error("Invalid string length"));
                }
                Val::Str(l + &r)
            }
        }
        BinaryOp::Sub => Val::Num(l.to_number() - r.to_number()),
        BinaryOp::Mul => Val::Num(l.to_number() * r.to_number()),
        BinaryOp::Div => Val::Num(l.to_number() / r.to_number()),
        BinaryOp::Rem => Val::Num(l.to_number() % r.to_number()),
        BinaryOp::Eq => Val::Bool(loose_eq(l, r)),
        BinaryOp::Ne => Val::Bool(!loose_eq(l, r)),
        BinaryOp::StrictEq => Val::Bool(l == r),
        BinaryOp::StrictNe => Val::Bool(l != r),
        BinaryOp::Lt => Val::Bool(compare(l, r).is_some_and(|o| o.is_lt())),
        BinaryOp::Le => Val::Bool(compare(l, r).is_some_and(|o| o.is_le())),
        BinaryOp::Gt => Val::Bool(compare(l, r).is_some_and(|o| o.is_gt())),
        BinaryOp::Ge => Val::Bool(compare(l, r).is_some_and(|o| o.is_ge())),
    };
    Ok(value)
}

fn loose_eq(l: &Val, r: &Val) -> bool {
    match (l, r) {
        (Val::Undefined | Val::Null, Val::Undefined | Val::Null) => true,
        (Val::Undefined | Val::Null, _) | (_, Val::Undefined | Val::Null) => false,
        (Val::Num(_), Val::Str(_))
        | (Val::Str(_), Val::Num(_))
        | (Val::Bool(_), _)
        | (_, Val::Bool(_)) => l.to_number() == r.to_number(),
        _ => l == r,
    }
}

fn compare(l: &Val, r: &Val) -> Option<std::cmp::Ordering> {
    match (l, r) {
        (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
        _ => l.to_number().partial_cmp(&r.to_number()),
    }
}
