//! Runtime value types

use super::super::errors::ErrorInfo;
use super::super::scope::ScopeId;
use super::ast::FuncDef;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Handle to a host (native) function registered with the VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub(crate) usize);

/// Handle to an entry of the VM's promise table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(pub(crate) u64);

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A script function together with the scope it was created in
#[derive(Debug)]
pub struct Closure {
    pub def: Arc<FuncDef>,
    pub scope: ScopeId,
}

/// Deepest list/object nesting a script value may reach
///
/// Printing, serializing, cloning and dropping values all recurse, so this
/// bounds their stack use on the loop thread.
pub const MAX_VALUE_DEPTH: usize = 512;

/// Runtime value type
///
/// Lists and objects have value semantics. Functions, natives and promises
/// are handles into state owned by the VM that created them, so a `Val`
/// only means something to that VM.
#[derive(Debug, Clone)]
pub enum Val {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Val>),
    Obj(BTreeMap<String, Val>),
    Func(Arc<Closure>),
    Native(NativeId),
    Promise(PromiseId),
    /// Error value with name and message
    Error(ErrorInfo),
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Undefined, Val::Undefined) | (Val::Null, Val::Null) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Num(a), Val::Num(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::List(a), Val::List(b)) => a == b,
            (Val::Obj(a), Val::Obj(b)) => a == b,
            (Val::Func(a), Val::Func(b)) => Arc::ptr_eq(a, b),
            (Val::Native(a), Val::Native(b)) => a == b,
            (Val::Promise(a), Val::Promise(b)) => a == b,
            (Val::Error(a), Val::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl Val {
    /// Nesting depth: 0 for scalars, 1 for a flat list or object
    ///
    /// Walks without recursion and gives up once `limit` is exceeded, so the
    /// result is exact only up to `limit + 1`.
    pub fn depth(&self, limit: usize) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((value, level)) = pending.pop() {
            let children: Box<dyn Iterator<Item = &Val>> = match value {
                Val::List(items) => Box::new(items.iter()),
                Val::Obj(map) => Box::new(map.values()),
                _ => continue,
            };
            deepest = deepest.max(level);
            if deepest > limit {
                break;
            }
            pending.extend(children.map(|child| (child, level + 1)));
        }
        deepest
    }

    /// Push every promise handle held in this value onto `out`
    pub fn collect_promise_ids(&self, out: &mut Vec<PromiseId>) {
        let mut pending = vec![self];
        while let Some(value) = pending.pop() {
            match value {
                Val::Promise(id) => out.push(*id),
                Val::List(items) => pending.extend(items),
                Val::Obj(map) => pending.extend(map.values()),
                _ => {}
            }
        }
    }

    /// Check if value is truthy (for conditionals)
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Undefined | Val::Null => false,
            Val::Bool(b) => *b,
            Val::Num(n) => *n != 0.0 && !n.is_nan(),
            Val::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Val::Func(_) | Val::Native(_))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Val::Undefined | Val::Null)
    }

    /// Result of the `typeof` operator
    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Undefined => "undefined",
            Val::Bool(_) => "boolean",
            Val::Num(_) => "number",
            Val::Str(_) => "string",
            Val::Func(_) | Val::Native(_) => "function",
            Val::Null | Val::List(_) | Val::Obj(_) | Val::Promise(_) | Val::Error(_) => "object",
        }
    }

    /// Numeric conversion used by arithmetic and relational operators
    pub fn to_number(&self) -> f64 {
        match self {
            Val::Null => 0.0,
            Val::Bool(true) => 1.0,
            Val::Bool(false) => 0.0,
            Val::Num(n) => *n,
            Val::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// String conversion used by concatenation, `join` and console output
    pub fn to_display_string(&self) -> String {
        match self {
            Val::Undefined => "undefined".to_string(),
            Val::Null => "null".to_string(),
            Val::Bool(b) => b.to_string(),
            Val::Num(n) => format_number(*n),
            Val::Str(s) => s.clone(),
            Val::List(items) => items
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
                .collect::<Vec<_>>()
                .join(","),
            Val::Obj(_) => "[object Object]".to_string(),
            Val::Func(closure) => match &closure.def.name {
                Some(name) => format!("[function {}]", name),
                None => "[function]".to_string(),
            },
            Val::Native(_) => "[native function]".to_string(),
            Val::Promise(_) => "[object Promise]".to_string(),
            Val::Error(err) => err.to_string(),
        }
    }
}

/// Format a number the way scripts expect to see it (`3`, not `3.0`)
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<bool> for Val {
    fn from(v: bool) -> Self {
        Val::Bool(v)
    }
}

impl From<f64> for Val {
    fn from(v: f64) -> Self {
        Val::Num(v)
    }
}

impl From<i64> for Val {
    fn from(v: i64) -> Self {
        Val::Num(v as f64)
    }
}

impl From<&str> for Val {
    fn from(v: &str) -> Self {
        Val::Str(v.to_string())
    }
}

impl From<String> for Val {
    fn from(v: String) -> Self {
        Val::Str(v)
    }
}

impl From<Vec<Val>> for Val {
    fn from(v: Vec<Val>) -> Self {
        Val::List(v)
    }
}

impl From<BTreeMap<String, Val>> for Val {
    fn from(v: BTreeMap<String, Val>) -> Self {
        Val::Obj(v)
    }
}
