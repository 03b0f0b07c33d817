//! Conversion between script values and JSON
//!
//! Used by `JSON.stringify`/`JSON.parse` and by hosts that exchange values
//! with a cell as `serde_json::Value`.

use super::types::Val;
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::BTreeMap;

/// Convert a value to JSON
///
/// Functions, natives and promises have no JSON form: they become `null`
/// inside lists and are skipped inside objects. Non-finite numbers become
/// `null`. Errors serialize as `{ "name", "message" }`.
pub fn val_to_json(value: &Val) -> JsonValue {
    match value {
        Val::Undefined | Val::Null => JsonValue::Null,
        Val::Bool(b) => JsonValue::Bool(*b),
        Val::Num(n) => number_to_json(*n),
        Val::Str(s) => JsonValue::String(s.clone()),
        Val::List(items) => JsonValue::Array(items.iter().map(val_to_json).collect()),
        Val::Obj(map) => {
            let mut out = Map::new();
            for (key, v) in map {
                if !is_skipped(v) {
                    out.insert(key.clone(), val_to_json(v));
                }
            }
            JsonValue::Object(out)
        }
        Val::Error(info) => {
            let mut out = Map::new();
            out.insert("name".to_string(), JsonValue::String(info.name.clone()));
            out.insert("message".to_string(), JsonValue::String(info.message.clone()));
            JsonValue::Object(out)
        }
        Val::Func(_) | Val::Native(_) | Val::Promise(_) => JsonValue::Null,
    }
}

fn is_skipped(value: &Val) -> bool {
    matches!(
        value,
        Val::Undefined | Val::Func(_) | Val::Native(_) | Val::Promise(_)
    )
}

fn number_to_json(n: f64) -> JsonValue {
    if !n.is_finite() {
        return JsonValue::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return JsonValue::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
}

/// Convert JSON into a value
pub fn json_to_val(value: JsonValue) -> Val {
    match value {
        JsonValue::Null => Val::Null,
        JsonValue::Bool(b) => Val::Bool(b),
        JsonValue::Number(n) => Val::Num(n.as_f64().unwrap_or(f64::NAN)),
        JsonValue::String(s) => Val::Str(s),
        JsonValue::Array(items) => Val::List(items.into_iter().map(json_to_val).collect()),
        JsonValue::Object(map) => Val::Obj(
            map.into_iter()
                .map(|(k, v)| (k, json_to_val(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

impl From<JsonValue> for Val {
    fn from(value: JsonValue) -> Self {
        json_to_val(value)
    }
}

impl From<&Val> for JsonValue {
    fn from(value: &Val) -> Self {
        val_to_json(value)
    }
}
