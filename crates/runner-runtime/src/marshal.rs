//! Conversion between [`DynamicValue`] and live script values.
//!
//! Script `undefined`, functions and symbols have no dynamic counterpart:
//! they become `Null`, and object members holding them are skipped.

use crate::error::ScriptError;
use crate::value::DynamicValue;
use rquickjs::{Array, CaughtError, Ctx, FromJs, IntoJs, Object, Value};
use std::collections::BTreeMap;

/// Nesting limit when reading script graphs; cycles hit it instead of recursing forever.
const MAX_DEPTH: usize = 128;

impl<'js> IntoJs<'js> for DynamicValue {
    fn into_js(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        match self {
            DynamicValue::Null => Ok(Value::new_null(ctx.clone())),
            DynamicValue::Bool(b) => Ok(Value::new_bool(ctx.clone(), b)),
            DynamicValue::Number(n) => Ok(Value::new_number(ctx.clone(), n)),
            DynamicValue::String(s) => s.into_js(ctx),
            DynamicValue::Array(items) => {
                let array = Array::new(ctx.clone())?;
                for (index, item) in items.into_iter().enumerate() {
                    array.set(index, item)?;
                }
                Ok(array.into_value())
            }
            DynamicValue::Map(map) => {
                let object = Object::new(ctx.clone())?;
                for (key, value) in map {
                    object.set(key, value)?;
                }
                Ok(object.into_value())
            }
        }
    }
}

impl<'js> FromJs<'js> for DynamicValue {
    fn from_js(_ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<Self> {
        read_value(&value, 0)
    }
}

fn read_value(value: &Value<'_>, depth: usize) -> rquickjs::Result<DynamicValue> {
    if depth > MAX_DEPTH {
        return Err(rquickjs::Error::new_from_js_message(
            "object",
            "DynamicValue",
            "value is nested too deeply or cyclic",
        ));
    }

    if let Some(b) = value.as_bool() {
        return Ok(DynamicValue::Bool(b));
    }
    if let Some(n) = value.as_number() {
        return Ok(DynamicValue::Number(n));
    }
    if let Some(s) = value.as_string() {
        return Ok(DynamicValue::String(s.to_string()?));
    }
    if let Some(array) = value.as_array() {
        let mut items = Vec::with_capacity(array.len());
        for item in array.iter::<Value>() {
            items.push(read_value(&item?, depth + 1)?);
        }
        return Ok(DynamicValue::Array(items));
    }
    if value.is_function() {
        return Ok(DynamicValue::Null);
    }
    if let Some(object) = value.as_object() {
        let mut map = BTreeMap::new();
        for prop in object.props::<String, Value>() {
            let (key, member) = prop?;
            if member.is_undefined() || member.is_function() {
                continue;
            }
            map.insert(key, read_value(&member, depth + 1)?);
        }
        return Ok(DynamicValue::Map(map));
    }

    Ok(DynamicValue::Null)
}

/// Short description of a script value's kind for diagnostics.
pub fn describe(value: &Value<'_>) -> &'static str {
    if value.is_undefined() {
        "undefined"
    } else if value.is_null() {
        "null"
    } else if value.as_bool().is_some() {
        "a boolean"
    } else if value.as_number().is_some() {
        "a number"
    } else if value.as_string().is_some() {
        "a string"
    } else if value.is_array() {
        "an array"
    } else if value.is_function() {
        "a function"
    } else if value.as_object().is_some() {
        "an object"
    } else {
        "an unsupported value"
    }
}

/// True for values usable as a runner root object.
pub fn is_plain_object(value: &Value<'_>) -> bool {
    value.as_object().is_some() && !value.is_array() && !value.is_function()
}

/// Normalise a caught script exception.
fn script_error_from_caught(caught: CaughtError<'_>) -> ScriptError {
    match caught {
        CaughtError::Exception(exception) => {
            let mut error = script_error_from_object(exception.as_object(), || {
                exception.message().unwrap_or_default()
            });
            error.stack = exception.stack().filter(|s| !s.is_empty());
            error
        }
        CaughtError::Value(value) => script_error_from_value(&value),
        CaughtError::Error(err) => ScriptError::new("EngineError", err.to_string()),
    }
}

/// Normalise an arbitrary thrown or rejected value.
fn script_error_from_value(value: &Value<'_>) -> ScriptError {
    if let Some(object) = value.as_object() {
        return script_error_from_object(object, || stringify(value));
    }
    ScriptError::new(ScriptError::UNKNOWN_NAME, stringify(value))
}

fn script_error_from_object(
    object: &Object<'_>,
    fallback_message: impl FnOnce() -> String,
) -> ScriptError {
    let name = object
        .get::<_, Option<String>>("name")
        .ok()
        .flatten()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| ScriptError::UNKNOWN_NAME.to_string());
    let message = object
        .get::<_, Option<String>>("message")
        .ok()
        .flatten()
        .unwrap_or_else(fallback_message);
    let stack = object
        .get::<_, Option<String>>("stack")
        .ok()
        .flatten()
        .filter(|s| !s.is_empty());

    ScriptError {
        name,
        message,
        stack,
    }
}

/// Read a script value without going through a `Ctx`.
pub fn to_dynamic(value: &Value<'_>) -> rquickjs::Result<DynamicValue> {
    read_value(value, 0)
}

/// Human-readable rendering of a script value; strings are left unquoted.
pub fn stringify(value: &Value<'_>) -> String {
    if value.is_undefined() {
        return "undefined".to_string();
    }
    if let Some(s) = value.as_string() {
        return s.to_string().unwrap_or_default();
    }
    match read_value(value, 0) {
        Ok(dynamic) => dynamic.to_string(),
        Err(_) => describe(value).to_string(),
    }
}

impl ScriptError {
    /// Normalise an exception caught around an engine call.
    pub fn from_caught(caught: CaughtError<'_>) -> Self {
        script_error_from_caught(caught)
    }

    /// Normalise a thrown or rejected value.
    pub fn from_value(value: &Value<'_>) -> Self {
        script_error_from_value(value)
    }
}

/// Error object handed to script code when a native operation fails.
pub fn error_value(name: &str, message: &str) -> DynamicValue {
    DynamicValue::map([("name", name), ("message", message)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{CatchResultExt, Context, Runtime};

    fn with_context<R>(f: impl FnOnce(Ctx<'_>) -> R) -> R {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(f)
    }

    #[test]
    fn test_script_values_convert_to_dynamic() {
        with_context(|ctx| {
            let value: DynamicValue = ctx
                .eval(r#"({ a: 1, b: [true, "x", null], c: undefined, d: () => 1, e: { f: 2.5 } })"#)
                .unwrap();
            let expected = DynamicValue::map([
                ("a", DynamicValue::from(1.0)),
                (
                    "b",
                    DynamicValue::Array(vec![true.into(), "x".into(), DynamicValue::Null]),
                ),
                ("e", DynamicValue::map([("f", 2.5)])),
            ]);
            assert_eq!(value, expected);
        });
    }

    #[test]
    fn test_dynamic_values_round_trip_through_script() {
        with_context(|ctx| {
            let original = DynamicValue::map([
                ("title", DynamicValue::from("Sample")),
                ("count", DynamicValue::from(3.0)),
                ("tags", DynamicValue::from(vec!["a", "b"])),
            ]);
            let identity: rquickjs::Function = ctx.eval("(v) => v").unwrap();
            let back: DynamicValue = identity.call((original.clone(),)).unwrap();
            assert_eq!(back, original);
        });
    }

    #[test]
    fn test_cyclic_values_are_rejected() {
        with_context(|ctx| {
            let result: rquickjs::Result<DynamicValue> =
                ctx.eval("const o = {}; o.self = o; o");
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_thrown_plain_object_is_normalised() {
        with_context(|ctx| {
            let caught = ctx
                .eval::<(), _>(r#"throw { name: "Oops", message: "bad id" }"#)
                .catch(&ctx)
                .unwrap_err();
            let error = script_error_from_caught(caught);
            assert_eq!(error.to_string(), "[Oops] bad id");
        });
    }

    #[test]
    fn test_thrown_error_instance_keeps_name() {
        with_context(|ctx| {
            let caught = ctx
                .eval::<(), _>(r#"throw new TypeError("nope")"#)
                .catch(&ctx)
                .unwrap_err();
            let error = script_error_from_caught(caught);
            assert_eq!(error.name, "TypeError");
            assert_eq!(error.message, "nope");
        });
    }

    #[test]
    fn test_thrown_primitive_uses_defaults() {
        with_context(|ctx| {
            let caught = ctx
                .eval::<(), _>(r#"throw "boom""#)
                .catch(&ctx)
                .unwrap_err();
            let error = script_error_from_caught(caught);
            assert_eq!(error.name, "UnknownError");
            assert_eq!(error.message, "boom");
        });
    }
}
