//! Embedded QuickJS script host.
//!
//! User-supplied JavaScript can hook into the request pipeline at two points:
//!
//! - `preprocess(payload)` — arbitrary payload rewriting; must return the
//!   (possibly replaced) payload object.
//! - `route(payload)` — dynamic upstream selection; must return
//!   `{model, endpointURL, credential}` with non-empty string values.
//!
//! Both entry points are optional and independently enabled by which script
//! files were configured. Script sources are evaluated once at startup into a
//! single shared runtime; a load or eval failure aborts startup.
//!
//! One interpreter instance is shared by every in-flight request, so every
//! invocation takes the engine mutex. Concurrent requests therefore never
//! interleave inside the interpreter; this serialization is a correctness
//! requirement, not an optimization.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use rquickjs::{Context, Ctx, Function, IntoJs, Object, Runtime, Value};
use serde_json::Value as JsonValue;

use crate::error::{GatewayError, Result};

/// Shared scripting environment exposing the optional `preprocess` and
/// `route` entry points.
pub struct ScriptHost {
    engine: Mutex<Engine>,
    has_preprocess: bool,
    has_route: bool,
}

/// The context borrows from the runtime; both live and die together.
struct Engine {
    context: Context,
    _runtime: Runtime,
}

impl ScriptHost {
    /// Evaluate the configured script files into a fresh runtime.
    ///
    /// Returns `Ok(None)` when neither script is configured.
    pub fn load(preprocess: Option<&Path>, router: Option<&Path>) -> Result<Option<Self>> {
        if preprocess.is_none() && router.is_none() {
            return Ok(None);
        }

        let runtime = Runtime::new()
            .map_err(|e| GatewayError::Script(format!("failed to create runtime: {e}")))?;
        let context = Context::full(&runtime)
            .map_err(|e| GatewayError::Script(format!("failed to create context: {e}")))?;

        for path in [preprocess, router].into_iter().flatten() {
            let source = fs::read_to_string(path).map_err(|e| {
                GatewayError::Script(format!("failed to read {}: {e}", path.display()))
            })?;
            context
                .with(|ctx| eval_source(&ctx, &source))
                .map_err(|msg| {
                    GatewayError::Script(format!("failed to evaluate {}: {msg}", path.display()))
                })?;
        }

        Ok(Some(Self {
            engine: Mutex::new(Engine {
                context,
                _runtime: runtime,
            }),
            has_preprocess: preprocess.is_some(),
            has_route: router.is_some(),
        }))
    }

    /// Whether a preprocess script was configured.
    pub fn has_preprocess(&self) -> bool {
        self.has_preprocess
    }

    /// Whether a routing script was configured.
    pub fn has_route(&self) -> bool {
        self.has_route
    }

    /// Invoke the `preprocess` entry point with the current payload.
    pub fn preprocess(&self, payload: &JsonValue) -> Result<JsonValue> {
        self.invoke("preprocess", payload)
            .map_err(GatewayError::Middleware)
    }

    /// Invoke the `route` entry point with the current payload.
    ///
    /// The raw return value is handed back; the caller validates the
    /// routing decision shape.
    pub fn route(&self, payload: &JsonValue) -> Result<JsonValue> {
        self.invoke("route", payload).map_err(GatewayError::Routing)
    }

    fn invoke(&self, entry: &str, payload: &JsonValue) -> std::result::Result<JsonValue, String> {
        let engine = self
            .engine
            .lock()
            .map_err(|_| "script engine lock poisoned".to_string())?;

        engine.context.with(|ctx| {
            let func: Function = ctx
                .globals()
                .get(entry)
                .map_err(|_| format!("script does not define a '{entry}' function"))?;

            let arg = json_to_js(&ctx, payload)
                .map_err(|e| format!("failed to pass payload to '{entry}': {e}"))?;

            let result: Value = match func.call((arg,)) {
                Ok(value) => value,
                Err(rquickjs::Error::Exception) => {
                    return Err(format!("'{entry}' threw: {}", exception_text(&ctx)))
                }
                Err(err) => return Err(format!("'{entry}' invocation failed: {err}")),
            };

            js_to_json(&ctx, result).map_err(|e| format!("failed to read '{entry}' result: {e}"))
        })
    }
}

fn eval_source(ctx: &Ctx<'_>, source: &str) -> std::result::Result<(), String> {
    match ctx.eval::<(), _>(source) {
        Ok(()) => Ok(()),
        Err(rquickjs::Error::Exception) => Err(exception_text(ctx)),
        Err(err) => Err(err.to_string()),
    }
}

/// Pull the pending exception out of the context and render it.
fn exception_text(ctx: &Ctx<'_>) -> String {
    let caught = ctx.catch();
    if let Some(exception) = caught.as_exception() {
        if let Some(message) = exception.message() {
            return message;
        }
    }
    caught
        .as_string()
        .and_then(|s| s.to_string().ok())
        .unwrap_or_else(|| "unknown script exception".to_string())
}

/// Convert a serde_json::Value to a rquickjs Value.
fn json_to_js<'js>(ctx: &Ctx<'js>, value: &JsonValue) -> rquickjs::Result<Value<'js>> {
    match value {
        JsonValue::Null => Ok(Value::new_null(ctx.clone())),
        JsonValue::Bool(b) => Ok(Value::new_bool(ctx.clone(), *b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                if let Ok(i) = i32::try_from(i) {
                    return Ok(Value::new_int(ctx.clone(), i));
                }
            }
            Ok(Value::new_float(ctx.clone(), n.as_f64().unwrap_or(0.0)))
        }
        JsonValue::String(s) => s.clone().into_js(ctx),
        JsonValue::Array(items) => {
            let array = rquickjs::Array::new(ctx.clone())?;
            for (i, item) in items.iter().enumerate() {
                array.set(i, json_to_js(ctx, item)?)?;
            }
            Ok(array.into_value())
        }
        JsonValue::Object(map) => {
            let object = Object::new(ctx.clone())?;
            for (key, item) in map {
                object.set(key.as_str(), json_to_js(ctx, item)?)?;
            }
            Ok(object.into_value())
        }
    }
}

/// Convert a rquickjs Value back to a serde_json::Value.
fn js_to_json<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<JsonValue> {
    if value.is_null() || value.is_undefined() {
        return Ok(JsonValue::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(JsonValue::Bool(b));
    }
    if let Some(i) = value.as_int() {
        return Ok(serde_json::json!(i));
    }
    if let Some(f) = value.as_float() {
        return Ok(serde_json::json!(f));
    }
    if let Some(s) = value.as_string() {
        return Ok(JsonValue::String(s.to_string()?));
    }
    if let Some(array) = value.as_array() {
        let mut items = Vec::with_capacity(array.len());
        for i in 0..array.len() {
            let item: Value = array.get(i)?;
            items.push(js_to_json(ctx, item)?);
        }
        return Ok(JsonValue::Array(items));
    }
    if let Some(object) = value.as_object() {
        let mut map = serde_json::Map::new();
        for prop in object.props::<String, Value>() {
            let (key, item) = prop?;
            map.insert(key, js_to_json(ctx, item)?);
        }
        return Ok(JsonValue::Object(map));
    }
    // Functions, symbols, and friends have no JSON counterpart
    Ok(JsonValue::Null)
}
