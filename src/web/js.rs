//! Duck-typed access to host JavaScript objects

use js_sys::{Array, Function, Object, Promise, Reflect, JSON};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

/// Human-readable text for a thrown JS value
pub fn describe(value: &JsValue) -> String {
    if let Some(s) = value.as_string() {
        return s;
    }
    if let Some(message) = get(value, "message").as_string() {
        return message;
    }
    format!("{:?}", value)
}

pub fn get(target: &JsValue, key: &str) -> JsValue {
    Reflect::get(target, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED)
}

/// The named property, if present and not `undefined`/`null`
pub fn property(target: &JsValue, key: &str) -> Option<JsValue> {
    let value = get(target, key);
    (!value.is_undefined() && !value.is_null()).then_some(value)
}

pub fn has_method(target: &JsValue, name: &str) -> bool {
    get(target, name).is_function()
}

/// Call `target[name](...args)` synchronously
pub fn call_method(target: &JsValue, name: &str, args: &[JsValue]) -> Result<JsValue, String> {
    let method: Function = get(target, name)
        .dyn_into()
        .map_err(|_| format!("{} is not a function", name))?;
    let args: Array = args.iter().collect();
    method.apply(target, &args).map_err(|e| describe(&e))
}

/// Await the value when it is a promise, pass it through otherwise
pub async fn settle(value: JsValue) -> Result<JsValue, String> {
    match value.dyn_into::<Promise>() {
        Ok(promise) => JsFuture::from(promise).await.map_err(|e| describe(&e)),
        Err(value) => Ok(value),
    }
}

/// Call a method and await its result
pub async fn call_async(target: &JsValue, name: &str, args: &[JsValue]) -> Result<JsValue, String> {
    settle(call_method(target, name, args)?).await
}

/// `new ctor(...args)`
pub fn construct(ctor: &JsValue, args: &[JsValue]) -> Result<JsValue, String> {
    let ctor: &Function = ctor
        .dyn_ref()
        .ok_or_else(|| "constructor is not a function".to_string())?;
    let args: Array = args.iter().collect();
    Reflect::construct(ctor, &args).map_err(|e| describe(&e))
}

pub fn to_js<T: Serialize>(value: &T) -> Result<JsValue, String> {
    let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
    JSON::parse(&text).map_err(|e| describe(&e))
}

/// Structured copy of a JS value; non-serializable values become `null`
pub fn to_json(value: &JsValue) -> serde_json::Value {
    if value.is_undefined() {
        return serde_json::Value::Null;
    }
    JSON::stringify(value)
        .ok()
        .and_then(|s| s.as_string())
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null)
}

/// JSON view of an engine event payload. Payloads that cannot be
/// stringified (JsSIP events reference their UA) keep only their
/// top-level primitive fields such as `cause` and `originator`.
pub fn event_json(value: &JsValue) -> serde_json::Value {
    if let Some(text) = value.as_string() {
        return serde_json::Value::String(text);
    }
    let json = to_json(value);
    if !json.is_null() || !value.is_object() {
        return json;
    }

    let mut fields = serde_json::Map::new();
    for key in Object::keys(value.unchecked_ref()).iter().filter_map(|k| k.as_string()) {
        let field = get(value, &key);
        let primitive = if let Some(s) = field.as_string() {
            serde_json::Value::String(s)
        } else if let Some(b) = field.as_bool() {
            serde_json::Value::Bool(b)
        } else if let Some(n) = field.as_f64().and_then(serde_json::Number::from_f64) {
            serde_json::Value::Number(n)
        } else {
            continue;
        };
        fields.insert(key, primitive);
    }
    serde_json::Value::Object(fields)
}

/// `{ audio: true }`
pub fn audio_flag() -> JsValue {
    let options = Object::new();
    let _ = Reflect::set(&options, &"audio".into(), &JsValue::TRUE);
    options.into()
}
