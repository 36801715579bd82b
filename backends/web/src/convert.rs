//! Value conversion between JavaScript and the bridge.
//!
//! Objects become plain JS objects, not `Map`s. `undefined`, `NaN` and
//! infinities arrive as `null`; values with no JSON shape (symbols, functions)
//! are rejected.

use serde::Serialize;
use serde_json::Value;
use serde_wasm_bindgen::Serializer;
use wasm_bindgen::JsValue;

use crate::error::WebError;

/// Converts a JavaScript value into a bridge value.
///
/// # Errors
///
/// Fails for values with no JSON shape, such as symbols or functions.
pub fn from_js(value: &JsValue) -> Result<Value, WebError> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    Ok(serde_wasm_bindgen::from_value(value.clone())?)
}

/// Converts a bridge value into a JavaScript value.
///
/// # Errors
///
/// Fails only if the serializer rejects the value.
pub fn to_js(value: &Value) -> Result<JsValue, WebError> {
    Ok(value.serialize(&Serializer::json_compatible())?)
}

/// Converts an argument list.
///
/// # Errors
///
/// See [`from_js`].
pub fn args_from_js(args: &js_sys::Array) -> Result<Vec<Value>, WebError> {
    args.iter().map(|arg| from_js(&arg)).collect()
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use serde_json::json;
    use wasm_bindgen::JsCast;
    use wasm_bindgen_test::*;

    use super::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn objects_become_plain_objects() {
        let value = to_js(&json!({ "page": 2, "tags": ["a"] })).expect("convertible");
        assert!(value.dyn_ref::<js_sys::Map>().is_none());
        let page = js_sys::Reflect::get(&value, &JsValue::from_str("page")).expect("field");
        assert_eq!(page.as_f64(), Some(2.0));
        assert_eq!(from_js(&value).expect("convertible"), json!({ "page": 2, "tags": ["a"] }));
    }

    #[wasm_bindgen_test]
    fn values_without_json_numbers_read_as_null() {
        assert_eq!(from_js(&JsValue::UNDEFINED).expect("undefined"), Value::Null);
        assert_eq!(from_js(&JsValue::from_f64(f64::NAN)).expect("nan"), Value::Null);
    }

    #[wasm_bindgen_test]
    fn symbols_are_rejected_cleanly() {
        let symbol: JsValue = js_sys::Symbol::for_("elementum").into();
        assert!(matches!(from_js(&symbol), Err(WebError::Js(_))));
    }
}
