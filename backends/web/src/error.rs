use core::fmt;

use elementum::error::{DefinitionError, ElementError};

/// Error type produced by the web backend.
#[derive(Debug, Clone)]
pub enum WebError {
    /// The element class could not be defined.
    Definition(DefinitionError),
    /// A lifecycle callback or exposed member failed.
    Element(String),
    /// Wrapper around JavaScript exceptions.
    Js(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Definition(error) => write!(f, "{error}"),
            Self::Element(message) => f.write_str(message),
            Self::Js(msg) => write!(f, "JavaScript error: {msg}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<wasm_bindgen::JsValue> for WebError {
    fn from(value: wasm_bindgen::JsValue) -> Self {
        value
            .as_string()
            .map_or_else(|| Self::Js(format!("{value:?}")), Self::Js)
    }
}

impl From<DefinitionError> for WebError {
    fn from(value: DefinitionError) -> Self {
        Self::Definition(value)
    }
}

impl From<ElementError> for WebError {
    fn from(value: ElementError) -> Self {
        Self::Element(value.to_string())
    }
}

impl From<serde_wasm_bindgen::Error> for WebError {
    fn from(value: serde_wasm_bindgen::Error) -> Self {
        Self::Js(value.to_string())
    }
}

impl From<WebError> for wasm_bindgen::JsValue {
    fn from(value: WebError) -> Self {
        match value {
            WebError::Js(msg) => Self::from(js_sys::Error::new(&msg)),
            other => Self::from(js_sys::Error::new(&other.to_string())),
        }
    }
}
