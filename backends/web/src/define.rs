//! Registration of component types as browser custom elements.

use std::{rc::Rc, sync::Once};

use elementum::{
    CustomElement, ElementDefinition, Runtime, component::Component, config::ElementConfig,
};
use futures::FutureExt;
use wasm_bindgen::{JsCast, JsValue, prelude::wasm_bindgen};
use web_sys::HtmlElement;

use crate::{
    convert::{args_from_js, from_js, to_js},
    dom::WebHost,
    error::WebError,
};

#[wasm_bindgen(inline_js = r#"
export function defineBridgedElement(tag, factory, attributes, inputs, signals, methods) {
    class BridgedElement extends HTMLElement {
        static get observedAttributes() {
            return attributes;
        }

        constructor() {
            super();
            this.__bridge = factory.create(this);
        }

        connectedCallback() {
            this.__bridge.connected();
        }

        disconnectedCallback() {
            this.__bridge.disconnected();
        }

        attributeChangedCallback(name, oldValue, newValue) {
            this.__bridge.attributeChanged(name, oldValue, newValue);
        }
    }

    for (const name of inputs) {
        Object.defineProperty(BridgedElement.prototype, name, {
            configurable: true,
            get() { return this.__bridge.property(name); },
            set(value) { this.__bridge.setProperty(name, value); },
        });
    }
    for (const name of signals) {
        Object.defineProperty(BridgedElement.prototype, name, {
            configurable: true,
            get() { return this.__bridge.signal(name); },
            set(value) { this.__bridge.setSignal(name, value); },
        });
    }
    for (const name of methods) {
        Object.defineProperty(BridgedElement.prototype, name, {
            configurable: true,
            value(...args) { return this.__bridge.call(name, args); },
        });
    }

    customElements.define(tag, BridgedElement);
}
"#)]
extern "C" {
    #[wasm_bindgen(js_name = defineBridgedElement, catch)]
    fn define_bridged_element(
        tag: &str,
        factory: ElementFactory,
        attributes: js_sys::Array,
        inputs: js_sys::Array,
        signals: js_sys::Array,
        methods: js_sys::Array,
    ) -> Result<(), JsValue>;
}

thread_local! {
    static RUNTIME: Runtime = browser_runtime();
}

fn browser_runtime() -> Runtime {
    let runtime = Runtime::new();
    let queue = runtime.microtasks().downgrade();
    runtime.microtasks().set_driver(move || {
        let Some(window) = web_sys::window() else {
            tracing::error!("no window to schedule microtasks on");
            return;
        };
        let queue = queue.clone();
        let drain = wasm_bindgen::closure::Closure::once_into_js(move || {
            if let Some(queue) = queue.upgrade() {
                queue.run_until_idle();
            }
        });
        window.queue_microtask(drain.unchecked_ref());
    });
    runtime
}

/// The page runtime shared by every element this crate defines.
///
/// Its microtask queue is drained at the browser's microtask checkpoint.
#[must_use]
pub fn runtime() -> Runtime {
    RUNTIME.with(Runtime::clone)
}

/// Defines `C` as the custom element `tag`.
///
/// Input properties, exposed signals and exposed methods become members of
/// the element class; observed attributes are the dash-cased input names.
///
/// # Errors
///
/// [`WebError::Definition`] if `config` exposes members the component does not
/// declare, [`WebError::Js`] if the browser rejects the tag (invalid name, or
/// already defined).
pub fn define<C: Component>(tag: &str, config: ElementConfig) -> Result<ElementDefinition, WebError> {
    install_panic_hook();
    let definition = ElementDefinition::new::<C>(&runtime(), config)?;
    let inputs = definition
        .descriptor()
        .inputs()
        .iter()
        .map(|input| input.property_name().to_owned());

    define_bridged_element(
        tag,
        ElementFactory {
            definition: definition.clone(),
        },
        to_array(definition.observed_attributes().iter().cloned()),
        to_array(inputs),
        to_array(definition.exposed_signals().iter().cloned()),
        to_array(definition.exposed_methods().iter().cloned()),
    )?;
    tracing::debug!(tag, component = definition.descriptor().name(), "custom element defined");
    Ok(definition)
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(console_error_panic_hook::set_once);
}

fn to_array(items: impl Iterator<Item = String>) -> js_sys::Array {
    items.map(JsValue::from).collect()
}

/// Creates the Rust side of each element the browser constructs.
#[wasm_bindgen]
#[derive(Debug)]
pub struct ElementFactory {
    definition: ElementDefinition,
}

#[wasm_bindgen]
impl ElementFactory {
    /// Called from the element constructor.
    pub fn create(&self, host: HtmlElement) -> ElementHandle {
        ElementHandle {
            element: self.definition.create(Rc::new(WebHost::new(host))),
        }
    }
}

/// The bridge behind one element instance.
#[wasm_bindgen]
#[derive(Debug)]
pub struct ElementHandle {
    element: CustomElement,
}

#[wasm_bindgen]
impl ElementHandle {
    /// `connectedCallback`.
    ///
    /// # Errors
    ///
    /// Bootstrap failures are thrown into the page.
    pub fn connected(&self) -> Result<(), JsValue> {
        self.element.connected_callback().map_err(|error| {
            tracing::error!(tag = %self.element.host().tag_name(), %error, "element failed to connect");
            WebError::from(error).into()
        })
    }

    /// `disconnectedCallback`.
    pub fn disconnected(&self) {
        self.element.disconnected_callback();
    }

    /// `attributeChangedCallback`.
    ///
    /// # Errors
    ///
    /// Thrown if the new value cannot be applied.
    #[wasm_bindgen(js_name = attributeChanged)]
    pub fn attribute_changed(
        &self,
        name: &str,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Result<(), JsValue> {
        self.element
            .attribute_changed_callback(name, old_value.as_deref(), new_value.as_deref())
            .map_err(|error| WebError::from(error).into())
    }

    /// Input property getter.
    ///
    /// # Errors
    ///
    /// Thrown for unknown inputs.
    pub fn property(&self, name: &str) -> Result<JsValue, JsValue> {
        let value = self.element.property(name).map_err(WebError::from)?;
        Ok(to_js(&value)?)
    }

    /// Input property setter.
    ///
    /// # Errors
    ///
    /// Thrown for unknown inputs or values with no JSON form.
    #[wasm_bindgen(js_name = setProperty)]
    pub fn set_property(&self, name: &str, value: &JsValue) -> Result<(), JsValue> {
        let value = from_js(value)?;
        self.element.set_property(name, value).map_err(WebError::from)?;
        Ok(())
    }

    /// Signal getter.
    ///
    /// # Errors
    ///
    /// Thrown for signals that are not exposed.
    pub fn signal(&self, name: &str) -> Result<JsValue, JsValue> {
        let value = self.element.signal(name).map_err(WebError::from)?;
        Ok(to_js(&value)?)
    }

    /// Signal setter.
    ///
    /// # Errors
    ///
    /// Thrown for read-only or unexposed signals.
    #[wasm_bindgen(js_name = setSignal)]
    pub fn set_signal(&self, name: &str, value: &JsValue) -> Result<(), JsValue> {
        let value = from_js(value)?;
        self.element.set_signal(name, value).map_err(WebError::from)?;
        Ok(())
    }

    /// Invokes an exposed method. The returned promise settles with its result.
    pub fn call(&self, name: &str, args: &js_sys::Array) -> js_sys::Promise {
        let call = match args_from_js(args) {
            Ok(args) => self.element.call(name, args),
            Err(error) => return js_sys::Promise::reject(&error.into()),
        };
        wasm_bindgen_futures::future_to_promise(call.map(|result| -> Result<JsValue, JsValue> {
            let value = result.map_err(WebError::from)?;
            Ok(to_js(&value)?)
        }))
    }
}
