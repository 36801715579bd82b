//! The custom-element bridge.
//!
//! [`ElementDefinition`] is the class: it validates what a component exposes
//! and derives the observed attributes once. [`CustomElement`] is one instance
//! of it bound to a host, implementing the native callback contract
//! (`attributeChangedCallback`, `connectedCallback`, `disconnectedCallback`)
//! plus the property, signal and method surface.
//!
//! ```
//! use std::rc::Rc;
//!
//! use elementum::prelude::*;
//! use serde_json::{Value, json};
//!
//! struct Hello {
//!     name: Binding<Value>,
//! }
//!
//! impl Component for Hello {
//!     fn descriptor() -> ComponentDescriptor {
//!         ComponentDescriptor::new("hello").input("userName")
//!     }
//!
//!     fn create(cx: &mut ComponentContext) -> anyhow::Result<Self> {
//!         Ok(Self { name: cx.input("userName")? })
//!     }
//!
//!     fn render(&self) -> String {
//!         format!("hello {}", self.name.get().as_str().unwrap_or("nobody"))
//!     }
//! }
//!
//! let runtime = Runtime::new();
//! let definition = ElementDefinition::new::<Hello>(&runtime, ElementConfig::new(ApplicationConfig::new()))?;
//! assert_eq!(definition.observed_attributes(), ["user-name"]);
//!
//! let host = MemoryHost::new("x-hello");
//! host.set_attribute("user-name", "ada");
//! let element = definition.create(Rc::new(host.clone()));
//! element.connected_callback()?;
//! assert_eq!(host.content(), "hello ada");
//! assert_eq!(element.property("userName")?, json!("ada"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    rc::{Rc, Weak},
};

use futures::{
    FutureExt,
    future::{self, LocalBoxFuture},
};
use serde_json::Value;

use crate::{
    application::Application,
    component::{Component, ComponentFactory, factory_of},
    config::{ApplicationConfig, ApplicationMode, ApplicationSource, ElementConfig},
    descriptor::{ComponentDescriptor, SignalDescriptor},
    error::{DefinitionError, ElementError},
    host::HostElement,
    platform::{ListenerKey, Platform, Runtime},
    strategy::ElementStrategy,
};

/// A validated custom-element class for one component type.
#[derive(Clone)]
pub struct ElementDefinition(Rc<DefinitionInner>);

struct DefinitionInner {
    runtime: Runtime,
    descriptor: Rc<ComponentDescriptor>,
    factory: ComponentFactory,
    config: ElementConfig,
    methods: Vec<String>,
    signals: Vec<String>,
    observed_attributes: Vec<String>,
    shared: RefCell<Option<Application>>,
}

impl fmt::Debug for ElementDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementDefinition")
            .field("component", &self.0.descriptor.name())
            .field("methods", &self.0.methods)
            .field("signals", &self.0.signals)
            .field("observed_attributes", &self.0.observed_attributes)
            .finish_non_exhaustive()
    }
}

impl ElementDefinition {
    /// Defines an element class backed by `C`.
    ///
    /// # Errors
    ///
    /// Fails if an exposed method or signal is not declared by the component,
    /// or if two inputs map to the same attribute.
    pub fn new<C: Component>(runtime: &Runtime, config: ElementConfig) -> Result<Self, DefinitionError> {
        Self::from_parts(runtime, C::descriptor(), factory_of::<C>(), config)
    }

    /// Defines an element class from an explicit descriptor and factory.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn from_parts(
        runtime: &Runtime,
        descriptor: ComponentDescriptor,
        factory: ComponentFactory,
        config: ElementConfig,
    ) -> Result<Self, DefinitionError> {
        let methods = validate_methods(&descriptor, config.exposed_methods())?;
        let signals = validate_signals(&descriptor, config.exposed_signals())?;
        check_attributes(&descriptor)?;
        let observed_attributes = descriptor.observed_attributes();
        tracing::debug!(
            component = descriptor.name(),
            attributes = ?observed_attributes,
            "element defined"
        );

        Ok(Self(Rc::new(DefinitionInner {
            runtime: runtime.clone(),
            descriptor: Rc::new(descriptor),
            factory,
            config,
            methods,
            signals,
            observed_attributes,
            shared: RefCell::new(None),
        })))
    }

    /// Attribute names the host runtime must report changes for.
    #[must_use]
    pub fn observed_attributes(&self) -> &[String] {
        &self.0.observed_attributes
    }

    /// Exposed methods, deduplicated, in first-seen order.
    #[must_use]
    pub fn exposed_methods(&self) -> &[String] {
        &self.0.methods
    }

    /// Exposed signals, deduplicated, in first-seen order.
    #[must_use]
    pub fn exposed_signals(&self) -> &[String] {
        &self.0.signals
    }

    /// Descriptor of the backing component.
    #[must_use]
    pub fn descriptor(&self) -> &ComponentDescriptor {
        &self.0.descriptor
    }

    /// The runtime elements of this class live in.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.0.runtime
    }

    /// Constructs an element on `host`. Nothing is bootstrapped until it connects.
    #[must_use]
    pub fn create(&self, host: Rc<dyn HostElement>) -> CustomElement {
        let listener = self.0.runtime.listeners().next_key();
        CustomElement(Rc::new(ElementInner {
            definition: self.clone(),
            host,
            listener,
            cache: RefCell::new(HashMap::new()),
            strategy: RefCell::new(None),
        }))
    }

    fn resolve_config(&self) -> Option<(Platform, ApplicationConfig)> {
        let runtime = &self.0.runtime;
        let (platform, config) = match self.0.config.application() {
            ApplicationSource::Static(config) => (runtime.platform_or_create(), config.clone()),
            ApplicationSource::Factory(factory) => {
                let platform = runtime.platform()?;
                let config = factory(platform.injector());
                (platform, config)
            }
        };
        Some((platform, config.merge(ApplicationConfig::new().stability_tracking(false))))
    }

    fn application(&self, platform: &Platform, config: ApplicationConfig) -> Result<Application, ElementError> {
        if self.0.config.application_mode() == ApplicationMode::PerElement {
            return Ok(Application::bootstrap_sync(platform, config)?);
        }
        let reusable = self
            .0
            .shared
            .borrow()
            .as_ref()
            .filter(|shared| !shared.is_destroyed() && shared.platform().ptr_eq(platform))
            .cloned();
        if let Some(shared) = reusable {
            return Ok(shared);
        }
        let application = Application::bootstrap_sync(platform, config)?;
        *self.0.shared.borrow_mut() = Some(application.clone());
        Ok(application)
    }
}

fn validate_methods(descriptor: &ComponentDescriptor, requested: &[String]) -> Result<Vec<String>, DefinitionError> {
    let mut seen = HashSet::new();
    let mut methods = Vec::new();
    for name in requested {
        if !descriptor.has_method(name) {
            if descriptor.find_signal(name).is_some() {
                return Err(DefinitionError::SignalAsMethod(name.clone()));
            }
            return Err(DefinitionError::UnknownMethod(name.clone()));
        }
        if seen.insert(name.as_str()) {
            methods.push(name.clone());
        }
    }
    Ok(methods)
}

fn validate_signals(descriptor: &ComponentDescriptor, requested: &[String]) -> Result<Vec<String>, DefinitionError> {
    let mut seen = HashSet::new();
    let mut signals = Vec::new();
    for name in requested {
        if descriptor.find_signal(name).is_none() {
            return Err(DefinitionError::UnknownSignal(name.clone()));
        }
        if seen.insert(name.as_str()) {
            signals.push(name.clone());
        }
    }
    Ok(signals)
}

fn check_attributes(descriptor: &ComponentDescriptor) -> Result<(), DefinitionError> {
    let mut owners: HashMap<String, &str> = HashMap::new();
    for input in descriptor.inputs() {
        let attribute = input.attribute_name();
        if let Some(first) = owners.get(&attribute) {
            return Err(DefinitionError::DuplicateAttribute {
                attribute,
                first: (*first).to_owned(),
                second: input.property_name().to_owned(),
            });
        }
        owners.insert(attribute, input.property_name());
    }
    Ok(())
}

/// One custom element instance.
#[derive(Clone)]
pub struct CustomElement(Rc<ElementInner>);

struct ElementInner {
    definition: ElementDefinition,
    host: Rc<dyn HostElement>,
    listener: ListenerKey,
    cache: RefCell<HashMap<String, Value>>,
    strategy: RefCell<Option<ElementStrategy>>,
}

impl Drop for ElementInner {
    fn drop(&mut self) {
        self.definition.runtime().listeners().unregister(self.listener);
    }
}

impl fmt::Debug for CustomElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomElement")
            .field("tag", &self.0.host.tag_name())
            .field("strategy", &self.0.strategy.borrow())
            .finish_non_exhaustive()
    }
}

impl CustomElement {
    /// The host element.
    #[must_use]
    pub fn host(&self) -> &Rc<dyn HostElement> {
        &self.0.host
    }

    /// The class this element was created from.
    #[must_use]
    pub fn definition(&self) -> &ElementDefinition {
        &self.0.definition
    }

    /// The current strategy, without creating one.
    #[must_use]
    pub fn strategy(&self) -> Option<ElementStrategy> {
        self.0.strategy.borrow().clone()
    }

    /// Returns `true` while the element waits for a platform to be created.
    #[must_use]
    pub fn is_waiting_for_platform(&self) -> bool {
        self.0
            .definition
            .runtime()
            .listeners()
            .is_registered(self.0.listener)
    }

    /// Handles `connectedCallback`.
    ///
    /// Creates the strategy on first use. If no application configuration can
    /// be resolved yet, the element waits for the next platform and retries.
    ///
    /// # Errors
    ///
    /// Fails if the application cannot be bootstrapped synchronously or the
    /// component cannot be created.
    pub fn connected_callback(&self) -> Result<(), ElementError> {
        let Some(strategy) = self.ensure_strategy()? else {
            tracing::debug!(
                component = self.0.definition.descriptor().name(),
                "no platform yet, waiting"
            );
            self.wait_for_platform();
            return Ok(());
        };
        if strategy.component().is_none() {
            self.seed(&strategy);
        }
        strategy.connect(Rc::clone(&self.0.host))
    }

    /// Handles `disconnectedCallback`.
    pub fn disconnected_callback(&self) {
        self.0
            .definition
            .runtime()
            .listeners()
            .unregister(self.0.listener);
        if let Some(strategy) = self.strategy() {
            strategy.disconnect();
        }
    }

    /// Handles `attributeChangedCallback`. Attributes that map to no input are ignored.
    ///
    /// # Errors
    ///
    /// See [`set_property`](Self::set_property).
    pub fn attribute_changed_callback(
        &self,
        name: &str,
        _old: Option<&str>,
        new: Option<&str>,
    ) -> Result<(), ElementError> {
        let Some(input) = self.0.definition.descriptor().input_for_attribute(name) else {
            return Ok(());
        };
        let property = input.property_name().to_owned();
        let value = new.map_or(Value::Null, |value| Value::String(value.to_owned()));
        self.set_property(&property, value)
    }

    /// Reads an input property.
    ///
    /// Returns the value held by the component when it can be read back,
    /// otherwise the last value written through the element, otherwise null.
    ///
    /// # Errors
    ///
    /// [`ElementError::UnknownProperty`] if `name` is not a declared input.
    pub fn property(&self, name: &str) -> Result<Value, ElementError> {
        if self.0.definition.descriptor().find_input(name).is_none() {
            return Err(ElementError::UnknownProperty(name.to_owned()));
        }
        Ok(self.read(name))
    }

    /// Writes an input property.
    ///
    /// # Errors
    ///
    /// [`ElementError::UnknownProperty`] if `name` is not a declared input.
    pub fn set_property(&self, name: &str, value: Value) -> Result<(), ElementError> {
        if self.0.definition.descriptor().find_input(name).is_none() {
            return Err(ElementError::UnknownProperty(name.to_owned()));
        }
        self.write(name, value)
    }

    /// Reads an exposed signal, with the same fallback as [`property`](Self::property).
    ///
    /// # Errors
    ///
    /// [`ElementError::UnknownProperty`] if `name` is not an exposed signal.
    pub fn signal(&self, name: &str) -> Result<Value, ElementError> {
        self.exposed_signal(name)?;
        Ok(self.read(name))
    }

    /// Writes an exposed signal.
    ///
    /// # Errors
    ///
    /// [`ElementError::UnknownProperty`] if `name` is not an exposed signal,
    /// [`ElementError::ReadOnly`] if it is read-only.
    pub fn set_signal(&self, name: &str, value: Value) -> Result<(), ElementError> {
        if !self.exposed_signal(name)?.is_writable() {
            return Err(ElementError::ReadOnly(name.to_owned()));
        }
        self.write(name, value)
    }

    /// Calls an exposed method. The result is always delivered through the future.
    ///
    /// The future fails with [`ElementError::Detached`] while the host is out of
    /// the document and with [`ElementError::NotInitialized`] before a strategy exists.
    pub fn call(&self, name: &str, args: Vec<Value>) -> LocalBoxFuture<'static, Result<Value, ElementError>> {
        if !self.0.definition.exposed_methods().iter().any(|method| method == name) {
            return future::ready(Err(ElementError::UnknownMethod(name.to_owned()))).boxed_local();
        }
        if !self.0.host.is_connected() {
            return future::ready(Err(ElementError::Detached)).boxed_local();
        }
        let Some(strategy) = self.strategy() else {
            return future::ready(Err(ElementError::NotInitialized)).boxed_local();
        };
        match strategy.apply_method(name, args) {
            Ok(result) => result,
            Err(error) => future::ready(Err(error)).boxed_local(),
        }
    }

    fn exposed_signal(&self, name: &str) -> Result<&SignalDescriptor, ElementError> {
        let definition = &self.0.definition;
        if !definition.exposed_signals().iter().any(|signal| signal == name) {
            return Err(ElementError::UnknownProperty(name.to_owned()));
        }
        definition
            .descriptor()
            .find_signal(name)
            .ok_or_else(|| ElementError::UnknownProperty(name.to_owned()))
    }

    fn read(&self, name: &str) -> Value {
        if let Some(value) = self.strategy().and_then(|strategy| strategy.value(name)) {
            self.0.cache.borrow_mut().insert(name.to_owned(), value);
        }
        self.0.cache.borrow().get(name).cloned().unwrap_or(Value::Null)
    }

    fn write(&self, name: &str, value: Value) -> Result<(), ElementError> {
        self.0.cache.borrow_mut().insert(name.to_owned(), value.clone());
        match self.strategy() {
            Some(strategy) => strategy.set_value(name, value),
            None => Ok(()),
        }
    }

    fn seed(&self, strategy: &ElementStrategy) {
        let descriptor = self.0.definition.descriptor();
        for input in descriptor.inputs() {
            if let Some(value) = self.0.host.attribute(&input.attribute_name()) {
                self.seed_value(strategy, input.property_name(), Value::String(value));
            }
        }
        let cache = self.0.cache.borrow().clone();
        for (name, value) in cache {
            self.seed_value(strategy, &name, value);
        }
    }

    fn seed_value(&self, strategy: &ElementStrategy, name: &str, value: Value) {
        if let Err(error) = strategy.set_value(name, value) {
            tracing::warn!(
                component = self.0.definition.descriptor().name(),
                name,
                %error,
                "cached value not applied"
            );
        }
    }

    fn ensure_strategy(&self) -> Result<Option<ElementStrategy>, ElementError> {
        if let Some(strategy) = self.strategy() {
            return Ok(Some(strategy));
        }
        let strategy = self.create_strategy()?;
        *self.0.strategy.borrow_mut() = strategy.clone();
        Ok(strategy)
    }

    fn create_strategy(&self) -> Result<Option<ElementStrategy>, ElementError> {
        let definition = &self.0.definition;
        let Some((platform, config)) = definition.resolve_config() else {
            return Ok(None);
        };
        let application = definition.application(&platform, config)?;
        if application.is_destroyed() {
            return Ok(None);
        }

        let weak = Rc::downgrade(&self.0);
        {
            let application = application.clone();
            let weak = Weak::clone(&weak);
            platform.on_destroy(move || {
                application.destroy();
                if let Some(inner) = weak.upgrade() {
                    let element = Self(inner);
                    if element.0.host.is_connected() {
                        element.wait_for_platform();
                    }
                }
            });
        }
        application.on_destroy(move || {
            if let Some(inner) = weak.upgrade() {
                inner.strategy.borrow_mut().take();
            }
        });

        Ok(Some(ElementStrategy::new(
            Rc::clone(&definition.0.descriptor),
            Rc::clone(&definition.0.factory),
            application,
        )))
    }

    fn wait_for_platform(&self) {
        let weak = Rc::downgrade(&self.0);
        self.0
            .definition
            .runtime()
            .listeners()
            .register(self.0.listener, move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if let Err(error) = CustomElement(inner).connected_callback() {
                    tracing::error!(%error, "failed to connect element after platform creation");
                }
            });
    }
}
