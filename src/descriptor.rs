//! Static reflection of a component type.
//!
//! A [`ComponentDescriptor`] lists what a component exposes to the outside:
//! inputs, outputs, methods, reactive values ("signals") and content
//! projection selectors. It is produced once per component type and shared by
//! every element of a definition.

use std::{fmt, rc::Rc};

use serde_json::Value;

use crate::names::camel_to_dash_case;

/// Conversion applied to every value written to an input.
pub type InputTransform = Rc<dyn Fn(Value) -> Value>;

/// A declared input.
#[derive(Clone)]
pub struct InputDescriptor {
    property_name: String,
    external_name: String,
    transform: Option<InputTransform>,
    default: Value,
}

impl fmt::Debug for InputDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputDescriptor")
            .field("property_name", &self.property_name)
            .field("external_name", &self.external_name)
            .field("transform", &self.transform.is_some())
            .field("default", &self.default)
            .finish()
    }
}

impl InputDescriptor {
    /// Declares an input whose external name equals its property name.
    pub fn new(property_name: impl Into<String>) -> Self {
        let property_name = property_name.into();
        Self {
            external_name: property_name.clone(),
            property_name,
            transform: None,
            default: Value::Null,
        }
    }

    /// Sets the name the input is known by outside the component.
    #[must_use]
    pub fn alias(mut self, external_name: impl Into<String>) -> Self {
        self.external_name = external_name.into();
        self
    }

    /// Sets the write-time transform.
    #[must_use]
    pub fn transform(mut self, transform: impl Fn(Value) -> Value + 'static) -> Self {
        self.transform = Some(Rc::new(transform));
        self
    }

    /// Sets the value the input holds before anything is written.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = value;
        self
    }

    /// Name of the property on the component.
    #[must_use]
    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    /// Name of the input outside the component.
    #[must_use]
    pub fn external_name(&self) -> &str {
        &self.external_name
    }

    /// Observed attribute for this input.
    #[must_use]
    pub fn attribute_name(&self) -> String {
        camel_to_dash_case(&self.external_name)
    }

    /// The write-time transform, if any.
    #[must_use]
    pub fn transform_fn(&self) -> Option<&InputTransform> {
        self.transform.as_ref()
    }

    /// Initial value.
    #[must_use]
    pub const fn initial_value(&self) -> &Value {
        &self.default
    }

    /// Applies the transform, if any.
    #[must_use]
    pub fn apply(&self, value: Value) -> Value {
        match &self.transform {
            Some(transform) => transform(value),
            None => value,
        }
    }
}

/// A declared output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDescriptor {
    property_name: String,
    external_name: String,
}

impl OutputDescriptor {
    /// Declares an output whose external name equals its property name.
    pub fn new(property_name: impl Into<String>) -> Self {
        let property_name = property_name.into();
        Self {
            external_name: property_name.clone(),
            property_name,
        }
    }

    /// Sets the name the output is known by outside the component.
    #[must_use]
    pub fn alias(mut self, external_name: impl Into<String>) -> Self {
        self.external_name = external_name.into();
        self
    }

    /// Name of the emitter on the component.
    #[must_use]
    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    /// Name of the output outside the component.
    #[must_use]
    pub fn external_name(&self) -> &str {
        &self.external_name
    }

    /// Name of the DOM event each emission is dispatched as.
    #[must_use]
    pub fn event_name(&self) -> String {
        camel_to_dash_case(&self.external_name)
    }
}

/// A declared reactive value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalDescriptor {
    name: String,
    writable: bool,
}

impl SignalDescriptor {
    /// Name of the signal.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the signal accepts writes from outside.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.writable
    }
}

/// Everything the bridge needs to know about a component type.
#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    name: String,
    inputs: Vec<InputDescriptor>,
    outputs: Vec<OutputDescriptor>,
    methods: Vec<String>,
    signals: Vec<SignalDescriptor>,
    content_selectors: Vec<String>,
}

impl ComponentDescriptor {
    /// Starts an empty descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            methods: Vec::new(),
            signals: Vec::new(),
            content_selectors: Vec::new(),
        }
    }

    /// Declares an input named `name`.
    #[must_use]
    pub fn input(self, name: impl Into<String>) -> Self {
        self.input_with(InputDescriptor::new(name))
    }

    /// Declares a fully configured input.
    #[must_use]
    pub fn input_with(mut self, input: InputDescriptor) -> Self {
        self.inputs
            .retain(|existing| existing.property_name != input.property_name);
        self.inputs.push(input);
        self
    }

    /// Declares an output named `name`.
    #[must_use]
    pub fn output(self, name: impl Into<String>) -> Self {
        self.output_with(OutputDescriptor::new(name))
    }

    /// Declares a fully configured output.
    #[must_use]
    pub fn output_with(mut self, output: OutputDescriptor) -> Self {
        self.outputs
            .retain(|existing| existing.property_name != output.property_name);
        self.outputs.push(output);
        self
    }

    /// Declares a method.
    #[must_use]
    pub fn method(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.methods.contains(&name) {
            self.methods.push(name);
        }
        self
    }

    /// Declares a writable signal.
    #[must_use]
    pub fn signal(self, name: impl Into<String>) -> Self {
        self.push_signal(name.into(), true)
    }

    /// Declares a read-only signal.
    #[must_use]
    pub fn readonly_signal(self, name: impl Into<String>) -> Self {
        self.push_signal(name.into(), false)
    }

    fn push_signal(mut self, name: String, writable: bool) -> Self {
        self.signals.retain(|existing| existing.name != name);
        self.signals.push(SignalDescriptor { name, writable });
        self
    }

    /// Sets the content projection selectors, in slot order. `*` is the wildcard slot.
    #[must_use]
    pub fn content_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_selectors = selectors.into_iter().map(Into::into).collect();
        self
    }

    /// Name of the component type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inputs in declaration order.
    #[must_use]
    pub fn inputs(&self) -> &[InputDescriptor] {
        &self.inputs
    }

    /// Outputs in declaration order.
    #[must_use]
    pub fn outputs(&self) -> &[OutputDescriptor] {
        &self.outputs
    }

    /// Method names.
    #[must_use]
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Signals in declaration order.
    #[must_use]
    pub fn signals(&self) -> &[SignalDescriptor] {
        &self.signals
    }

    /// Content projection selectors.
    #[must_use]
    pub fn selectors(&self) -> &[String] {
        &self.content_selectors
    }

    /// Looks up an input by property name.
    #[must_use]
    pub fn find_input(&self, property_name: &str) -> Option<&InputDescriptor> {
        self.inputs
            .iter()
            .find(|input| input.property_name == property_name)
    }

    /// Looks up an output by property name.
    #[must_use]
    pub fn find_output(&self, property_name: &str) -> Option<&OutputDescriptor> {
        self.outputs
            .iter()
            .find(|output| output.property_name == property_name)
    }

    /// Looks up a signal by name.
    #[must_use]
    pub fn find_signal(&self, name: &str) -> Option<&SignalDescriptor> {
        self.signals.iter().find(|signal| signal.name == name)
    }

    /// Returns `true` if `name` is a declared method.
    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|method| method == name)
    }

    /// Input bound to the given observed attribute.
    #[must_use]
    pub fn input_for_attribute(&self, attribute: &str) -> Option<&InputDescriptor> {
        self.inputs
            .iter()
            .find(|input| input.attribute_name() == attribute)
    }

    /// Observed attribute names, in input declaration order.
    #[must_use]
    pub fn observed_attributes(&self) -> Vec<String> {
        self.inputs
            .iter()
            .map(InputDescriptor::attribute_name)
            .collect()
    }
}
