//! Fixtures shared by the bridge integration tests.
#![allow(dead_code)]

use std::{cell::Cell, rc::Rc};

use elementum::{InjectError, prelude::*};
use serde_json::{Value, json};

thread_local! {
    static INSTANCES: Cell<usize> = const { Cell::new(0) };
    static ROOTS: Cell<usize> = const { Cell::new(0) };
}

fn next(counter: &'static std::thread::LocalKey<Cell<usize>>) -> usize {
    counter.with(|count| {
        count.set(count.get() + 1);
        count.get()
    })
}

/// Application-scoped service numbering every application that resolves it.
#[derive(Debug)]
pub struct RootIndex(pub usize);

impl Service for RootIndex {
    const PROVIDED_IN: Option<Scope> = Some(Scope::Application);

    fn create(_injector: &Injector) -> Result<Self, InjectError> {
        Ok(Self(next(&ROOTS)))
    }
}

/// Platform-scoped service holding a message every card renders.
pub struct SharedMessage {
    pub message: Binding<Value>,
}

impl Service for SharedMessage {
    const PROVIDED_IN: Option<Scope> = Some(Scope::Platform);

    fn create(_injector: &Injector) -> Result<Self, InjectError> {
        Ok(Self {
            message: binding(json!("initial")),
        })
    }
}

/// The component behind `<x-card>`.
pub struct Card {
    instance: usize,
    root: Rc<RootIndex>,
    shared: Rc<SharedMessage>,
    title: Binding<Value>,
    page_size: Binding<Value>,
    text: Binding<Value>,
    header: String,
}

impl Component for Card {
    fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::new("card")
            .input("title")
            .input_with(InputDescriptor::new("pageSize").transform(|value| match value {
                Value::String(raw) => raw.parse::<i64>().map_or(Value::Null, Value::from),
                other => other,
            }))
            .output("openSomePage")
            .method("open")
            .method("describe")
            .method("internalChange")
            .signal("text")
            .readonly_signal("loudText")
            .content_selectors(["header", "*"])
    }

    fn create(cx: &mut ComponentContext) -> anyhow::Result<Self> {
        let instance = next(&INSTANCES);
        let root = cx.inject::<RootIndex>()?;
        let shared = cx.inject::<SharedMessage>()?;
        cx.track(&shared.message);

        let title = cx.input("title")?;
        let page_size = cx.input("pageSize")?;
        let open = cx.output("openSomePage")?;
        let text = binding(json!("hi"));
        let loud = text
            .clone()
            .map(|value: Value| json!(value.as_str().unwrap_or_default().to_uppercase()))
            .computed();
        cx.signal("text", &text)?;
        cx.computed("loudText", loud)?;

        cx.method("open", move |_args| {
            open.emit(123);
            Ok(Value::Null)
        })?;
        {
            let title = title.clone();
            cx.method("describe", move |_args| {
                Ok(json!(format!("card {}", title.get().as_str().unwrap_or("untitled"))))
            })?;
        }
        {
            let text = text.clone();
            cx.method("internalChange", move |_args| {
                let doubled = text.get().as_str().unwrap_or_default().repeat(2);
                text.set(json!(doubled));
                Ok(Value::Null)
            })?;
        }

        Ok(Self {
            instance,
            root,
            shared,
            title,
            page_size,
            text,
            header: cx.projected_markup(0),
        })
    }

    fn render(&self) -> String {
        format!(
            "instance={};root={};title={};size={};text={};shared={};header={}",
            self.instance,
            self.root.0,
            self.title.get().as_str().unwrap_or_default(),
            self.page_size.get(),
            self.text.get().as_str().unwrap_or_default(),
            self.shared.message.get().as_str().unwrap_or_default(),
            self.header,
        )
    }
}

/// Defines `<x-card>` with every method and signal exposed.
pub fn define_card(runtime: &Runtime, config: ElementConfig) -> ElementDefinition {
    ElementDefinition::new::<Card>(
        runtime,
        config
            .expose_methods(["open", "describe", "internalChange"])
            .expose_signals(["text", "loudText"]),
    )
    .expect("card definition is valid")
}

/// Defines `<x-card>` with a fixed, empty application configuration.
pub fn card(runtime: &Runtime) -> ElementDefinition {
    define_card(runtime, ElementConfig::new(ApplicationConfig::new()))
}

/// Creates an element and its in-memory host.
pub fn create(definition: &ElementDefinition) -> (CustomElement, MemoryHost) {
    let host = MemoryHost::new("x-card");
    let element = definition.create(Rc::new(host.clone()));
    (element, host)
}

/// Inserts the host into the document, as `appendChild` would.
pub fn attach(element: &CustomElement, host: &MemoryHost) {
    host.set_connected(true);
    element.connected_callback().expect("element connects");
}

/// Removes the host from the document.
pub fn detach(element: &CustomElement, host: &MemoryHost) {
    host.set_connected(false);
    element.disconnected_callback();
}

/// Lets one turn of the event loop pass.
pub fn turn(runtime: &Runtime) {
    runtime.microtasks().run_until_idle();
}

/// Reads one `key=value` field of a rendered card; empty if the host is blank.
pub fn field(host: &MemoryHost, key: &str) -> String {
    host.content()
        .split(';')
        .filter_map(|part| part.split_once('='))
        .find(|(name, _)| *name == key)
        .map(|(_, value)| value.to_owned())
        .unwrap_or_default()
}
