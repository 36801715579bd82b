//! The component model driven by the bridge.
//!
//! A [`Component`] is created from a [`ComponentContext`], which hands it one
//! reactive binding per declared input, one [`Output`] per declared output,
//! and lets it register the signals and methods its descriptor declares. The
//! resulting [`ComponentRef`] owns the instance, its element-scoped injector
//! and its view, a clean effect on the application scheduler that re-renders
//! the instance into its host whenever something it tracks changes.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};

use anyhow::{anyhow, bail};
use elementum_core::{
    EffectRef, Injector, NotificationSource, Rejection, Scheduler, Service,
    scheduler::WeakEffectRef,
};
use futures::{
    FutureExt,
    future::{self, LocalBoxFuture},
};
use nami::{Binding, Computed, Signal, binding};
use serde_json::Value;

use crate::{
    descriptor::{ComponentDescriptor, InputTransform, OutputDescriptor},
    error::ElementError,
    host::{ContentNode, HostElement},
};

/// A UI component that can back a custom element.
pub trait Component: 'static {
    /// Static reflection of the component type.
    fn descriptor() -> ComponentDescriptor
    where
        Self: Sized;

    /// Creates an instance.
    ///
    /// # Errors
    ///
    /// Any error aborts creation; the element stays empty.
    fn create(cx: &mut ComponentContext) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Renders the current state to markup.
    fn render(&self) -> String;
}

/// Type-erased constructor for a component.
pub type ComponentFactory = Rc<dyn Fn(&mut ComponentContext) -> anyhow::Result<Box<dyn Component>>>;

/// Builds the [`ComponentFactory`] for `C`.
#[must_use]
pub fn factory_of<C: Component>() -> ComponentFactory {
    Rc::new(|cx| C::create(cx).map(|component| Box::new(component) as Box<dyn Component>))
}

type Listener = Rc<dyn Fn(&Value)>;

/// An event emitter for one declared output.
#[derive(Clone)]
pub struct Output(Rc<OutputInner>);

struct OutputInner {
    name: String,
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_id: Cell<u64>,
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("name", &self.0.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Output {
    fn new(name: &str) -> Self {
        Self(Rc::new(OutputInner {
            name: name.to_owned(),
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }))
    }

    /// Emits a value to every subscriber.
    pub fn emit(&self, value: impl Into<Value>) {
        let value = value.into();
        let listeners: Vec<Listener> = self
            .0
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&value);
        }
    }

    /// Subscribes to emissions until the returned [`Subscription`] is dropped.
    pub fn subscribe(&self, listener: impl Fn(&Value) + 'static) -> Subscription {
        let id = self.0.next_id.get();
        self.0.next_id.set(id + 1);
        self.0.listeners.borrow_mut().push((id, Rc::new(listener)));
        Subscription {
            output: Rc::downgrade(&self.0),
            id,
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.0.listeners.borrow().len()
    }
}

/// Keeps an [`Output`] subscription alive.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    output: Weak<OutputInner>,
    id: u64,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscription").field(&self.id).finish()
    }
}

impl Subscription {
    /// Unsubscribes now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(output) = self.output.upgrade() {
            output.listeners.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Lets a component request re-rendering of its own view.
#[derive(Clone, Default)]
pub struct ChangeDetector {
    view: Rc<RefCell<Option<WeakEffectRef>>>,
}

impl fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeDetector")
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

impl ChangeDetector {
    fn view(&self) -> Option<EffectRef> {
        self.view.borrow().as_ref().and_then(WeakEffectRef::upgrade)
    }

    fn bind(&self, view: &EffectRef) {
        *self.view.borrow_mut() = Some(view.downgrade());
    }

    /// Marks the view dirty; it is re-rendered on the next tick.
    pub fn mark_for_check(&self) {
        if let Some(view) = self.view() {
            view.mark_dirty_from(NotificationSource::MarkForCheck);
        }
    }

    /// Re-renders the view immediately.
    pub fn detect_changes(&self) {
        if let Some(view) = self.view() {
            view.run();
        }
    }

    /// Whether the view is waiting to be re-rendered.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.view().is_some_and(|view| view.is_dirty())
    }
}

#[derive(Clone)]
enum SignalCell {
    Writable(Binding<Value>),
    ReadOnly(Computed<Value>),
    Transformed {
        binding: Binding<Value>,
        transform: InputTransform,
    },
}

impl SignalCell {
    /// `None` when the stored value cannot be represented outside the component.
    fn read(&self) -> Option<Value> {
        match self {
            Self::Writable(binding) => Some(binding.get()),
            Self::ReadOnly(computed) => Some(computed.get()),
            Self::Transformed { .. } => None,
        }
    }
}

type SyncMethod = Rc<dyn Fn(Vec<Value>) -> anyhow::Result<Value>>;
type AsyncMethod = Rc<dyn Fn(Vec<Value>) -> LocalBoxFuture<'static, anyhow::Result<Value>>>;

#[derive(Clone)]
enum Method {
    Sync(SyncMethod),
    Async(AsyncMethod),
}

/// Everything a component can reach while it is being created.
pub struct ComponentContext {
    descriptor: Rc<ComponentDescriptor>,
    injector: Injector,
    inputs: Vec<Binding<Value>>,
    outputs: Vec<Output>,
    signals: HashMap<String, SignalCell>,
    methods: HashMap<String, Method>,
    projected: Vec<Vec<ContentNode>>,
    detector: ChangeDetector,
    guards: Vec<Box<dyn Any>>,
}

impl fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContext")
            .field("component", &self.descriptor.name())
            .field("injector", &self.injector)
            .field("signals", &self.signals.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ComponentContext {
    fn new(
        descriptor: Rc<ComponentDescriptor>,
        injector: Injector,
        projected: Vec<Vec<ContentNode>>,
    ) -> Self {
        let detector = ChangeDetector::default();
        let mut guards: Vec<Box<dyn Any>> = Vec::new();
        let inputs = descriptor
            .inputs()
            .iter()
            .map(|input| {
                let cell = binding(input.initial_value().clone());
                guards.push(watch_for_check(&cell, &detector));
                cell
            })
            .collect();
        let outputs = descriptor
            .outputs()
            .iter()
            .map(|output| Output::new(output.property_name()))
            .collect();

        Self {
            descriptor,
            injector,
            inputs,
            outputs,
            signals: HashMap::new(),
            methods: HashMap::new(),
            projected,
            detector,
            guards,
        }
    }

    /// The element-scoped injector.
    #[must_use]
    pub const fn injector(&self) -> &Injector {
        &self.injector
    }

    /// Resolves a service from the element injector.
    ///
    /// # Errors
    ///
    /// See [`Injector::get`].
    pub fn inject<T: Service>(&self) -> anyhow::Result<Rc<T>> {
        Ok(self.injector.get::<T>()?)
    }

    /// The binding behind a declared input.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not a declared input.
    pub fn input(&self, name: &str) -> anyhow::Result<Binding<Value>> {
        self.descriptor
            .inputs()
            .iter()
            .position(|input| input.property_name() == name)
            .map(|index| self.inputs[index].clone())
            .ok_or_else(|| anyhow!("`{name}` is not an input of `{}`", self.descriptor.name()))
    }

    /// The emitter behind a declared output.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not a declared output.
    pub fn output(&self, name: &str) -> anyhow::Result<Output> {
        self.descriptor
            .outputs()
            .iter()
            .position(|output| output.property_name() == name)
            .map(|index| self.outputs[index].clone())
            .ok_or_else(|| anyhow!("`{name}` is not an output of `{}`", self.descriptor.name()))
    }

    /// Registers a writable signal. Its changes re-render the view.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not a declared signal.
    pub fn signal(&mut self, name: &str, cell: &Binding<Value>) -> anyhow::Result<()> {
        self.register_signal(name, SignalCell::Writable(cell.clone()))?;
        self.track(cell);
        Ok(())
    }

    /// Registers a read-only signal. Its changes re-render the view.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not a declared signal.
    pub fn computed(&mut self, name: &str, computed: Computed<Value>) -> anyhow::Result<()> {
        self.track(&computed);
        self.register_signal(name, SignalCell::ReadOnly(computed))
    }

    /// Registers a signal that converts every written value with `transform`.
    ///
    /// Its value cannot be read back from outside the component.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not a declared signal.
    pub fn transformed_signal(
        &mut self,
        name: &str,
        cell: &Binding<Value>,
        transform: impl Fn(Value) -> Value + 'static,
    ) -> anyhow::Result<()> {
        self.register_signal(
            name,
            SignalCell::Transformed {
                binding: cell.clone(),
                transform: Rc::new(transform),
            },
        )?;
        self.track(cell);
        Ok(())
    }

    fn register_signal(&mut self, name: &str, cell: SignalCell) -> anyhow::Result<()> {
        if self.descriptor.find_signal(name).is_none() {
            bail!("`{name}` is not a signal of `{}`", self.descriptor.name());
        }
        self.signals.insert(name.to_owned(), cell);
        Ok(())
    }

    /// Registers the handler of a declared method.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not a declared method.
    pub fn method(
        &mut self,
        name: &str,
        handler: impl Fn(Vec<Value>) -> anyhow::Result<Value> + 'static,
    ) -> anyhow::Result<()> {
        self.register_method(name, Method::Sync(Rc::new(handler)))
    }

    /// Registers the handler of a declared method that completes later.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not a declared method.
    pub fn async_method<F>(
        &mut self,
        name: &str,
        handler: impl Fn(Vec<Value>) -> F + 'static,
    ) -> anyhow::Result<()>
    where
        F: Future<Output = anyhow::Result<Value>> + 'static,
    {
        self.register_method(
            name,
            Method::Async(Rc::new(move |args| handler(args).boxed_local())),
        )
    }

    fn register_method(&mut self, name: &str, method: Method) -> anyhow::Result<()> {
        if !self.descriptor.has_method(name) {
            bail!("`{name}` is not a method of `{}`", self.descriptor.name());
        }
        self.methods.insert(name.to_owned(), method);
        Ok(())
    }

    /// Re-renders the view whenever `source` changes.
    pub fn track<S>(&mut self, source: &S)
    where
        S: Signal,
        S::Guard: 'static,
    {
        self.guards.push(watch_for_check(source, &self.detector));
    }

    /// Host children projected into the slot of `selectors()[slot]`.
    #[must_use]
    pub fn projected(&self, slot: usize) -> &[ContentNode] {
        self.projected.as_slice().get(slot).map(Vec::as_slice).unwrap_or_default()
    }

    /// Markup of every node projected into `slot`.
    #[must_use]
    pub fn projected_markup(&self, slot: usize) -> String {
        self.projected(slot)
            .iter()
            .map(ContentNode::to_markup)
            .collect()
    }

    /// A handle for requesting re-renders later on.
    #[must_use]
    pub fn change_detector(&self) -> ChangeDetector {
        self.detector.clone()
    }
}

fn watch_for_check<S>(source: &S, detector: &ChangeDetector) -> Box<dyn Any>
where
    S: Signal,
    S::Guard: 'static,
{
    let detector = detector.clone();
    Box::new(source.watch(move |_context| detector.mark_for_check()))
}

/// A live component instance bound to a host.
#[derive(Clone)]
pub struct ComponentRef(Rc<ComponentInner>);

struct ComponentInner {
    descriptor: Rc<ComponentDescriptor>,
    instance: Box<dyn Component>,
    host: Rc<dyn HostElement>,
    injector: Injector,
    inputs: Vec<Binding<Value>>,
    outputs: Vec<Output>,
    signals: HashMap<String, SignalCell>,
    methods: HashMap<String, Method>,
    view: EffectRef,
    detector: ChangeDetector,
    guards: RefCell<Vec<Box<dyn Any>>>,
    on_destroy: RefCell<Vec<Box<dyn FnOnce()>>>,
    destroyed: Cell<bool>,
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("component", &self.0.descriptor.name())
            .field("host", &self.0.host.tag_name())
            .field("view", &self.0.view)
            .field("destroyed", &self.0.destroyed.get())
            .finish_non_exhaustive()
    }
}

impl ComponentRef {
    /// Creates an instance on `host`. The view is created clean and is not rendered yet.
    ///
    /// # Errors
    ///
    /// Returns [`ElementError::Create`] if the factory fails. The injector is
    /// destroyed in that case.
    pub fn create(
        descriptor: Rc<ComponentDescriptor>,
        factory: &ComponentFactory,
        host: Rc<dyn HostElement>,
        injector: Injector,
        scheduler: &Scheduler,
        projected: Vec<Vec<ContentNode>>,
    ) -> Result<Self, ElementError> {
        let mut cx = ComponentContext::new(Rc::clone(&descriptor), injector.clone(), projected);
        let instance = match factory(&mut cx) {
            Ok(instance) => instance,
            Err(source) => {
                injector.destroy();
                return Err(ElementError::Create {
                    component: descriptor.name().to_owned(),
                    source,
                });
            }
        };

        let ComponentContext {
            inputs,
            outputs,
            signals,
            methods,
            detector,
            guards,
            ..
        } = cx;

        let inner = Rc::new_cyclic(|weak: &Weak<ComponentInner>| {
            let weak = weak.clone();
            let view = scheduler.view_effect(move || {
                if let Some(inner) = weak.upgrade() {
                    let markup = inner.instance.render();
                    inner.host.render(&markup);
                }
            });
            ComponentInner {
                descriptor,
                instance,
                host,
                injector,
                inputs,
                outputs,
                signals,
                methods,
                view,
                detector,
                guards: RefCell::new(guards),
                on_destroy: RefCell::new(Vec::new()),
                destroyed: Cell::new(false),
            }
        });
        inner.detector.bind(&inner.view);
        tracing::debug!(component = inner.descriptor.name(), "component created");
        Ok(Self(inner))
    }

    /// Descriptor of the component type.
    #[must_use]
    pub fn descriptor(&self) -> &ComponentDescriptor {
        &self.0.descriptor
    }

    /// The element-scoped injector.
    #[must_use]
    pub fn injector(&self) -> &Injector {
        &self.0.injector
    }

    /// The host the component renders into.
    #[must_use]
    pub fn host(&self) -> &Rc<dyn HostElement> {
        &self.0.host
    }

    /// The view effect.
    #[must_use]
    pub fn view(&self) -> &EffectRef {
        &self.0.view
    }

    /// The change detector shared with the instance.
    #[must_use]
    pub fn change_detector(&self) -> &ChangeDetector {
        &self.0.detector
    }

    /// Returns `true` if both handles point at the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Current value of an input, or `None` if the input transforms written
    /// values and so cannot be read back.
    #[must_use]
    pub fn input_value(&self, name: &str) -> Option<Value> {
        let index = self.input_index(name)?;
        let input = &self.0.descriptor.inputs()[index];
        if input.transform_fn().is_some() {
            return None;
        }
        Some(self.0.inputs[index].get())
    }

    /// Writes an input through its transform. Returns `false` if the input is
    /// unknown or already holds the value, in which case the view is left alone.
    pub fn set_input(&self, name: &str, value: Value) -> bool {
        let Some(index) = self.input_index(name) else {
            return false;
        };
        let value = self.0.descriptor.inputs()[index].apply(value);
        let cell = &self.0.inputs[index];
        if cell.get() == value {
            return false;
        }
        cell.set(value);
        true
    }

    fn input_index(&self, name: &str) -> Option<usize> {
        self.0
            .descriptor
            .inputs()
            .iter()
            .position(|input| input.property_name() == name)
    }

    /// Current value of a registered signal; `None` if it is unregistered or
    /// cannot be read back.
    #[must_use]
    pub fn signal_value(&self, name: &str) -> Option<Value> {
        self.0.signals.get(name).and_then(SignalCell::read)
    }

    /// Writes a registered signal.
    ///
    /// # Errors
    ///
    /// [`ElementError::ReadOnly`] for computed signals,
    /// [`ElementError::UnknownProperty`] for unregistered ones.
    pub fn set_signal(&self, name: &str, value: Value) -> Result<(), ElementError> {
        match self.0.signals.get(name) {
            Some(SignalCell::Writable(cell)) => cell.set(value),
            Some(SignalCell::Transformed { binding, transform }) => binding.set(transform(value)),
            Some(SignalCell::ReadOnly(_)) => return Err(ElementError::ReadOnly(name.to_owned())),
            None => return Err(ElementError::UnknownProperty(name.to_owned())),
        }
        Ok(())
    }

    /// Declared outputs paired with their emitters.
    pub fn outputs(&self) -> impl Iterator<Item = (&OutputDescriptor, &Output)> {
        self.0.descriptor.outputs().iter().zip(self.0.outputs.iter())
    }

    /// Invokes a registered method. Synchronous methods run before this
    /// returns; the result is always delivered through the returned future.
    pub fn call(&self, name: &str, args: Vec<Value>) -> LocalBoxFuture<'static, Result<Value, ElementError>> {
        let Some(method) = self.0.methods.get(name).cloned() else {
            return future::ready(Err(ElementError::UnknownMethod(name.to_owned()))).boxed_local();
        };
        let name = name.to_owned();
        let failed = move |error: anyhow::Error| ElementError::Method {
            name,
            reason: Rejection::new(error),
        };
        match method {
            Method::Sync(method) => future::ready(method(args).map_err(failed)).boxed_local(),
            Method::Async(method) => method(args).map(move |result| result.map_err(failed)).boxed_local(),
        }
    }

    /// Renders the view now.
    pub fn detect_changes(&self) {
        self.0.view.run();
    }

    /// Whether the view is waiting for a re-render.
    #[must_use]
    pub fn is_view_dirty(&self) -> bool {
        self.0.view.is_dirty()
    }

    /// Registers a callback run when the component is destroyed; runs it now if it already was.
    pub fn on_destroy(&self, callback: impl FnOnce() + 'static) {
        if self.is_destroyed() {
            callback();
            return;
        }
        self.0.on_destroy.borrow_mut().push(Box::new(callback));
    }

    /// Returns `true` once [`destroy`](Self::destroy) has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Tears the instance down: stops the view, runs destroy callbacks,
    /// destroys the element injector and clears the host's content. Idempotent.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        self.0.view.destroy();
        self.0.guards.borrow_mut().clear();
        let callbacks = std::mem::take(&mut *self.0.on_destroy.borrow_mut());
        for callback in callbacks {
            callback();
        }
        self.0.injector.destroy();
        self.0.host.clear_content();
        tracing::debug!(component = self.0.descriptor.name(), "component destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use elementum_core::{MicrotaskQueue, Scope};
    use nami::SignalExt;
    use serde_json::json;

    struct Greeting {
        name: Binding<Value>,
    }

    impl Component for Greeting {
        fn descriptor() -> ComponentDescriptor {
            ComponentDescriptor::new("greeting")
                .input("name")
                .output("greeted")
                .method("greet")
                .method("later")
                .signal("draft")
                .readonly_signal("shout")
                .content_selectors(["*"])
        }

        fn create(cx: &mut ComponentContext) -> anyhow::Result<Self> {
            let name = cx.input("name")?;
            let greeted = cx.output("greeted")?;
            let draft = binding(json!(""));
            let shout = draft
                .clone()
                .map(|value: Value| json!(value.as_str().unwrap_or_default().to_uppercase()))
                .computed();
            cx.signal("draft", &draft)?;
            cx.computed("shout", shout)?;
            {
                let name = name.clone();
                cx.method("greet", move |args| {
                    let greeting = format!("hello {}", args.first().and_then(Value::as_str).unwrap_or("?"));
                    greeted.emit(json!(greeting));
                    Ok(name.get())
                })?;
            }
            cx.async_method("later", |_args| async { Ok(json!("done")) })?;
            Ok(Self { name })
        }

        fn render(&self) -> String {
            format!("<p>{}</p>", self.name.get().as_str().unwrap_or_default())
        }
    }

    fn create(host: &MemoryHost) -> (ComponentRef, Scheduler, MicrotaskQueue) {
        let microtasks = MicrotaskQueue::new();
        let scheduler = Scheduler::new(microtasks.clone());
        let component = ComponentRef::create(
            Rc::new(Greeting::descriptor()),
            &factory_of::<Greeting>(),
            Rc::new(host.clone()),
            Injector::new(Scope::Element, []),
            &scheduler,
            Vec::new(),
        )
        .expect("component");
        (component, scheduler, microtasks)
    }

    #[test]
    fn input_writes_render_on_next_turn() {
        let host = MemoryHost::new("x-greeting");
        let (component, _scheduler, microtasks) = create(&host);

        component.detect_changes();
        assert_eq!(host.content(), "<p></p>");

        assert!(component.set_input("name", json!("ada")));
        assert!(!component.set_input("name", json!("ada")));
        assert!(component.is_view_dirty());
        assert_eq!(host.render_count(), 1);

        microtasks.run_until_idle();
        assert_eq!(host.content(), "<p>ada</p>");
        assert_eq!(host.render_count(), 2);
    }

    #[test]
    fn signals_follow_their_kind() {
        let host = MemoryHost::new("x-greeting");
        let (component, _scheduler, _microtasks) = create(&host);

        component.set_signal("draft", json!("hey")).expect("writable");
        assert_eq!(component.signal_value("draft"), Some(json!("hey")));
        assert_eq!(component.signal_value("shout"), Some(json!("HEY")));
        assert!(matches!(
            component.set_signal("shout", json!("no")),
            Err(ElementError::ReadOnly(name)) if name == "shout"
        ));
    }

    #[test]
    fn methods_resolve_through_futures() {
        let host = MemoryHost::new("x-greeting");
        let (component, _scheduler, _microtasks) = create(&host);
        let heard = Rc::new(RefCell::new(Vec::new()));
        let subscription = {
            let heard = Rc::clone(&heard);
            component
                .outputs()
                .next()
                .map(|(_, output)| output.subscribe(move |value| heard.borrow_mut().push(value.clone())))
                .expect("declared output")
        };

        component.set_input("name", json!("ada"));
        let result = component
            .call("greet", vec![json!("bob")])
            .now_or_never()
            .expect("sync method settles immediately");
        assert_eq!(result.expect("greet"), json!("ada"));
        assert_eq!(&*heard.borrow(), &[json!("hello bob")]);

        let later = futures::executor::block_on(component.call("later", Vec::new()));
        assert_eq!(later.expect("later"), json!("done"));

        let missing = component.call("missing", Vec::new()).now_or_never();
        assert!(matches!(missing, Some(Err(ElementError::UnknownMethod(_)))));
        drop(subscription);
    }

    #[test]
    fn destroy_clears_host_and_runs_callbacks_once() {
        let host = MemoryHost::new("x-greeting");
        let (component, _scheduler, microtasks) = create(&host);
        component.detect_changes();
        let destroyed = Rc::new(Cell::new(0));
        {
            let destroyed = Rc::clone(&destroyed);
            component.on_destroy(move || destroyed.set(destroyed.get() + 1));
        }

        component.destroy();
        component.destroy();
        assert_eq!(destroyed.get(), 1);
        assert!(host.content().is_empty());
        assert!(component.injector().is_destroyed());

        component.set_input("name", json!("late"));
        microtasks.run_until_idle();
        assert_eq!(host.render_count(), 1);
    }

    #[test]
    fn undeclared_registrations_fail_creation() {
        struct Sloppy;

        impl Component for Sloppy {
            fn descriptor() -> ComponentDescriptor {
                ComponentDescriptor::new("sloppy")
            }

            fn create(cx: &mut ComponentContext) -> anyhow::Result<Self> {
                cx.method("nope", |_| Ok(Value::Null))?;
                Ok(Self)
            }

            fn render(&self) -> String {
                String::new()
            }
        }

        let scheduler = Scheduler::new(MicrotaskQueue::new());
        let injector = Injector::new(Scope::Element, []);
        let result = ComponentRef::create(
            Rc::new(Sloppy::descriptor()),
            &factory_of::<Sloppy>(),
            Rc::new(MemoryHost::new("x-sloppy")),
            injector.clone(),
            &scheduler,
            Vec::new(),
        );
        assert!(matches!(result, Err(ElementError::Create { .. })));
        assert!(injector.is_destroyed());
    }

    #[test]
    fn projected_slots_out_of_range_are_empty() {
        let cx = ComponentContext::new(
            Rc::new(Greeting::descriptor()),
            Injector::new(Scope::Element, []),
            vec![vec![ContentNode::text("a < b"), ContentNode::element("b").inner("bold")]],
        );
        assert_eq!(cx.projected(0).len(), 2);
        assert!(cx.projected(3).is_empty());
        assert_eq!(cx.projected_markup(0), "a &lt; b<b>bold</b>");
    }
}
