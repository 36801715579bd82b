//! The per-element controller that owns one component instance.
//!
//! An [`ElementStrategy`] creates its component on the first
//! [`connect`](ElementStrategy::connect), keeps input and signal writes in a
//! cache so that they survive until (and across) instances, re-dispatches
//! outputs as host events, and defers destruction by one microtask so that an
//! element moved within the document keeps its instance.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::Rc,
};

use elementum_core::{NotificationSource, Scope};
use futures::future::LocalBoxFuture;
use serde_json::Value;

use crate::{
    application::Application,
    component::{ComponentFactory, ComponentRef, Subscription},
    descriptor::ComponentDescriptor,
    error::ElementError,
    host::{ElementEvent, HostElement},
};

/// Lifecycle state of an [`ElementStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyState {
    /// No component instance.
    #[default]
    Detached,
    /// The component is being created.
    Connecting,
    /// The component is live.
    Connected,
    /// The element left the document; teardown runs on the next microtask
    /// unless it reconnects first.
    PendingDestroy,
}

/// Connect/disconnect state machine bound to one host element.
#[derive(Clone)]
pub struct ElementStrategy(Rc<StrategyInner>);

struct StrategyInner {
    descriptor: Rc<ComponentDescriptor>,
    factory: ComponentFactory,
    application: Application,
    component: RefCell<Option<ComponentRef>>,
    cache: RefCell<HashMap<String, Value>>,
    state: Cell<StrategyState>,
    pending_destroy: Cell<Option<u64>>,
    next_token: Cell<u64>,
}

impl fmt::Debug for ElementStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementStrategy")
            .field("component", &self.0.descriptor.name())
            .field("state", &self.0.state.get())
            .field("cached", &self.0.cache.borrow().len())
            .finish_non_exhaustive()
    }
}

impl ElementStrategy {
    /// Creates a detached strategy whose component will live in `application`.
    #[must_use]
    pub fn new(
        descriptor: Rc<ComponentDescriptor>,
        factory: ComponentFactory,
        application: Application,
    ) -> Self {
        Self(Rc::new(StrategyInner {
            descriptor,
            factory,
            application,
            component: RefCell::new(None),
            cache: RefCell::new(HashMap::new()),
            state: Cell::new(StrategyState::Detached),
            pending_destroy: Cell::new(None),
            next_token: Cell::new(0),
        }))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StrategyState {
        self.0.state.get()
    }

    /// The live component instance, if any.
    #[must_use]
    pub fn component(&self) -> Option<ComponentRef> {
        self.0.component.borrow().clone()
    }

    /// The application the component lives in.
    #[must_use]
    pub fn application(&self) -> &Application {
        &self.0.application
    }

    /// Binds the strategy to `host`.
    ///
    /// Cancels a pending teardown if there is one. Otherwise creates the
    /// component, applies cached values in declaration order, wires outputs to
    /// host events and renders once before returning.
    ///
    /// # Errors
    ///
    /// Fails if the element injector or the component cannot be created; the
    /// strategy stays detached.
    pub fn connect(&self, host: Rc<dyn HostElement>) -> Result<(), ElementError> {
        if self.0.pending_destroy.take().is_some() {
            tracing::trace!(component = self.0.descriptor.name(), "pending destroy cancelled");
            self.0.state.set(StrategyState::Connected);
            return Ok(());
        }
        if self.0.component.borrow().is_some() {
            return Ok(());
        }

        self.0.state.set(StrategyState::Connecting);
        match self.initialize(host) {
            Ok(()) => {
                self.0.state.set(StrategyState::Connected);
                Ok(())
            }
            Err(error) => {
                self.0.state.set(StrategyState::Detached);
                Err(error)
            }
        }
    }

    fn initialize(&self, host: Rc<dyn HostElement>) -> Result<(), ElementError> {
        let inner = &self.0;
        let application = &inner.application;
        let projected = host.project_content(inner.descriptor.selectors());
        let injector = application.injector().child(Scope::Element, []);
        let component = ComponentRef::create(
            Rc::clone(&inner.descriptor),
            &inner.factory,
            Rc::clone(&host),
            injector,
            application.scheduler(),
            projected,
        )?;

        self.apply_cached(&component);

        let subscriptions: Vec<Subscription> = component
            .outputs()
            .map(|(output, emitter)| {
                let host = Rc::clone(&host);
                let event = output.event_name();
                emitter.subscribe(move |value| host.dispatch_event(ElementEvent::new(event.clone(), value.clone())))
            })
            .collect();
        component.on_destroy(move || drop(subscriptions));

        *inner.component.borrow_mut() = Some(component.clone());
        application.attach(&component);
        component.detect_changes();
        application.notify_bootstrapped(&component);
        tracing::debug!(component = inner.descriptor.name(), "element connected");
        Ok(())
    }

    fn apply_cached(&self, component: &ComponentRef) {
        let cache = self.0.cache.borrow().clone();
        if cache.is_empty() {
            return;
        }
        for input in self.0.descriptor.inputs() {
            if let Some(value) = cache.get(input.property_name()) {
                component.set_input(input.property_name(), value.clone());
            }
        }
        for signal in self.0.descriptor.signals() {
            if let Some(value) = cache.get(signal.name()) {
                if let Err(error) = component.set_signal(signal.name(), value.clone()) {
                    tracing::warn!(signal = signal.name(), %error, "cached signal value not applied");
                }
            }
        }
    }

    /// Schedules teardown of the component on the next microtask.
    ///
    /// Does nothing without a component or while a teardown is already pending.
    pub fn disconnect(&self) {
        if self.0.component.borrow().is_none() || self.0.pending_destroy.get().is_some() {
            return;
        }
        let token = self.0.next_token.get();
        self.0.next_token.set(token + 1);
        self.0.pending_destroy.set(Some(token));
        self.0.state.set(StrategyState::PendingDestroy);

        let strategy = self.clone();
        self.0
            .application
            .scheduler()
            .microtasks()
            .queue(move || strategy.teardown(token));
    }

    fn teardown(&self, token: u64) {
        if self.0.pending_destroy.get() != Some(token) {
            return;
        }
        self.0.pending_destroy.set(None);
        let component = self.0.component.borrow_mut().take();
        if let Some(component) = component {
            self.0.application.detach(&component);
            component.destroy();
            tracing::debug!(component = self.0.descriptor.name(), "element destroyed");
        }
        self.0.state.set(StrategyState::Detached);
    }

    /// Reads an input or signal.
    ///
    /// Without a component this is the cached value. With one, the value comes
    /// from the instance; `None` means it cannot be read back (the input or
    /// signal transforms written values) and the caller should keep its own copy.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<Value> {
        let Some(component) = self.component() else {
            return self.0.cache.borrow().get(name).cloned();
        };
        if self.0.descriptor.find_input(name).is_some() {
            component.input_value(name)
        } else {
            component.signal_value(name)
        }
    }

    /// Writes an input or writable signal.
    ///
    /// The value is cached and, with a live component, forwarded to it. If the
    /// write left the view dirty, a tick is requested so that the change
    /// renders even outside a render pass.
    ///
    /// # Errors
    ///
    /// [`ElementError::UnknownProperty`] if `name` is neither an input nor a
    /// signal, [`ElementError::ReadOnly`] for read-only signals.
    pub fn set_value(&self, name: &str, value: Value) -> Result<(), ElementError> {
        let is_input = self.0.descriptor.find_input(name).is_some();
        if !is_input {
            match self.0.descriptor.find_signal(name) {
                None => return Err(ElementError::UnknownProperty(name.to_owned())),
                Some(signal) if !signal.is_writable() => {
                    return Err(ElementError::ReadOnly(name.to_owned()));
                }
                Some(_) => {}
            }
        }
        self.0.cache.borrow_mut().insert(name.to_owned(), value.clone());

        let Some(component) = self.component() else {
            return Ok(());
        };
        if is_input {
            component.set_input(name, value);
        } else {
            component.set_signal(name, value)?;
        }
        if component.is_view_dirty() {
            self.0
                .application
                .scheduler()
                .notify(NotificationSource::CustomElement);
        }
        Ok(())
    }

    /// Invokes a component method. The result is always delivered through the
    /// returned future.
    ///
    /// # Errors
    ///
    /// [`ElementError::Detached`] if there is no component instance.
    pub fn apply_method(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<LocalBoxFuture<'static, Result<Value, ElementError>>, ElementError> {
        let component = self.component().ok_or(ElementError::Detached)?;
        Ok(component.call(name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        component::{Component, ComponentContext, factory_of},
        config::ApplicationConfig,
        descriptor::InputDescriptor,
        host::{ContentNode, MemoryHost},
        platform::Runtime,
    };
    use futures::FutureExt;
    use nami::{Binding, SignalExt};
    use serde_json::json;

    thread_local! {
        static CREATED: Cell<usize> = const { Cell::new(0) };
    }

    struct Badge {
        index: usize,
        label: Binding<Value>,
        size: Binding<Value>,
        slot: String,
    }

    impl Component for Badge {
        fn descriptor() -> ComponentDescriptor {
            ComponentDescriptor::new("badge")
                .input("label")
                .input_with(
                    InputDescriptor::new("size")
                        .transform(|value| json!(value.as_str().map_or(0, str::len))),
                )
                .output("pressed")
                .method("press")
                .signal("tone")
                .readonly_signal("summary")
                .content_selectors(["*"])
        }

        fn create(cx: &mut ComponentContext) -> anyhow::Result<Self> {
            let index = CREATED.with(|created| {
                created.set(created.get() + 1);
                created.get()
            });
            let label = cx.input("label")?;
            let pressed = cx.output("pressed")?;
            let tone = nami::binding(json!("plain"));
            cx.signal("tone", &tone)?;
            let summary = label
                .clone()
                .map(|label: Value| json!(format!("[{label}]")))
                .computed();
            cx.computed("summary", summary)?;
            cx.method("press", move |args| {
                pressed.emit(args.first().cloned().unwrap_or(Value::Null));
                Ok(json!(index))
            })?;
            Ok(Self {
                index,
                label,
                size: cx.input("size")?,
                slot: cx.projected_markup(0),
            })
        }

        fn render(&self) -> String {
            format!(
                "{}:{}:{}{}",
                self.index,
                self.label.get().as_str().unwrap_or_default(),
                self.size.get(),
                self.slot
            )
        }
    }

    fn strategy(runtime: &Runtime) -> ElementStrategy {
        let platform = runtime.platform_or_create();
        let application = Application::bootstrap_sync(
            &platform,
            ApplicationConfig::new().stability_tracking(false),
        )
        .expect("bootstrap");
        ElementStrategy::new(Rc::new(Badge::descriptor()), factory_of::<Badge>(), application)
    }

    fn index_of(host: &MemoryHost) -> String {
        host.content().split(':').next().unwrap_or_default().to_owned()
    }

    #[test]
    fn cached_values_render_on_first_connect() {
        let runtime = Runtime::new();
        let strategy = strategy(&runtime);
        let host = MemoryHost::new("x-badge");
        host.append_child(ContentNode::element("b").inner("slot"));

        strategy.set_value("label", json!("hi")).expect("input");
        strategy.set_value("size", json!("abc")).expect("input");
        assert_eq!(strategy.value("label"), Some(json!("hi")));
        assert_eq!(strategy.state(), StrategyState::Detached);

        strategy.connect(Rc::new(host.clone())).expect("connect");
        assert_eq!(strategy.state(), StrategyState::Connected);
        assert!(host.content().ends_with(":hi:3<b>slot</b>"));
        assert_eq!(host.render_count(), 1);
        assert_eq!(strategy.value("size"), None);
        assert_eq!(strategy.value("summary"), Some(json!("[\"hi\"]")));

        runtime.microtasks().run_until_idle();
        assert_eq!(host.render_count(), 1);
    }

    #[test]
    fn reconnect_within_a_turn_keeps_the_instance() {
        let runtime = Runtime::new();
        let strategy = strategy(&runtime);
        let host = MemoryHost::new("x-badge");
        strategy.connect(Rc::new(host.clone())).expect("connect");
        let first = index_of(&host);

        strategy.disconnect();
        assert_eq!(strategy.state(), StrategyState::PendingDestroy);
        strategy.connect(Rc::new(host.clone())).expect("reconnect");
        runtime.microtasks().run_until_idle();
        assert_eq!(index_of(&host), first);
        assert!(strategy.component().is_some());

        strategy.disconnect();
        runtime.microtasks().run_until_idle();
        assert_eq!(strategy.state(), StrategyState::Detached);
        assert!(strategy.component().is_none());
        assert!(host.content().is_empty());
        assert!(strategy.application().components().is_empty());

        strategy.connect(Rc::new(host.clone())).expect("recreate");
        assert_ne!(index_of(&host), first);
    }

    #[test]
    fn writes_coalesce_into_one_render() {
        let runtime = Runtime::new();
        let strategy = strategy(&runtime);
        let host = MemoryHost::new("x-badge");
        strategy.connect(Rc::new(host.clone())).expect("connect");

        strategy.set_value("label", json!("a")).expect("input");
        strategy.set_value("label", json!("a")).expect("input");
        strategy.set_value("label", json!("b")).expect("input");
        assert_eq!(host.render_count(), 1);
        runtime.microtasks().run_until_idle();
        assert_eq!(host.render_count(), 2);
        assert!(host.content().contains(":b:"));
    }

    #[test]
    fn signals_and_unknown_names() {
        let runtime = Runtime::new();
        let strategy = strategy(&runtime);
        assert!(matches!(
            strategy.set_value("summary", json!("x")),
            Err(ElementError::ReadOnly(_))
        ));
        assert!(matches!(
            strategy.set_value("nope", json!(1)),
            Err(ElementError::UnknownProperty(_))
        ));

        strategy.set_value("tone", json!("loud")).expect("signal");
        strategy
            .connect(Rc::new(MemoryHost::new("x-badge")))
            .expect("connect");
        assert_eq!(strategy.value("tone"), Some(json!("loud")));
    }

    #[test]
    fn methods_and_outputs_need_a_component() {
        let runtime = Runtime::new();
        let strategy = strategy(&runtime);
        assert!(matches!(
            strategy.apply_method("press", Vec::new()),
            Err(ElementError::Detached)
        ));

        let host = MemoryHost::new("x-badge");
        strategy.connect(Rc::new(host.clone())).expect("connect");
        let result = strategy
            .apply_method("press", vec![json!(7)])
            .expect("connected")
            .now_or_never()
            .expect("settled");
        assert!(result.is_ok());
        assert_eq!(host.events(), vec![ElementEvent::new("pressed", json!(7))]);
    }
}
