//! The platform scope and the runtime that owns it.
//!
//! A [`Runtime`] is the explicit, page-wide registry: it owns the microtask
//! queue, at most one live [`Platform`], and the [`PlatformListeners`] that
//! elements use to wait for a platform to appear. Destroying a platform
//! destroys the applications it owns; creating a new one notifies every
//! waiting element.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt,
    rc::{Rc, Weak},
};

use elementum_core::{Injector, MicrotaskQueue, Provider, Scheduler, Scope};

use crate::{
    application::PendingTasks,
    config::PlatformConfig,
    error::PlatformError,
};

/// Key under which a platform listener is registered.
pub type ListenerKey = u64;

/// Callbacks waiting for the next platform to be created.
///
/// Registration is keyed, so registering the same key twice keeps one
/// callback. Notifying drains the registry: each callback runs at most once
/// per registration.
#[derive(Clone, Default)]
pub struct PlatformListeners(Rc<ListenersInner>);

#[derive(Default)]
struct ListenersInner {
    callbacks: RefCell<BTreeMap<ListenerKey, Rc<dyn Fn()>>>,
    next_key: Cell<ListenerKey>,
}

impl fmt::Debug for PlatformListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformListeners")
            .field("registered", &self.len())
            .finish()
    }
}

impl PlatformListeners {
    /// Reserves a fresh key.
    #[must_use]
    pub fn next_key(&self) -> ListenerKey {
        let key = self.0.next_key.get();
        self.0.next_key.set(key + 1);
        key
    }

    /// Registers `callback` under `key`, replacing any earlier one.
    pub fn register(&self, key: ListenerKey, callback: impl Fn() + 'static) {
        self.0.callbacks.borrow_mut().insert(key, Rc::new(callback));
    }

    /// Removes the callback registered under `key`.
    pub fn unregister(&self, key: ListenerKey) {
        self.0.callbacks.borrow_mut().remove(&key);
    }

    /// Returns `true` if a callback is registered under `key`.
    #[must_use]
    pub fn is_registered(&self, key: ListenerKey) -> bool {
        self.0.callbacks.borrow().contains_key(&key)
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.callbacks.borrow().len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.callbacks.borrow().is_empty()
    }

    /// Drains the registry and runs every callback in key order.
    ///
    /// Callbacks may register again; those registrations wait for the next notification.
    pub fn notify_all(&self) {
        let callbacks = std::mem::take(&mut *self.0.callbacks.borrow_mut());
        if !callbacks.is_empty() {
            tracing::debug!(count = callbacks.len(), "notifying platform listeners");
        }
        for callback in callbacks.into_values() {
            callback();
        }
    }
}

/// Page-wide owner of the microtask queue and the current platform.
#[derive(Clone)]
pub struct Runtime(Rc<RuntimeInner>);

struct RuntimeInner {
    microtasks: MicrotaskQueue,
    platform: RefCell<Option<Platform>>,
    listeners: PlatformListeners,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("microtasks", &self.0.microtasks)
            .field("platform", &self.0.platform.borrow())
            .field("listeners", &self.0.listeners)
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Creates a runtime with an undriven microtask queue.
    #[must_use]
    pub fn new() -> Self {
        Self::with_microtasks(MicrotaskQueue::new())
    }

    /// Creates a runtime over an existing microtask queue.
    #[must_use]
    pub fn with_microtasks(microtasks: MicrotaskQueue) -> Self {
        Self(Rc::new(RuntimeInner {
            microtasks,
            platform: RefCell::new(None),
            listeners: PlatformListeners::default(),
        }))
    }

    /// The microtask queue every deferred action goes through.
    #[must_use]
    pub fn microtasks(&self) -> &MicrotaskQueue {
        &self.0.microtasks
    }

    /// Elements waiting for a platform.
    #[must_use]
    pub fn listeners(&self) -> &PlatformListeners {
        &self.0.listeners
    }

    /// The live platform, if any.
    #[must_use]
    pub fn platform(&self) -> Option<Platform> {
        self.0
            .platform
            .borrow()
            .as_ref()
            .filter(|platform| !platform.is_destroyed())
            .cloned()
    }

    /// Returns the live platform or creates the default one.
    pub fn platform_or_create(&self) -> Platform {
        if let Some(platform) = self.platform() {
            return platform;
        }
        self.install(PlatformConfig::default())
    }

    /// Returns the live platform if it has the requested identity, or creates one.
    ///
    /// # Errors
    ///
    /// [`PlatformError::Mismatch`] if a platform with another name is alive.
    pub fn create_platform(&self, config: PlatformConfig) -> Result<Platform, PlatformError> {
        if let Some(platform) = self.platform() {
            if platform.name() == config.name() {
                return Ok(platform);
            }
            return Err(PlatformError::Mismatch {
                existing: platform.name().to_owned(),
                requested: config.name().to_owned(),
            });
        }
        Ok(self.install(config))
    }

    fn install(&self, config: PlatformConfig) -> Platform {
        let platform = Platform::new(self, config);
        *self.0.platform.borrow_mut() = Some(platform.clone());
        tracing::debug!(platform = platform.name(), "platform created");
        self.0.listeners.notify_all();
        platform
    }

    fn release(&self, platform: &Platform) {
        let mut slot = self.0.platform.borrow_mut();
        if slot.as_ref().is_some_and(|current| current.ptr_eq(platform)) {
            *slot = None;
        }
    }
}

/// The outermost scope: one per page, shared by every element.
#[derive(Clone)]
pub struct Platform(Rc<PlatformInner>);

struct PlatformInner {
    name: String,
    runtime: Weak<RuntimeInner>,
    injector: Injector,
    scheduler: Scheduler,
    on_destroy: RefCell<Vec<Box<dyn FnOnce()>>>,
    destroyed: Cell<bool>,
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("name", &self.0.name)
            .field("destroyed", &self.0.destroyed.get())
            .finish_non_exhaustive()
    }
}

impl Platform {
    fn new(runtime: &Runtime, config: PlatformConfig) -> Self {
        let scheduler = Scheduler::new(runtime.microtasks().clone());
        let providers = config
            .providers()
            .iter()
            .cloned()
            .chain([
                Provider::value(scheduler.clone()),
                Provider::value(PendingTasks::inert()),
            ]);
        let injector = Injector::new(Scope::Platform, providers);
        let platform = Self(Rc::new(PlatformInner {
            name: config.name().to_owned(),
            runtime: Rc::downgrade(&runtime.0),
            injector,
            scheduler,
            on_destroy: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
        }));
        let weak = Rc::downgrade(&platform.0);
        platform.0.injector.on_destroy(move || {
            if let Some(inner) = weak.upgrade() {
                Self(inner).destroy();
            }
        });
        platform
    }

    /// Identity of the platform.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The platform injector.
    #[must_use]
    pub fn injector(&self) -> &Injector {
        &self.0.injector
    }

    /// The platform scheduler pair, shared by every application.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.0.scheduler
    }

    /// Registers a teardown callback; runs it now if the platform is already destroyed.
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

    /// Returns `true` if both handles point at the same platform.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Runs every teardown callback once, destroys the platform injector and
    /// releases the runtime slot. Re-entrant and repeated calls are no-ops.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        tracing::debug!(platform = self.name(), "destroying platform");
        loop {
            let callbacks = std::mem::take(&mut *self.0.on_destroy.borrow_mut());
            if callbacks.is_empty() {
                break;
            }
            for callback in callbacks {
                callback();
            }
        }
        self.0.injector.destroy();
        if let Some(runtime) = self.0.runtime.upgrade() {
            Runtime(runtime).release(self);
        }
    }
}
