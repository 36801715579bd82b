//! The application scope and its synchronous bootstrap.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use elementum_core::{
    Injector, NotificationSource, Provider, Rejection, Scheduler, Scope, Service, SyncPromise,
    run_sync,
};

use crate::{
    component::ComponentRef,
    config::{ApplicationConfig, BootstrapListener},
    error::BootstrapError,
    platform::Platform,
};

/// Tracks work that keeps an application from being stable.
///
/// An inert tracker hands out guards that count nothing, so its application is
/// always stable. Element applications use the platform's inert tracker.
#[derive(Clone)]
pub struct PendingTasks(Rc<PendingInner>);

struct PendingInner {
    tracking: bool,
    count: Cell<usize>,
}

impl fmt::Debug for PendingTasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTasks")
            .field("tracking", &self.0.tracking)
            .field("pending", &self.0.count.get())
            .finish()
    }
}

impl Service for PendingTasks {}

impl PendingTasks {
    /// A tracker that counts pending tasks.
    #[must_use]
    pub fn tracking() -> Self {
        Self::with_tracking(true)
    }

    /// A tracker that ignores every task.
    #[must_use]
    pub fn inert() -> Self {
        Self::with_tracking(false)
    }

    fn with_tracking(tracking: bool) -> Self {
        Self(Rc::new(PendingInner {
            tracking,
            count: Cell::new(0),
        }))
    }

    /// Whether tasks are counted.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.0.tracking
    }

    /// Registers a pending task, finished when the guard drops.
    pub fn add(&self) -> PendingTask {
        if !self.0.tracking {
            return PendingTask(None);
        }
        self.0.count.set(self.0.count.get() + 1);
        PendingTask(Some(Rc::clone(&self.0)))
    }

    /// Returns `true` while a counted task is running.
    #[must_use]
    pub fn has_pending_tasks(&self) -> bool {
        self.0.count.get() > 0
    }
}

/// Guard of one pending task.
#[must_use = "the task finishes when the guard is dropped"]
pub struct PendingTask(Option<Rc<PendingInner>>);

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PendingTask").field(&self.0.is_some()).finish()
    }
}

impl Drop for PendingTask {
    fn drop(&mut self) {
        if let Some(inner) = self.0.take() {
            inner.count.set(inner.count.get().saturating_sub(1));
        }
    }
}

/// A bootstrapped application: an injector below the platform plus the
/// components attached to it.
#[derive(Clone)]
pub struct Application(Rc<ApplicationInner>);

struct ApplicationInner {
    platform: Platform,
    injector: Injector,
    bootstrap_listeners: Vec<BootstrapListener>,
    components: RefCell<Vec<ComponentRef>>,
    on_destroy: RefCell<Vec<Box<dyn FnOnce()>>>,
    destroyed: Cell<bool>,
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("platform", &self.0.platform.name())
            .field("components", &self.0.components.borrow().len())
            .field("destroyed", &self.0.destroyed.get())
            .finish_non_exhaustive()
    }
}

impl Application {
    /// Builds an application on `platform`, running every initializer to
    /// completion before returning.
    ///
    /// # Errors
    ///
    /// - [`BootstrapError::PlatformDestroyed`] if the platform is gone.
    /// - [`BootstrapError::WouldSuspend`] if an initializer cannot finish without suspending.
    /// - [`BootstrapError::Initializer`] if an initializer fails.
    pub fn bootstrap_sync(platform: &Platform, config: ApplicationConfig) -> Result<Self, BootstrapError> {
        if platform.is_destroyed() {
            return Err(BootstrapError::PlatformDestroyed);
        }

        let mut providers = config.providers().to_vec();
        if config.tracks_stability() {
            providers.push(Provider::value(PendingTasks::tracking()));
        }
        let injector = platform.injector().child(Scope::Application, providers);

        let initializers = config
            .initializers()
            .iter()
            .map(|initializer| {
                let run = initializer(&injector);
                SyncPromise::from_future(async move { run.await.map_err(Rejection::from) })
            })
            .collect();

        let application = Self(Rc::new(ApplicationInner {
            platform: platform.clone(),
            injector: injector.clone(),
            bootstrap_listeners: config.bootstrap_listeners().to_vec(),
            components: RefCell::new(Vec::new()),
            on_destroy: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
        }));

        let created = {
            let application = application.clone();
            SyncPromise::all(initializers).then(move |_| Ok(application))
        };
        let application = match run_sync(created) {
            Ok(Ok(application)) => application,
            Ok(Err(reason)) => {
                injector.destroy();
                tracing::warn!(%reason, "application initializer failed");
                return Err(BootstrapError::Initializer(reason));
            }
            Err(_) => {
                injector.destroy();
                tracing::error!("application could not be bootstrapped synchronously");
                return Err(BootstrapError::WouldSuspend);
            }
        };

        if platform.is_destroyed() {
            injector.destroy();
            return Err(BootstrapError::PlatformDestroyed);
        }
        let weak = Rc::downgrade(&application.0);
        platform.on_destroy(move || {
            if let Some(inner) = Weak::upgrade(&weak) {
                Self(inner).destroy();
            }
        });
        tracing::debug!(platform = platform.name(), "application bootstrapped");
        Ok(application)
    }

    /// The platform the application lives on.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.0.platform
    }

    /// The application injector.
    #[must_use]
    pub fn injector(&self) -> &Injector {
        &self.0.injector
    }

    /// The platform scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        self.0.platform.scheduler()
    }

    /// Returns `true` when no tracked task is pending.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.0
            .injector
            .get::<PendingTasks>()
            .map_or(true, |pending| !pending.has_pending_tasks())
    }

    /// Components currently attached.
    #[must_use]
    pub fn components(&self) -> Vec<ComponentRef> {
        self.0.components.borrow().clone()
    }

    /// Attaches a component so it is destroyed with the application.
    pub fn attach(&self, component: &ComponentRef) {
        self.0.components.borrow_mut().push(component.clone());
        self.scheduler().notify(NotificationSource::ViewAttached);
    }

    /// Detaches a component.
    pub fn detach(&self, component: &ComponentRef) {
        self.0
            .components
            .borrow_mut()
            .retain(|attached| !attached.ptr_eq(component));
    }

    /// Runs the bootstrap listeners for a freshly rendered component.
    pub fn notify_bootstrapped(&self, component: &ComponentRef) {
        for listener in &self.0.bootstrap_listeners {
            listener(component);
        }
    }

    /// Registers a teardown callback; runs it now if the application is already destroyed.
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

    /// Returns `true` if both handles point at the same application.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Destroys every attached component, runs the teardown callbacks and
    /// destroys the injector. Idempotent.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        let components = std::mem::take(&mut *self.0.components.borrow_mut());
        for component in components {
            component.destroy();
        }
        let callbacks = std::mem::take(&mut *self.0.on_destroy.borrow_mut());
        for callback in callbacks {
            callback();
        }
        self.0.injector.destroy();
        tracing::debug!(platform = self.0.platform.name(), "application destroyed");
    }
}
