//! Hierarchical, scoped dependency injection.
//!
//! Injectors form a tree with three tiers, see [`Scope`]. A service is looked up
//! first among explicit [`Provider`]s, nearest injector first; failing that, a
//! [`Service`] with a `PROVIDED_IN` scope is created in the nearest ancestor of
//! that scope. Instances are cached in the injector that created them, so a
//! platform service is shared by everything below the platform while an
//! application service is private to its application.

use std::{
    any::{Any, TypeId, type_name},
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::Rc,
};

/// Tier of an [`Injector`] in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One per page; outlives every element and application.
    Platform,
    /// One per bootstrapped application configuration.
    Application,
    /// One per live component instance.
    Element,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Platform => "platform",
            Self::Application => "application",
            Self::Element => "element",
        })
    }
}

/// Errors produced while resolving a service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InjectError {
    /// Nothing provides the service.
    #[error("no provider for `{0}`")]
    NoProvider(&'static str),
    /// The service is provided in a scope the requesting injector is not part of.
    #[error("`{service}` is provided in the {scope} scope, which is not reachable from here")]
    OutOfScope {
        /// Service type name.
        service: &'static str,
        /// Scope the service is provided in.
        scope: Scope,
    },
    /// The service depends on itself.
    #[error("cyclic dependency while creating `{0}`")]
    Cyclic(&'static str),
    /// The injector has been destroyed.
    #[error("{0} injector has already been destroyed")]
    Destroyed(Scope),
    /// A factory failed.
    #[error("failed to create `{service}`: {message}")]
    Failed {
        /// Service type name.
        service: &'static str,
        /// Failure description.
        message: String,
    },
}

impl InjectError {
    /// Builds a [`InjectError::Failed`] for service `T`.
    pub fn failed<T: ?Sized>(message: impl fmt::Display) -> Self {
        Self::Failed {
            service: type_name::<T>(),
            message: message.to_string(),
        }
    }
}

/// A type that can be resolved from an [`Injector`].
///
/// Types with a `PROVIDED_IN` scope are created on demand in that scope. Types
/// without one must be registered through a [`Provider`].
pub trait Service: Sized + 'static {
    /// Scope that owns the service when no explicit provider exists.
    const PROVIDED_IN: Option<Scope> = None;

    /// Creates the service. `injector` is the injector that will own it.
    ///
    /// # Errors
    ///
    /// The default implementation reports a missing provider.
    fn create(injector: &Injector) -> Result<Self, InjectError> {
        let _ = injector;
        Err(InjectError::NoProvider(type_name::<Self>()))
    }
}

type Factory = Rc<dyn Fn(&Injector) -> Result<Rc<dyn Any>, InjectError>>;

/// An explicit registration of a service in an injector.
#[derive(Clone)]
pub struct Provider {
    type_id: TypeId,
    type_name: &'static str,
    factory: Factory,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Provider").field(&self.type_name).finish()
    }
}

impl Provider {
    /// Provides `T` through its own [`Service::create`] in the injector it is registered in.
    #[must_use]
    pub fn service<T: Service>() -> Self {
        Self::factory::<T>(T::create)
    }

    /// Provides `T` through `factory`, run at most once per owning injector.
    pub fn factory<T: 'static>(factory: impl Fn(&Injector) -> Result<T, InjectError> + 'static) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            factory: Rc::new(move |injector| factory(injector).map(|value| Rc::new(value) as Rc<dyn Any>)),
        }
    }

    /// Provides a ready-made value.
    pub fn value<T: Clone + 'static>(value: T) -> Self {
        Self::factory::<T>(move |_| Ok(value.clone()))
    }

    /// Type name of the provided service.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Shared handle to one node of the injector tree.
#[derive(Clone)]
pub struct Injector(Rc<InjectorInner>);

struct InjectorInner {
    scope: Scope,
    parent: Option<Injector>,
    providers: HashMap<TypeId, Provider>,
    instances: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
    resolving: RefCell<Vec<TypeId>>,
    on_destroy: RefCell<Vec<Box<dyn FnOnce()>>>,
    destroyed: Cell<bool>,
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("scope", &self.0.scope)
            .field("providers", &self.0.providers.len())
            .field("instances", &self.0.instances.borrow().len())
            .field("destroyed", &self.0.destroyed.get())
            .finish_non_exhaustive()
    }
}

impl Injector {
    /// Creates a root injector.
    pub fn new(scope: Scope, providers: impl IntoIterator<Item = Provider>) -> Self {
        Self::with_parent(scope, None, providers)
    }

    /// Creates a child injector.
    #[must_use]
    pub fn child(&self, scope: Scope, providers: impl IntoIterator<Item = Provider>) -> Self {
        Self::with_parent(scope, Some(self.clone()), providers)
    }

    fn with_parent(
        scope: Scope,
        parent: Option<Self>,
        providers: impl IntoIterator<Item = Provider>,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|provider| (provider.type_id, provider))
            .collect();
        Self(Rc::new(InjectorInner {
            scope,
            parent,
            providers,
            instances: RefCell::new(HashMap::new()),
            resolving: RefCell::new(Vec::new()),
            on_destroy: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
        }))
    }

    /// Tier of this injector.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.0.scope
    }

    /// Parent injector, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Self> {
        self.0.parent.as_ref()
    }

    /// Returns `true` once [`destroy`](Self::destroy) has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Returns `true` if both handles point at the same injector.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Nearest injector of the given tier, starting with this one.
    #[must_use]
    pub fn ancestor(&self, scope: Scope) -> Option<&Self> {
        let mut current = Some(self);
        while let Some(injector) = current {
            if injector.0.scope == scope {
                return Some(injector);
            }
            current = injector.parent();
        }
        None
    }

    /// Resolves `T`.
    ///
    /// # Errors
    ///
    /// Fails if nothing provides `T`, if `T` lives in a scope above this
    /// injector's reach, if `T` depends on itself, if the owning injector was
    /// destroyed, or if its factory fails.
    pub fn get<T: Service>(&self) -> Result<Rc<T>, InjectError> {
        if self.is_destroyed() {
            return Err(InjectError::Destroyed(self.0.scope));
        }

        let type_id = TypeId::of::<T>();
        let mut current = Some(self);
        while let Some(injector) = current {
            if let Some(provider) = injector.0.providers.get(&type_id) {
                let factory = Rc::clone(&provider.factory);
                return injector.instantiate::<T>(|owner| factory(owner));
            }
            current = injector.parent();
        }

        let Some(scope) = T::PROVIDED_IN else {
            return Err(InjectError::NoProvider(type_name::<T>()));
        };
        let owner = self.ancestor(scope).ok_or(InjectError::OutOfScope {
            service: type_name::<T>(),
            scope,
        })?;
        owner.instantiate::<T>(|owner| T::create(owner).map(|value| Rc::new(value) as Rc<dyn Any>))
    }

    /// Registers a callback run when this injector is destroyed. If it already
    /// was, the callback runs immediately.
    pub fn on_destroy(&self, callback: impl FnOnce() + 'static) {
        if self.is_destroyed() {
            callback();
            return;
        }
        self.0.on_destroy.borrow_mut().push(Box::new(callback));
    }

    /// Runs the destroy callbacks in registration order and drops every cached
    /// instance. Idempotent.
    pub fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        tracing::trace!(scope = %self.0.scope, "destroying injector");
        loop {
            let callbacks = std::mem::take(&mut *self.0.on_destroy.borrow_mut());
            if callbacks.is_empty() {
                break;
            }
            for callback in callbacks {
                callback();
            }
        }
        let instances = std::mem::take(&mut *self.0.instances.borrow_mut());
        drop(instances);
    }

    fn instantiate<T: 'static>(
        &self,
        create: impl FnOnce(&Self) -> Result<Rc<dyn Any>, InjectError>,
    ) -> Result<Rc<T>, InjectError> {
        if self.is_destroyed() {
            return Err(InjectError::Destroyed(self.0.scope));
        }
        let type_id = TypeId::of::<T>();
        let cached = self.0.instances.borrow().get(&type_id).cloned();
        if let Some(instance) = cached {
            return downcast::<T>(instance);
        }

        if self.0.resolving.borrow().contains(&type_id) {
            return Err(InjectError::Cyclic(type_name::<T>()));
        }
        self.0.resolving.borrow_mut().push(type_id);
        let created = create(self);
        self.0.resolving.borrow_mut().retain(|id| *id != type_id);

        let instance = created?;
        self.0
            .instances
            .borrow_mut()
            .insert(type_id, Rc::clone(&instance));
        downcast::<T>(instance)
    }
}

fn downcast<T: 'static>(instance: Rc<dyn Any>) -> Result<Rc<T>, InjectError> {
    instance
        .downcast::<T>()
        .map_err(|_| InjectError::failed::<T>("provider produced a value of another type"))
}

#[cfg(test)]
mod tests {
    use super::*;

    thread_local! {
        static CREATED: Cell<u32> = const { Cell::new(0) };
    }

    fn next_index() -> u32 {
        CREATED.with(|created| {
            created.set(created.get() + 1);
            created.get()
        })
    }

    #[derive(Debug)]
    struct PlatformService(u32);

    impl Service for PlatformService {
        const PROVIDED_IN: Option<Scope> = Some(Scope::Platform);

        fn create(_injector: &Injector) -> Result<Self, InjectError> {
            Ok(Self(next_index()))
        }
    }

    #[derive(Debug)]
    struct RootService(u32);

    impl Service for RootService {
        const PROVIDED_IN: Option<Scope> = Some(Scope::Application);

        fn create(_injector: &Injector) -> Result<Self, InjectError> {
            Ok(Self(next_index()))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Token(&'static str);

    impl Service for Token {}

    #[derive(Debug)]
    struct Loop;

    impl Service for Loop {
        const PROVIDED_IN: Option<Scope> = Some(Scope::Application);

        fn create(injector: &Injector) -> Result<Self, InjectError> {
            injector.get::<Self>().map(|_| Self)
        }
    }

    #[test]
    fn platform_services_are_shared() {
        let platform = Injector::new(Scope::Platform, []);
        let first = platform.child(Scope::Application, []);
        let second = platform.child(Scope::Application, []);

        let a = first.get::<PlatformService>().expect("platform service");
        let b = second.get::<PlatformService>().expect("platform service");
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn application_services_are_per_application() {
        let platform = Injector::new(Scope::Platform, []);
        let first = platform.child(Scope::Application, []);
        let second = platform.child(Scope::Application, []);

        let a = first.get::<RootService>().expect("root service");
        let b = second.get::<RootService>().expect("root service");
        assert!(!Rc::ptr_eq(&a, &b));
        assert_ne!(a.0, b.0);

        let element = first.child(Scope::Element, []);
        let c = element.get::<RootService>().expect("root service");
        assert!(Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn explicit_providers_win_and_shadow() {
        let platform = Injector::new(Scope::Platform, [Provider::value(Token("platform"))]);
        let application = platform.child(Scope::Application, [Provider::value(Token("app"))]);
        let bare = platform.child(Scope::Application, []);

        assert_eq!(*application.get::<Token>().expect("token"), Token("app"));
        assert_eq!(*bare.get::<Token>().expect("token"), Token("platform"));
    }

    #[test]
    fn reports_missing_and_unreachable_services() {
        let platform = Injector::new(Scope::Platform, []);
        assert_eq!(
            platform.get::<Token>().unwrap_err(),
            InjectError::NoProvider(type_name::<Token>())
        );
        assert!(matches!(
            platform.get::<RootService>(),
            Err(InjectError::OutOfScope { scope: Scope::Application, .. })
        ));
    }

    #[test]
    fn detects_cycles() {
        let application = Injector::new(Scope::Application, []);
        assert_eq!(
            application.get::<Loop>().unwrap_err(),
            InjectError::Cyclic(type_name::<Loop>())
        );
    }

    #[test]
    fn destroy_is_idempotent_and_runs_callbacks_once() {
        let injector = Injector::new(Scope::Application, []);
        let runs = Rc::new(Cell::new(0));
        {
            let runs = Rc::clone(&runs);
            injector.on_destroy(move || runs.set(runs.get() + 1));
        }
        injector.destroy();
        injector.destroy();
        assert_eq!(runs.get(), 1);
        assert_eq!(
            injector.get::<RootService>().unwrap_err(),
            InjectError::Destroyed(Scope::Application)
        );

        let late = Rc::new(Cell::new(false));
        {
            let late = Rc::clone(&late);
            injector.on_destroy(move || late.set(true));
        }
        assert!(late.get());
    }
}
