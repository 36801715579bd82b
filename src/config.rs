//! Configuration for platforms, applications and element definitions.

use std::{fmt, rc::Rc};

use elementum_core::{InjectError, Injector, Provider};
use futures::{FutureExt, future::LocalBoxFuture};

use crate::component::ComponentRef;

/// Name of the platform created when none was requested explicitly.
pub const DEFAULT_PLATFORM: &str = "elementum";

/// Identity and root providers of a platform.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    name: String,
    providers: Vec<Provider>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PLATFORM)
    }
}

impl PlatformConfig {
    /// Creates a configuration with the given identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            providers: Vec::new(),
        }
    }

    /// Adds a platform-scoped provider.
    #[must_use]
    pub fn provide(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Identity of the platform.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Platform-scoped providers.
    #[must_use]
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }
}

/// An asynchronous application initializer.
pub type Initializer = Rc<dyn Fn(&Injector) -> LocalBoxFuture<'static, anyhow::Result<()>>>;

/// Called with every component right after its first render.
pub type BootstrapListener = Rc<dyn Fn(&ComponentRef)>;

/// Providers and policies of one application.
#[derive(Clone, Default)]
pub struct ApplicationConfig {
    providers: Vec<Provider>,
    initializers: Vec<Initializer>,
    bootstrap_listeners: Vec<BootstrapListener>,
    stability_tracking: Option<bool>,
}

impl fmt::Debug for ApplicationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationConfig")
            .field("providers", &self.providers)
            .field("initializers", &self.initializers.len())
            .field("bootstrap_listeners", &self.bootstrap_listeners.len())
            .field("stability_tracking", &self.stability_tracking)
            .finish()
    }
}

impl ApplicationConfig {
    /// An empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider.
    #[must_use]
    pub fn provide(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Provides `T` through `factory`, once per application.
    #[must_use]
    pub fn provide_factory<T: 'static>(
        self,
        factory: impl Fn(&Injector) -> Result<T, InjectError> + 'static,
    ) -> Self {
        self.provide(Provider::factory(factory))
    }

    /// Provides a ready-made value.
    #[must_use]
    pub fn provide_value<T: Clone + 'static>(self, value: T) -> Self {
        self.provide(Provider::value(value))
    }

    /// Adds an initializer, run during bootstrap with the application injector.
    #[must_use]
    pub fn initializer<F>(mut self, initializer: impl Fn(&Injector) -> F + 'static) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.initializers
            .push(Rc::new(move |injector| initializer(injector).boxed_local()));
        self
    }

    /// Adds a bootstrap listener.
    #[must_use]
    pub fn on_bootstrap(mut self, listener: impl Fn(&ComponentRef) + 'static) -> Self {
        self.bootstrap_listeners.push(Rc::new(listener));
        self
    }

    /// Enables or disables tracking of pending tasks for stability.
    #[must_use]
    pub const fn stability_tracking(mut self, enabled: bool) -> Self {
        self.stability_tracking = Some(enabled);
        self
    }

    /// Combines two configurations. Lists are concatenated, `self` first;
    /// policies set on `other` win.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.providers.extend(other.providers);
        self.initializers.extend(other.initializers);
        self.bootstrap_listeners.extend(other.bootstrap_listeners);
        self.stability_tracking = other.stability_tracking.or(self.stability_tracking);
        self
    }

    /// Providers in registration order.
    #[must_use]
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// Initializers in registration order.
    #[must_use]
    pub fn initializers(&self) -> &[Initializer] {
        &self.initializers
    }

    /// Bootstrap listeners in registration order.
    #[must_use]
    pub fn bootstrap_listeners(&self) -> &[BootstrapListener] {
        &self.bootstrap_listeners
    }

    /// Whether pending tasks are tracked. Defaults to `true`.
    #[must_use]
    pub fn tracks_stability(&self) -> bool {
        self.stability_tracking.unwrap_or(true)
    }
}

/// Where an element definition gets its application configuration from.
#[derive(Clone)]
pub enum ApplicationSource {
    /// A fixed configuration.
    Static(ApplicationConfig),
    /// Computed with the platform injector each time an application is built.
    /// Needs a live platform.
    Factory(Rc<dyn Fn(&Injector) -> ApplicationConfig>),
}

impl fmt::Debug for ApplicationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(config) => f.debug_tuple("Static").field(config).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

impl From<ApplicationConfig> for ApplicationSource {
    fn from(config: ApplicationConfig) -> Self {
        Self::Static(config)
    }
}

/// How elements of one definition map onto applications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApplicationMode {
    /// Every element bootstraps its own application.
    #[default]
    PerElement,
    /// All elements of the definition share one application until it is destroyed.
    Shared,
}

/// Configuration of an element definition.
#[derive(Debug, Clone)]
pub struct ElementConfig {
    application: ApplicationSource,
    exposed_methods: Vec<String>,
    exposed_signals: Vec<String>,
    mode: ApplicationMode,
}

impl ElementConfig {
    /// Uses a fixed application configuration.
    #[must_use]
    pub fn new(application: ApplicationConfig) -> Self {
        Self::from_source(ApplicationSource::Static(application))
    }

    /// Computes the application configuration with the platform injector.
    pub fn from_factory(factory: impl Fn(&Injector) -> ApplicationConfig + 'static) -> Self {
        Self::from_source(ApplicationSource::Factory(Rc::new(factory)))
    }

    /// Uses the given source.
    #[must_use]
    pub const fn from_source(application: ApplicationSource) -> Self {
        Self {
            application,
            exposed_methods: Vec::new(),
            exposed_signals: Vec::new(),
            mode: ApplicationMode::PerElement,
        }
    }

    /// Exposes component methods on the element.
    #[must_use]
    pub fn expose_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exposed_methods.extend(methods.into_iter().map(Into::into));
        self
    }

    /// Exposes component signals on the element.
    #[must_use]
    pub fn expose_signals<I, S>(mut self, signals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exposed_signals.extend(signals.into_iter().map(Into::into));
        self
    }

    /// Selects how elements map onto applications.
    #[must_use]
    pub const fn mode(mut self, mode: ApplicationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Application source.
    #[must_use]
    pub const fn application(&self) -> &ApplicationSource {
        &self.application
    }

    /// Requested methods, as given.
    #[must_use]
    pub fn exposed_methods(&self) -> &[String] {
        &self.exposed_methods
    }

    /// Requested signals, as given.
    #[must_use]
    pub fn exposed_signals(&self) -> &[String] {
        &self.exposed_signals
    }

    /// Application mode.
    #[must_use]
    pub const fn application_mode(&self) -> ApplicationMode {
        self.mode
    }
}
