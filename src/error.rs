//! Error types surfaced by the element bridge.

use elementum_core::{InjectError, Rejection};

/// Failures visible to callers of a custom element's surface.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ElementError {
    /// An exposed method was called while the element is not in the document.
    #[error("Component is detached from DOM")]
    Detached,
    /// An exposed method was called while no strategy exists yet.
    #[error("Component is not initialized")]
    NotInitialized,
    /// The name is neither a declared input nor an exposed signal.
    #[error("`{0}` is not an input or signal of the component")]
    UnknownProperty(String),
    /// The component declares the method but never registered a handler for it.
    #[error("`{0}` is not a method of the component")]
    UnknownMethod(String),
    /// Attempt to write a read-only signal.
    #[error("signal `{0}` is read-only")]
    ReadOnly(String),
    /// The component factory failed.
    #[error("failed to create component `{component}`")]
    Create {
        /// Component name.
        component: String,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },
    /// An exposed method returned an error.
    #[error("method `{name}` failed: {reason}")]
    Method {
        /// Method name.
        name: String,
        /// Underlying failure.
        reason: Rejection,
    },
    /// The application backing the element could not be built.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// A service could not be resolved.
    #[error(transparent)]
    Inject(#[from] InjectError),
}

/// Invalid element definitions, reported when the element class is defined.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DefinitionError {
    /// An exposed method is not declared by the component.
    #[error("Cannot expose method \"{0}\" because it is not a function of the component.")]
    UnknownMethod(String),
    /// A signal was offered as a method.
    #[error("Cannot expose signal \"{0}\" as a method.")]
    SignalAsMethod(String),
    /// An exposed signal is not declared by the component.
    #[error("Cannot expose signal \"{0}\" because it is not a signal of the component.")]
    UnknownSignal(String),
    /// Two inputs map to the same attribute.
    #[error("inputs `{first}` and `{second}` both map to attribute `{attribute}`")]
    DuplicateAttribute {
        /// Attribute name.
        attribute: String,
        /// First input.
        first: String,
        /// Second input.
        second: String,
    },
}

/// Failures of synchronous application construction.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BootstrapError {
    /// An initializer needed to suspend.
    #[error("ApplicationRef is not initialized: an application initializer could not complete synchronously")]
    WouldSuspend,
    /// An initializer failed.
    #[error("application initializer failed: {0}")]
    Initializer(Rejection),
    /// The platform was destroyed before or during construction.
    #[error("platform has been destroyed")]
    PlatformDestroyed,
    /// A service the application needs could not be resolved.
    #[error(transparent)]
    Inject(#[from] InjectError),
}

/// Failures while looking up or creating a platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PlatformError {
    /// A platform with another configuration is alive.
    #[error("a platform named `{existing}` already exists; destroy it before creating `{requested}`")]
    Mismatch {
        /// Name of the live platform.
        existing: String,
        /// Name that was requested.
        requested: String,
    },
}
