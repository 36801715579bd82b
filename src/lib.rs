#![doc = include_str!("../README.md")]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::future_not_send)]

pub mod application;
pub mod component;
pub mod config;
pub mod descriptor;
pub mod element;
/// Error types for definitions, bootstrap and element calls.
pub mod error;
pub mod host;
pub mod logging;
pub mod names;
pub mod platform;
pub mod strategy;

pub mod prelude {
    //! A collection of commonly used traits and types for easy importing.
    //!
    //! ```rust
    //! use elementum::prelude::*;
    //!
    //! let runtime = Runtime::new();
    //! assert!(runtime.platform().is_none());
    //! ```
    pub use super::{
        application::Application,
        component::{ChangeDetector, Component, ComponentContext, ComponentRef, Output},
        config::{ApplicationConfig, ApplicationMode, ElementConfig, PlatformConfig},
        descriptor::{ComponentDescriptor, InputDescriptor, OutputDescriptor},
        element::{CustomElement, ElementDefinition},
        error::{BootstrapError, DefinitionError, ElementError},
        host::{ContentNode, ElementEvent, HostElement, MemoryHost},
        platform::{Platform, Runtime},
    };
    pub use elementum_core::{Injector, Provider, Scope, Service};
    pub use nami::{Binding, Computed, Signal, SignalExt, binding};
}

#[doc(inline)]
pub use element::{CustomElement, ElementDefinition};
#[doc(inline)]
pub use elementum_core::{
    EffectRef, InjectError, Injector, MicrotaskQueue, NotificationSource, PromiseState,
    Provider, Rejection, Resolver, Scheduler, Scope, Service, SyncPromise, WatchedEffect,
    WouldSuspend, run_sync,
};
#[doc(inline)]
pub use platform::{Platform, Runtime};
#[doc(inline)]
pub use strategy::{ElementStrategy, StrategyState};
