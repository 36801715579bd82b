#![allow(clippy::future_not_send)]
#![allow(clippy::module_name_repetitions)]

//! Host-independent runtime primitives for Elementum.
//!
//! Everything here is single-threaded and cooperative:
//!
//! - [`microtask`]: the FIFO "end of turn" queue every deferred action goes through.
//! - [`scheduler`]: effect queue plus coalescing notification scheduler.
//! - [`sync`]: eager promises and the synchronous bootstrap primitive.
//! - [`injector`]: the platform / application / element service hierarchy.

pub mod injector;
pub mod microtask;
pub mod scheduler;
pub mod sync;

#[doc(inline)]
pub use injector::{InjectError, Injector, Provider, Scope, Service};
#[doc(inline)]
pub use microtask::MicrotaskQueue;
#[doc(inline)]
pub use scheduler::{EffectRef, NotificationSource, Scheduler, WatchedEffect};
#[doc(inline)]
pub use sync::{PromiseState, Rejection, Resolver, SyncPromise, WouldSuspend, run_sync};
