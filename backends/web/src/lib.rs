#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Browser backend for Elementum.
//!
//! [`define`] registers a component type with `customElements.define`. Every
//! element the browser constructs from that class gets an [`ElementHandle`]
//! that forwards lifecycle callbacks, property accessors and method calls to an
//! [`elementum::CustomElement`] living on a [`WebHost`].
//!
//! All definitions share one [`runtime`], whose microtask queue is drained at
//! the browser's microtask checkpoint.

mod convert;
mod define;
mod dom;
mod error;

pub use convert::{args_from_js, from_js, to_js};
pub use define::{ElementFactory, ElementHandle, define, runtime};
pub use dom::WebHost;
pub use error::WebError;
