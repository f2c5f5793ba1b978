//! # refgate
//!
//! Lazy service-reference binding and proxy dispatch.
//!
//! refgate turns a declarative "I need a reference to service X" request
//! into a live, call-through proxy, while deferring the binding of that
//! proxy to a concrete target until the target is safe to use:
//!
//! - **Synchronous proxies**: callers receive a usable proxy before the
//!   target may exist.
//! - **Exactly-once initialization**: one descriptor, one gate, and one
//!   target per canonical identity, even under concurrent first use.
//! - **Lifecycle-sequenced local binding**: a reference to a target living
//!   in the same process stays unbound until that target finishes its
//!   export, or until the first call lands, whichever comes first.
//!
//! ## Quick start
//!
//! ```rust
//! use refgate::{
//!     AnyValue, FnDispatcher, LocalServiceTable, ReferenceBinder, ReferenceRequest,
//!     TargetDispatcher, value,
//! };
//! use std::sync::Arc;
//!
//! let binder = ReferenceBinder::new(Arc::new(LocalServiceTable::new()));
//!
//! // Declare a reference; the factory produces the bound object on demand.
//! let request = ReferenceRequest::new("demo.Greeter", || {
//!     Ok(Arc::new(FnDispatcher::new(|method: &str, mut args: Vec<AnyValue>| {
//!         match method {
//!             "greet" => {
//!                 let name = args
//!                     .remove(0)
//!                     .downcast::<String>()
//!                     .map_err(|_| "greet expects a string name")?;
//!                 Ok(value(format!("Hello, {}", name)))
//!             }
//!             other => Err(format!("unknown method `{}`", other).into()),
//!         }
//!     })) as Arc<dyn TargetDispatcher>)
//! });
//!
//! // No local target registered, so this classifies remote and binds now.
//! let proxy = binder.bind(request).unwrap();
//! let greeting: String = proxy
//!     .call_as("greet", vec![value("Ann".to_string())])
//!     .unwrap();
//! assert_eq!(greeting, "Hello, Ann");
//! ```
//!
//! ## Local references and the export lifecycle
//!
//! When the requested target is registered in the same process, binding has
//! to wait for the target's own export to finish. The owning container
//! registers local identities in a [`LocalRegistry`] and delivers
//! [`LifecycleEvent::LocalExported`] to the binder's
//! [`LifecycleCoordinator`] when each export completes; the matching gate is
//! released then. A call that arrives before the notification does not
//! block: the gate binds itself as a fallback, exactly once, and the late
//! notification becomes a no-op.
//!
//! ## What this crate is not
//!
//! Configuration loading, implementation scanning, and wire transports are
//! external collaborators. refgate consumes an identity scheme, a
//! local-registration query, and lifecycle notifications; it produces
//! proxies and nothing else.

// Module declarations
pub mod binder;
pub mod coordinator;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod identity;
pub mod proxy;
pub mod registry;

// Internal modules
mod internal;

// Re-export core types
pub use binder::{InjectionSite, LocalRegistry, LocalServiceTable, ReferenceBinder, ReferenceRequest, SiteKind};
pub use coordinator::{LifecycleCoordinator, LifecycleEvent};
pub use descriptor::{ReferenceDescriptor, TargetFactory};
pub use dispatch::{value, AnyValue, FnDispatcher, TargetDispatcher, TargetError};
pub use error::{BoxError, RefError, RefResult};
pub use gate::{DispatchGate, GateState};
pub use identity::{
    NoPlaceholders, PlaceholderResolver, ProcessEnv, ReferenceIdentity, ReferenceKeyBuilder,
    IDENTITY_PREFIX,
};
pub use proxy::{ProxyFactory, ReferenceProxy};
pub use registry::ReferenceRegistry;
