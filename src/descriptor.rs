//! Reference descriptors: per-identity configuration plus the memoized target.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::dispatch::TargetDispatcher;
use crate::error::{BoxError, RefError, RefResult};
use crate::identity::ReferenceIdentity;

/// Factory capable of producing the bound object for one reference.
///
/// Invoked at most once successfully per descriptor; the result is memoized.
/// A failed invocation does not poison the descriptor, so the next binding
/// trigger retries the factory and surfaces its error to a live caller.
pub type TargetFactory =
    Arc<dyn Fn() -> Result<Arc<dyn TargetDispatcher>, BoxError> + Send + Sync>;

/// Per-identity reference descriptor.
///
/// Owns everything needed to eventually produce a target: the resolved
/// identity and the target factory. Created once per identity by
/// [`ReferenceRegistry`](crate::ReferenceRegistry) and never mutated after
/// construction except to memoize the resolved target.
///
/// # Examples
///
/// ```rust
/// use refgate::{FnDispatcher, ReferenceDescriptor, ReferenceKeyBuilder, TargetDispatcher, value};
/// use std::sync::Arc;
///
/// let identity = ReferenceKeyBuilder::new("demo.Clock").build().unwrap();
/// let descriptor = ReferenceDescriptor::new(identity, Arc::new(|| {
///     Ok(Arc::new(FnDispatcher::new(|_method: &str, _args| Ok(value(12u64))))
///         as Arc<dyn TargetDispatcher>)
/// }));
///
/// assert!(!descriptor.is_resolved());
/// let target = descriptor.produce().unwrap();
/// assert!(descriptor.is_resolved());
///
/// // Repeated produce() calls return the memoized target.
/// let again = descriptor.produce().unwrap();
/// assert!(Arc::ptr_eq(&target, &again));
/// ```
pub struct ReferenceDescriptor {
    identity: ReferenceIdentity,
    factory: TargetFactory,
    target: OnceCell<Arc<dyn TargetDispatcher>>,
}

impl ReferenceDescriptor {
    /// Creates a descriptor for the given identity and target factory.
    pub fn new(identity: ReferenceIdentity, factory: TargetFactory) -> Self {
        Self {
            identity,
            factory,
            target: OnceCell::new(),
        }
    }

    /// The resolved identity this descriptor is cached under.
    pub fn identity(&self) -> &ReferenceIdentity {
        &self.identity
    }

    /// The declared interface name.
    pub fn interface(&self) -> &str {
        self.identity.interface()
    }

    /// Whether the target has been produced and memoized.
    pub fn is_resolved(&self) -> bool {
        self.target.get().is_some()
    }

    /// Produces the bound target, memoizing the first successful result.
    ///
    /// Factory failures surface as [`RefError::Binding`] and leave the memo
    /// empty.
    pub fn produce(&self) -> RefResult<Arc<dyn TargetDispatcher>> {
        self.target
            .get_or_try_init(|| {
                (self.factory)().map_err(|err| {
                    RefError::Binding(format!(
                        "target factory for {} failed: {}",
                        self.identity, err
                    ))
                })
            })
            .cloned()
    }
}

impl fmt::Debug for ReferenceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceDescriptor")
            .field("identity", &self.identity.canonical())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
