//! Concurrent reference descriptor cache.

use std::sync::{Arc, Mutex};

use crate::descriptor::ReferenceDescriptor;
use crate::error::RefResult;
use crate::identity::ReferenceIdentity;
use crate::internal::ShardedOnceMap;

/// Concurrent cache mapping canonical identity to reference descriptor.
///
/// The single most important correctness property of the layer lives here:
/// at most one live descriptor per identity, regardless of how many
/// injection points request it concurrently. Each entry is guarded by its
/// own once-cell, so concurrent first access for one identity serializes on
/// that entry alone and exactly one factory result is installed; callers
/// racing an install all receive the installed `Arc`.
///
/// Registries are owned instances, constructed by whoever builds proxies
/// and torn down explicitly. There is no process-wide state.
///
/// # Examples
///
/// ```rust
/// use refgate::{
///     FnDispatcher, ReferenceDescriptor, ReferenceKeyBuilder, ReferenceRegistry,
///     TargetDispatcher, value,
/// };
/// use std::sync::Arc;
///
/// let registry = ReferenceRegistry::new();
/// let identity = ReferenceKeyBuilder::new("demo.Greeter").build().unwrap();
///
/// let descriptor = registry
///     .get_or_create(&identity, || {
///         Ok(ReferenceDescriptor::new(identity.clone(), Arc::new(|| {
///             Ok(Arc::new(FnDispatcher::new(|_m: &str, _a| Ok(value(()))))
///                 as Arc<dyn TargetDispatcher>)
///         })))
///     })
///     .unwrap();
///
/// // A second request for the same identity returns the same instance and
/// // never runs the factory.
/// let again = registry
///     .get_or_create(&identity, || unreachable!("already installed"))
///     .unwrap();
/// assert!(Arc::ptr_eq(&descriptor, &again));
/// assert_eq!(registry.all().len(), 1);
/// ```
pub struct ReferenceRegistry {
    descriptors: ShardedOnceMap<Arc<ReferenceDescriptor>>,
    // Insertion-order journal backing all().
    order: Mutex<Vec<ReferenceIdentity>>,
}

impl ReferenceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            descriptors: ShardedOnceMap::new(),
            order: Mutex::new(Vec::new()),
        }
    }

    /// Returns the cached descriptor for `identity`, creating and installing
    /// it through `factory` if absent.
    ///
    /// Concurrent callers for the same identity never observe two different
    /// descriptors; at most one factory invocation is installed. A factory
    /// failure installs nothing, so a later request retries.
    pub fn get_or_create<F>(
        &self,
        identity: &ReferenceIdentity,
        factory: F,
    ) -> RefResult<Arc<ReferenceDescriptor>>
    where
        F: FnOnce() -> RefResult<ReferenceDescriptor>,
    {
        let (descriptor, installed) = self
            .descriptors
            .get_or_try_init(identity, || factory().map(Arc::new))?;
        if installed {
            self.order.lock().unwrap().push(identity.clone());
            log::debug!("installed reference descriptor for {}", identity);
        }
        Ok(descriptor)
    }

    /// Returns the cached descriptor for `identity`, if any.
    pub fn get(&self, identity: &ReferenceIdentity) -> Option<Arc<ReferenceDescriptor>> {
        self.descriptors.get(identity)
    }

    /// All cached descriptors, in installation order. For introspection.
    pub fn all(&self) -> Vec<Arc<ReferenceDescriptor>> {
        let order = self.order.lock().unwrap();
        order
            .iter()
            .filter_map(|identity| self.descriptors.get(identity))
            .collect()
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry holds no descriptors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Purges every cached descriptor.
    ///
    /// Consumers still holding a descriptor `Arc` keep a working, immutable
    /// object; new lookups construct afresh.
    pub fn clear(&self) {
        self.order.lock().unwrap().clear();
        self.descriptors.clear();
        log::debug!("reference registry cleared");
    }
}

impl Default for ReferenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
