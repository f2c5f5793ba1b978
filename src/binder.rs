//! The reference binder: from declared request to live proxy.
//!
//! This is the layer an injection point talks to. A [`ReferenceRequest`]
//! describes what the consumer declared (interface, selectors, the factory
//! that can produce the bound object); [`ReferenceBinder::bind`] turns it
//! into a call-through [`ReferenceProxy`](crate::ReferenceProxy), creating
//! or reusing the descriptor and gate cached under the request's canonical
//! identity.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use crate::coordinator::LifecycleCoordinator;
use crate::descriptor::{ReferenceDescriptor, TargetFactory};
use crate::dispatch::TargetDispatcher;
use crate::error::{BoxError, RefResult};
use crate::gate::DispatchGate;
use crate::identity::{NoPlaceholders, PlaceholderResolver, ReferenceIdentity, ReferenceKeyBuilder};
use crate::internal::ShardedOnceMap;
use crate::proxy::{ProxyFactory, ReferenceProxy};
use crate::registry::ReferenceRegistry;

/// Ambient container query: is a target with this identity registered
/// locally?
///
/// Consulted once per gate, at gate-construction time, to classify the
/// reference as local or remote. "Registered" means the implementation
/// exists in the same process; it may not have finished its export yet,
/// which is exactly the window the pending-local machinery covers.
pub trait LocalRegistry: Send + Sync {
    /// Whether a local target is registered under `identity`.
    fn is_locally_registered(&self, identity: &ReferenceIdentity) -> bool;
}

/// Set-backed [`LocalRegistry`] for hosts and tests.
///
/// The owning container registers each local implementation's identity here
/// as it constructs it, then delivers the export notification to the
/// coordinator once the implementation finishes exporting.
#[derive(Default)]
pub struct LocalServiceTable {
    registered: RwLock<HashSet<ReferenceIdentity>>,
}

impl LocalServiceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a local implementation registered under `identity`.
    pub fn register(&self, identity: ReferenceIdentity) {
        self.registered.write().unwrap().insert(identity);
    }

    /// Forgets a previously registered identity.
    pub fn unregister(&self, identity: &ReferenceIdentity) {
        self.registered.write().unwrap().remove(identity);
    }
}

impl LocalRegistry for LocalServiceTable {
    fn is_locally_registered(&self, identity: &ReferenceIdentity) -> bool {
        self.registered.read().unwrap().contains(identity)
    }
}

/// Kind of injection point a reference was requested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteKind {
    /// Injected into a field/struct member.
    Field,
    /// Injected through a setter or constructor method.
    Method,
}

/// Identity of one injection point, kept for introspection only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InjectionSite {
    kind: SiteKind,
    owner: String,
    member: String,
}

impl InjectionSite {
    /// A field injection point, e.g. `InjectionSite::field("app::Checkout", "greeter")`.
    pub fn field(owner: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            kind: SiteKind::Field,
            owner: owner.into(),
            member: member.into(),
        }
    }

    /// A method injection point.
    pub fn method(owner: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            kind: SiteKind::Method,
            owner: owner.into(),
            member: member.into(),
        }
    }

    /// The injection kind.
    pub fn kind(&self) -> SiteKind {
        self.kind
    }

    /// Type that owns the injection point.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Member (field or method) name.
    pub fn member(&self) -> &str {
        &self.member
    }
}

impl fmt::Display for InjectionSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner, self.member)
    }
}

/// One consumer-side request for a reference proxy.
///
/// Carries the declared interface, optional selectors, the factory that can
/// produce the bound object on demand, and optionally the injection site it
/// came from (introspection only).
pub struct ReferenceRequest {
    interface: String,
    group: Option<String>,
    version: Option<String>,
    attributes: BTreeMap<String, String>,
    factory: TargetFactory,
    site: Option<InjectionSite>,
}

impl ReferenceRequest {
    /// Starts a request for `interface` backed by `factory`.
    ///
    /// The factory is only invoked if this request ends up installing the
    /// descriptor and its gate binds; requests that hit the cache discard
    /// their factory.
    pub fn new<F>(interface: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn TargetDispatcher>, BoxError> + Send + Sync + 'static,
    {
        Self {
            interface: interface.into(),
            group: None,
            version: None,
            attributes: BTreeMap::new(),
            factory: Arc::new(factory),
            site: None,
        }
    }

    /// Sets the group selector.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Sets the version selector.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Adds an extra selector attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Records the injection site this request came from.
    pub fn site(mut self, site: InjectionSite) -> Self {
        self.site = Some(site);
        self
    }
}

/// Turns reference requests into live proxies.
///
/// Owns the descriptor registry, the per-identity gate cache, the lifecycle
/// coordinator, and the injection-site caches. One binder instance per
/// hosting container; all state is explicit and torn down with
/// [`shutdown`](ReferenceBinder::shutdown).
///
/// # Examples
///
/// ```rust
/// use refgate::{
///     FnDispatcher, GateState, LifecycleEvent, LocalServiceTable, ReferenceBinder,
///     ReferenceKeyBuilder, ReferenceRequest, TargetDispatcher, value,
/// };
/// use std::sync::Arc;
///
/// let locals = Arc::new(LocalServiceTable::new());
/// let binder = ReferenceBinder::new(locals.clone());
///
/// // The container constructs a local Greeter implementation...
/// let identity = ReferenceKeyBuilder::new("demo.Greeter").build().unwrap();
/// locals.register(identity.clone());
///
/// // ...and a consumer requests a reference to it before the export ran.
/// let proxy = binder
///     .bind(ReferenceRequest::new("demo.Greeter", || {
///         Ok(Arc::new(FnDispatcher::new(|_m: &str, _a| Ok(value("hi".to_string()))))
///             as Arc<dyn TargetDispatcher>)
///     }))
///     .unwrap();
/// assert_eq!(proxy.state(), GateState::Unbound);
///
/// // The export finishes; the coordinator releases the gate.
/// binder.coordinator().notify(LifecycleEvent::LocalExported { identity });
/// assert_eq!(proxy.state(), GateState::Bound);
///
/// let hi: String = proxy.call_as("say", Vec::new()).unwrap();
/// assert_eq!(hi, "hi");
/// ```
pub struct ReferenceBinder {
    registry: ReferenceRegistry,
    coordinator: Arc<LifecycleCoordinator>,
    locals: Arc<dyn LocalRegistry>,
    resolver: Arc<dyn PlaceholderResolver>,
    // One gate per identity, reused across injection points.
    gates: ShardedOnceMap<Arc<DispatchGate>>,
    field_sites: Mutex<HashMap<InjectionSite, Arc<ReferenceDescriptor>>>,
    method_sites: Mutex<HashMap<InjectionSite, Arc<ReferenceDescriptor>>>,
}

impl ReferenceBinder {
    /// Creates a binder over the given ambient container query, with no
    /// placeholder environment.
    pub fn new(locals: Arc<dyn LocalRegistry>) -> Self {
        Self::with_resolver(locals, Arc::new(NoPlaceholders))
    }

    /// Creates a binder with a placeholder-resolution environment.
    pub fn with_resolver(
        locals: Arc<dyn LocalRegistry>,
        resolver: Arc<dyn PlaceholderResolver>,
    ) -> Self {
        Self {
            registry: ReferenceRegistry::new(),
            coordinator: Arc::new(LifecycleCoordinator::new()),
            locals,
            resolver,
            gates: ShardedOnceMap::new(),
            field_sites: Mutex::new(HashMap::new()),
            method_sites: Mutex::new(HashMap::new()),
        }
    }

    /// The coordinator the owning container delivers notifications to.
    pub fn coordinator(&self) -> &Arc<LifecycleCoordinator> {
        &self.coordinator
    }

    /// The descriptor registry, for diagnostics.
    pub fn registry(&self) -> &ReferenceRegistry {
        &self.registry
    }

    /// Resolves a request into a call-through proxy.
    ///
    /// Derives the canonical identity, installs or reuses the descriptor and
    /// gate cached under it, classifies the gate local/remote, and wraps it
    /// in a proxy. Configuration errors surface here; so do binding errors
    /// for remote-classified references, since those bind synchronously.
    pub fn bind(&self, request: ReferenceRequest) -> RefResult<ReferenceProxy> {
        let mut builder = ReferenceKeyBuilder::new(request.interface)
            .resolver(self.resolver.as_ref());
        if let Some(group) = request.group {
            builder = builder.group(group);
        }
        if let Some(version) = request.version {
            builder = builder.version(version);
        }
        builder = builder.attributes(request.attributes);
        let identity = builder.build()?;

        let factory = request.factory;
        let descriptor = self.registry.get_or_create(&identity, || {
            Ok(ReferenceDescriptor::new(identity.clone(), factory))
        })?;

        if let Some(site) = request.site {
            self.cache_injection_site(site, descriptor.clone());
        }

        let gate = self.gate_for(&identity, &descriptor)?;
        Ok(ProxyFactory::build(gate))
    }

    /// All descriptors this binder has installed, in installation order.
    pub fn reference_descriptors(&self) -> Vec<Arc<ReferenceDescriptor>> {
        self.registry.all()
    }

    /// Snapshot of the field injection sites seen so far.
    pub fn field_site_descriptors(&self) -> Vec<(InjectionSite, Arc<ReferenceDescriptor>)> {
        let sites = self.field_sites.lock().unwrap();
        sites.iter().map(|(s, d)| (s.clone(), d.clone())).collect()
    }

    /// Snapshot of the method injection sites seen so far.
    pub fn method_site_descriptors(&self) -> Vec<(InjectionSite, Arc<ReferenceDescriptor>)> {
        let sites = self.method_sites.lock().unwrap();
        sites.iter().map(|(s, d)| (s.clone(), d.clone())).collect()
    }

    /// Whole-system teardown: purges every cache this binder owns.
    ///
    /// Proxies handed out earlier keep working against their bound targets;
    /// new requests start from an empty world.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
        self.gates.clear();
        self.registry.clear();
        self.field_sites.lock().unwrap().clear();
        self.method_sites.lock().unwrap().clear();
        log::debug!("reference binder shut down");
    }

    fn gate_for(
        &self,
        identity: &ReferenceIdentity,
        descriptor: &Arc<ReferenceDescriptor>,
    ) -> RefResult<Arc<DispatchGate>> {
        let (gate, _) = self.gates.get_or_try_init(identity, || {
            if self.locals.is_locally_registered(identity) {
                // Binding has to wait for the local target's export.
                let gate = DispatchGate::local(descriptor.clone());
                self.coordinator.register_pending(gate.clone());
                Ok(gate)
            } else {
                DispatchGate::remote(descriptor.clone())
            }
        })?;
        Ok(gate)
    }

    fn cache_injection_site(&self, site: InjectionSite, descriptor: Arc<ReferenceDescriptor>) {
        let cache = match site.kind() {
            SiteKind::Field => &self.field_sites,
            SiteKind::Method => &self.method_sites,
        };
        // Last write wins; this cache carries no other invariant.
        cache.lock().unwrap().insert(site, descriptor);
    }
}
