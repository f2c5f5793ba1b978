//! The per-reference lazy-binding state machine.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::descriptor::ReferenceDescriptor;
use crate::dispatch::{unwrap_target_error, AnyValue, TargetDispatcher};
use crate::error::{RefError, RefResult};
use crate::identity::ReferenceIdentity;

/// Binding state of a [`DispatchGate`].
///
/// The transition `Unbound -> Bound` is one-way; a gate never unbinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No target published yet; the next trigger binds.
    Unbound,
    /// Target published; all calls dispatch directly. Terminal.
    Bound,
}

/// Per-reference gate mediating lazy binding and call forwarding.
///
/// Classification happens at construction time: a reference whose target is
/// already registered in the ambient container is **local**, anything else
/// is **remote**. Remote gates bind immediately and synchronously, so no
/// call ever observes [`GateState::Unbound`] on them. Local gates stay
/// unbound until either their export notification arrives (delivered via
/// [`LifecycleCoordinator`](crate::LifecycleCoordinator)) or the first call
/// lands, whichever comes first.
///
/// The bound target is published through a single-assignment cell: a
/// notification-triggered bind racing a first-call fallback bind results in
/// exactly one target construction, and any thread that observes `Bound`
/// sees a fully initialized target.
///
/// # Examples
///
/// ```rust
/// use refgate::{
///     DispatchGate, FnDispatcher, GateState, ReferenceDescriptor, ReferenceKeyBuilder,
///     TargetDispatcher, value,
/// };
/// use std::sync::Arc;
///
/// let identity = ReferenceKeyBuilder::new("demo.Echo").build().unwrap();
/// let descriptor = Arc::new(ReferenceDescriptor::new(identity, Arc::new(|| {
///     Ok(Arc::new(FnDispatcher::new(|_method: &str, mut args| Ok(args.remove(0))))
///         as Arc<dyn TargetDispatcher>)
/// })));
///
/// // Remote classification binds at construction.
/// let gate = DispatchGate::remote(descriptor).unwrap();
/// assert_eq!(gate.state(), GateState::Bound);
///
/// let echoed = gate.invoke("echo", vec![value(5u8)]).unwrap();
/// assert_eq!(*echoed.downcast::<u8>().unwrap(), 5);
/// ```
pub struct DispatchGate {
    descriptor: Arc<ReferenceDescriptor>,
    is_local: bool,
    // Single-assignment publish; the only mutation a gate ever sees.
    target: OnceCell<Arc<dyn TargetDispatcher>>,
}

impl DispatchGate {
    /// Constructs a gate for a remote-classified reference.
    ///
    /// Binds immediately and synchronously; a factory failure surfaces here,
    /// at construction, as [`RefError::Binding`].
    pub fn remote(descriptor: Arc<ReferenceDescriptor>) -> RefResult<Arc<Self>> {
        let gate = Arc::new(Self {
            descriptor,
            is_local: false,
            target: OnceCell::new(),
        });
        gate.bound_target()?;
        Ok(gate)
    }

    /// Constructs a gate for a local-classified reference.
    ///
    /// Stays unbound until the matching export notification arrives or the
    /// first call lands. The caller is responsible for registering the gate
    /// with the coordinator.
    pub fn local(descriptor: Arc<ReferenceDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            is_local: true,
            target: OnceCell::new(),
        })
    }

    /// The descriptor this gate binds through.
    pub fn descriptor(&self) -> &Arc<ReferenceDescriptor> {
        &self.descriptor
    }

    /// The identity of the reference (and of its local target, when local).
    pub fn identity(&self) -> &ReferenceIdentity {
        self.descriptor.identity()
    }

    /// Whether the gate was classified local at construction.
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    /// Current binding state.
    pub fn state(&self) -> GateState {
        if self.target.get().is_some() {
            GateState::Bound
        } else {
            GateState::Unbound
        }
    }

    /// Triggers the one-way transition to `Bound`.
    ///
    /// Idempotent: repeated triggers after the first successful bind are
    /// no-ops. A factory failure leaves the gate unbound and surfaces as
    /// [`RefError::Binding`].
    pub fn bind(&self) -> RefResult<()> {
        self.bound_target().map(|_| ())
    }

    /// Forwards one call to the bound target, fallback-binding first if the
    /// export notification has not arrived yet.
    ///
    /// Target errors propagate verbatim (the uniform dispatch envelope is
    /// stripped) as [`RefError::Invocation`].
    pub fn invoke(&self, method: &str, args: Vec<AnyValue>) -> RefResult<AnyValue> {
        let target = match self.target.get() {
            Some(target) => target.clone(),
            // First call won the race against the export notification.
            None => self.bound_target()?,
        };
        log::trace!("dispatching {}#{}", self.identity(), method);
        target
            .dispatch(method, args)
            .map_err(|err| RefError::Invocation(unwrap_target_error(err)))
    }

    fn bound_target(&self) -> RefResult<Arc<dyn TargetDispatcher>> {
        let mut fresh = false;
        let target = self
            .target
            .get_or_try_init(|| {
                fresh = true;
                self.descriptor.produce()
            })?
            .clone();
        if fresh {
            log::debug!(
                "bound {} gate for {}",
                if self.is_local { "local" } else { "remote" },
                self.identity()
            );
        }
        Ok(target)
    }
}

impl fmt::Debug for DispatchGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchGate")
            .field("identity", &self.identity().canonical())
            .field("is_local", &self.is_local)
            .field("state", &self.state())
            .finish()
    }
}
