//! Lifecycle coordination between local exports and waiting gates.

use std::sync::Arc;

use crate::gate::DispatchGate;
use crate::identity::ReferenceIdentity;
use crate::internal::ShardedTable;

/// Lifecycle notification consumed by the coordinator.
///
/// Delivered by the owning container through explicit
/// [`LifecycleCoordinator::notify`] calls rather than an ambient event bus.
/// The enum is non-exhaustive so hosts compiled against a newer refgate can
/// deliver notification kinds this version ignores.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A local target finished its export under the given identity.
    LocalExported {
        /// Identity the target was exported under; matches the reference
        /// identity by construction of the key builder.
        identity: ReferenceIdentity,
    },
    /// The application lifecycle reached a named phase.
    PhaseReached {
        /// Phase name, e.g. `"refreshed"`.
        phase: String,
    },
}

/// Releases gates that wait for their local target to be exported.
///
/// Local-classified gates register here and stay pending until the matching
/// `LocalExported` notification arrives, at which point the entry is removed
/// (exactly once) and the gate is bound. A notification with no pending
/// consumer is a no-op: either nothing referenced that target, or the gate
/// already self-bound through the first-call fallback.
///
/// # Examples
///
/// ```rust
/// use refgate::{
///     DispatchGate, FnDispatcher, GateState, LifecycleCoordinator, LifecycleEvent,
///     ReferenceDescriptor, ReferenceKeyBuilder, TargetDispatcher, value,
/// };
/// use std::sync::Arc;
///
/// let identity = ReferenceKeyBuilder::new("demo.Local").build().unwrap();
/// let descriptor = Arc::new(ReferenceDescriptor::new(identity.clone(), Arc::new(|| {
///     Ok(Arc::new(FnDispatcher::new(|_m: &str, _a| Ok(value(()))))
///         as Arc<dyn TargetDispatcher>)
/// })));
///
/// let coordinator = LifecycleCoordinator::new();
/// let gate = DispatchGate::local(descriptor);
/// coordinator.register_pending(gate.clone());
/// assert_eq!(gate.state(), GateState::Unbound);
///
/// // The owning container exports the local target and notifies.
/// coordinator.notify(LifecycleEvent::LocalExported { identity });
/// assert_eq!(gate.state(), GateState::Bound);
/// assert_eq!(coordinator.pending_len(), 0);
/// ```
pub struct LifecycleCoordinator {
    pending: ShardedTable<Arc<DispatchGate>>,
}

impl LifecycleCoordinator {
    /// Creates a coordinator with an empty pending table.
    pub fn new() -> Self {
        Self {
            pending: ShardedTable::new(),
        }
    }

    /// Registers a local gate to be bound when its target exports.
    ///
    /// Keyed by the gate's identity, which is the local target's identity.
    pub fn register_pending(&self, gate: Arc<DispatchGate>) {
        log::trace!("gate for {} pending local export", gate.identity());
        self.pending.insert(gate.identity().clone(), gate);
    }

    /// Delivers one lifecycle notification.
    ///
    /// `LocalExported` binds and removes the matching pending gate;
    /// `PhaseReached` is a hook point with no behavior here. The coordinator
    /// never panics on a notification it has no use for.
    pub fn notify(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::LocalExported { identity } => self.on_local_exported(&identity),
            // Hook point; the surrounding lifecycle dispatches this but
            // nothing in this layer reacts to phases yet.
            LifecycleEvent::PhaseReached { phase } => {
                log::trace!("lifecycle phase reached: {}", phase);
            }
        }
    }

    fn on_local_exported(&self, identity: &ReferenceIdentity) {
        let Some(gate) = self.pending.remove(identity) else {
            // No pending consumer, or it already self-bound via fallback.
            log::trace!("no pending gate for exported {}", identity);
            return;
        };
        if let Err(err) = gate.bind() {
            // No caller to report to here; the first invoke through the
            // gate retries the factory and surfaces the failure.
            log::warn!("export-triggered bind failed for {}: {}", identity, err);
        }
    }

    /// Whether a gate for `identity` is still pending.
    pub fn has_pending(&self, identity: &ReferenceIdentity) -> bool {
        self.pending.contains(identity)
    }

    /// Number of gates waiting for an export notification.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops every pending entry. Part of whole-system teardown.
    pub fn shutdown(&self) {
        let abandoned = self.pending.len();
        if abandoned > 0 {
            log::warn!("shutting down with {} gate(s) still pending local export", abandoned);
        }
        self.pending.clear();
    }
}

impl Default for LifecycleCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ReferenceDescriptor;
    use crate::dispatch::{value, FnDispatcher, TargetDispatcher};
    use crate::gate::GateState;
    use crate::identity::ReferenceKeyBuilder;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn local_gate(name: &str, builds: Arc<AtomicU32>) -> Arc<DispatchGate> {
        let identity = ReferenceKeyBuilder::new(name).build().unwrap();
        let descriptor = Arc::new(ReferenceDescriptor::new(
            identity,
            Arc::new(move || {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(FnDispatcher::new(|_m: &str, _a| Ok(value(()))))
                    as Arc<dyn TargetDispatcher>)
            }),
        ));
        DispatchGate::local(descriptor)
    }

    #[test]
    fn export_notification_binds_and_removes_exactly_once() {
        let builds = Arc::new(AtomicU32::new(0));
        let coordinator = LifecycleCoordinator::new();
        let gate = local_gate("demo.Local", builds.clone());
        coordinator.register_pending(gate.clone());
        assert!(coordinator.has_pending(gate.identity()));

        coordinator.notify(LifecycleEvent::LocalExported {
            identity: gate.identity().clone(),
        });
        assert_eq!(gate.state(), GateState::Bound);
        assert!(!coordinator.has_pending(gate.identity()));
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        // A duplicate notification finds no entry and changes nothing.
        coordinator.notify(LifecycleEvent::LocalExported {
            identity: gate.identity().clone(),
        });
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unmatched_export_is_a_no_op() {
        let coordinator = LifecycleCoordinator::new();
        let identity = ReferenceKeyBuilder::new("demo.Nobody").build().unwrap();
        coordinator.notify(LifecycleEvent::LocalExported { identity });
        assert_eq!(coordinator.pending_len(), 0);
    }

    #[test]
    fn notification_after_fallback_bind_is_a_no_op() {
        let builds = Arc::new(AtomicU32::new(0));
        let coordinator = LifecycleCoordinator::new();
        let gate = local_gate("demo.Eager", builds.clone());
        coordinator.register_pending(gate.clone());

        // First call arrives before the export; the gate self-binds.
        gate.invoke("ping", Vec::new()).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        coordinator.notify(LifecycleEvent::LocalExported {
            identity: gate.identity().clone(),
        });
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn phase_notifications_are_ignored() {
        let coordinator = LifecycleCoordinator::new();
        let gate = local_gate("demo.Waiting", Arc::new(AtomicU32::new(0)));
        coordinator.register_pending(gate.clone());

        coordinator.notify(LifecycleEvent::PhaseReached {
            phase: "refreshed".to_string(),
        });
        assert_eq!(gate.state(), GateState::Unbound);
        assert_eq!(coordinator.pending_len(), 1);
    }

    #[test]
    fn shutdown_clears_pending_entries() {
        let coordinator = LifecycleCoordinator::new();
        coordinator.register_pending(local_gate("demo.A", Arc::new(AtomicU32::new(0))));
        coordinator.register_pending(local_gate("demo.B", Arc::new(AtomicU32::new(0))));
        assert_eq!(coordinator.pending_len(), 2);

        coordinator.shutdown();
        assert_eq!(coordinator.pending_len(), 0);
    }
}
