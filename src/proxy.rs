//! Call-through proxy handles.

use std::fmt;
use std::sync::Arc;

use crate::dispatch::AnyValue;
use crate::error::{RefError, RefResult};
use crate::gate::{DispatchGate, GateState};
use crate::identity::ReferenceIdentity;

/// A call-through proxy for one reference.
///
/// Every call is forwarded verbatim, arguments and return value, to the
/// backing gate; the target's error propagates unwrapped. Typed interface
/// facades are thin adapters over a `ReferenceProxy` that forward each
/// method to [`call`](ReferenceProxy::call):
///
/// ```rust
/// use refgate::{
///     AnyValue, DispatchGate, FnDispatcher, ProxyFactory, RefResult, ReferenceDescriptor,
///     ReferenceKeyBuilder, ReferenceProxy, TargetDispatcher, value,
/// };
/// use std::sync::Arc;
///
/// trait Greeter {
///     fn greet(&self, name: &str) -> RefResult<String>;
/// }
///
/// struct GreeterFacade(ReferenceProxy);
///
/// impl Greeter for GreeterFacade {
///     fn greet(&self, name: &str) -> RefResult<String> {
///         self.0.call_as("greet", vec![value(name.to_string())])
///     }
/// }
///
/// let identity = ReferenceKeyBuilder::new("demo.Greeter").build().unwrap();
/// let descriptor = Arc::new(ReferenceDescriptor::new(identity, Arc::new(|| {
///     Ok(Arc::new(FnDispatcher::new(|_m: &str, mut args: Vec<AnyValue>| {
///         let name = args
///             .remove(0)
///             .downcast::<String>()
///             .map_err(|_| "greet expects a string name")?;
///         Ok(value(format!("Hello, {}", name)))
///     })) as Arc<dyn TargetDispatcher>)
/// })));
///
/// let gate = DispatchGate::remote(descriptor).unwrap();
/// let greeter = GreeterFacade(ProxyFactory::build(gate));
/// assert_eq!(greeter.greet("Ann").unwrap(), "Hello, Ann");
/// ```
#[derive(Clone)]
pub struct ReferenceProxy {
    gate: Arc<DispatchGate>,
}

impl ReferenceProxy {
    /// Forwards one call through the gate.
    pub fn call(&self, method: &str, args: Vec<AnyValue>) -> RefResult<AnyValue> {
        self.gate.invoke(method, args)
    }

    /// Forwards one call and downcasts the result.
    ///
    /// Fails with [`RefError::TypeMismatch`] when the target returned a
    /// different type than the facade expected.
    pub fn call_as<R: 'static>(&self, method: &str, args: Vec<AnyValue>) -> RefResult<R> {
        let result = self.call(method, args)?;
        result
            .downcast::<R>()
            .map(|boxed| *boxed)
            .map_err(|_| RefError::TypeMismatch(std::any::type_name::<R>()))
    }

    /// The declared interface name of the reference.
    pub fn interface(&self) -> &str {
        self.gate.descriptor().interface()
    }

    /// The resolved identity of the reference.
    pub fn identity(&self) -> &ReferenceIdentity {
        self.gate.identity()
    }

    /// Binding state of the backing gate.
    pub fn state(&self) -> GateState {
        self.gate.state()
    }

    /// The backing gate, for lifecycle wiring and diagnostics.
    pub fn gate(&self) -> &Arc<DispatchGate> {
        &self.gate
    }
}

impl fmt::Debug for ReferenceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceProxy")
            .field("identity", &self.identity().canonical())
            .field("state", &self.state())
            .finish()
    }
}

/// Builds proxy objects over dispatch gates.
///
/// Construction has no side effects: building a proxy never triggers
/// binding.
pub struct ProxyFactory;

impl ProxyFactory {
    /// Wraps a gate in a call-through proxy.
    pub fn build(gate: Arc<DispatchGate>) -> ReferenceProxy {
        ReferenceProxy { gate }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ReferenceDescriptor;
    use crate::dispatch::{value, FnDispatcher, TargetDispatcher};
    use crate::identity::ReferenceKeyBuilder;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn number_descriptor(builds: Arc<AtomicU32>) -> Arc<ReferenceDescriptor> {
        let identity = ReferenceKeyBuilder::new("demo.Numbers").build().unwrap();
        Arc::new(ReferenceDescriptor::new(
            identity,
            Arc::new(move || {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(FnDispatcher::new(|_m: &str, _a| Ok(value(41u64))))
                    as Arc<dyn TargetDispatcher>)
            }),
        ))
    }

    #[test]
    fn building_a_proxy_never_binds() {
        let builds = Arc::new(AtomicU32::new(0));
        let gate = DispatchGate::local(number_descriptor(builds.clone()));
        let proxy = ProxyFactory::build(gate);
        assert_eq!(proxy.state(), GateState::Unbound);
        assert_eq!(builds.load(Ordering::SeqCst), 0);

        // Cloning the proxy handle does not bind either.
        let clone = proxy.clone();
        assert_eq!(clone.state(), GateState::Unbound);
        assert_eq!(builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn call_as_reports_type_mismatch() {
        let builds = Arc::new(AtomicU32::new(0));
        let gate = DispatchGate::remote(number_descriptor(builds)).unwrap();
        let proxy = ProxyFactory::build(gate);

        let err = proxy.call_as::<String>("next", Vec::new()).unwrap_err();
        assert!(matches!(err, RefError::TypeMismatch(_)));

        let number: u64 = proxy.call_as("next", Vec::new()).unwrap();
        assert_eq!(number, 41);
    }
}
