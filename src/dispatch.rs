//! Type-erased target dispatch.
//!
//! Rust has no runtime proxy generation, so the "every interface method
//! forwards to one dispatch function" contract is expressed directly: a
//! bound target is a [`TargetDispatcher`], and typed interface facades are
//! thin adapters that forward each method as a `(name, args)` pair. The
//! [`FnDispatcher`] adapter covers the common case of backing a target with
//! a single closure.

use std::any::Any;
use std::fmt;

use crate::error::BoxError;

/// Type-erased argument or return value crossing the dispatch boundary.
pub type AnyValue = Box<dyn Any + Send>;

/// Boxes a value for use as a dispatch argument.
///
/// Sugar over `Box::new` that fixes the type-erased coercion in place, so
/// call sites can write `value(42u32)` instead of an explicit cast.
pub fn value<T: Send + 'static>(v: T) -> AnyValue {
    Box::new(v)
}

/// A bound target: one dispatch function serving an entire interface.
///
/// Implementations receive the method name and positional arguments and
/// return the type-erased result. Errors are returned boxed; adapters that
/// uniformly envelope target failures (see [`FnDispatcher`]) wrap them in
/// [`TargetError`], which the gate strips before propagating.
pub trait TargetDispatcher: Send + Sync {
    /// Dispatches one method call against the target.
    fn dispatch(&self, method: &str, args: Vec<AnyValue>) -> Result<AnyValue, BoxError>;
}

impl fmt::Debug for dyn TargetDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TargetDispatcher")
    }
}

/// Uniform envelope around errors raised inside a dispatched target.
///
/// Mirrors reflective invocation-target wrappers: the dispatch mechanism
/// wraps whatever the target raised, and the gate unwraps the envelope so
/// callers see the original failure, not the mechanism's.
#[derive(Debug)]
pub struct TargetError(BoxError);

impl TargetError {
    /// Wraps a target failure in the uniform envelope.
    pub fn new(inner: BoxError) -> Self {
        Self(inner)
    }

    /// Recovers the original target error.
    pub fn into_inner(self) -> BoxError {
        self.0
    }
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target invocation failed: {}", self.0)
    }
}

impl std::error::Error for TargetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// Strips the [`TargetError`] envelope if one is present.
///
/// Custom dispatchers are free to return bare errors; those pass through
/// untouched.
pub(crate) fn unwrap_target_error(err: BoxError) -> BoxError {
    match err.downcast::<TargetError>() {
        Ok(envelope) => envelope.into_inner(),
        Err(err) => err,
    }
}

/// Dispatcher backed by a single closure.
///
/// Every error the closure returns is wrapped in the [`TargetError`]
/// envelope before it reaches the gate, matching the uniform-envelope
/// contract the gate unwraps against.
///
/// # Examples
///
/// ```rust
/// use refgate::{AnyValue, FnDispatcher, TargetDispatcher, value};
///
/// let target = FnDispatcher::new(|method: &str, mut args: Vec<AnyValue>| {
///     match method {
///         "greet" => {
///             let name = args
///                 .remove(0)
///                 .downcast::<String>()
///                 .map_err(|_| "greet expects a string name")?;
///             Ok(value(format!("Hello, {}", name)))
///         }
///         other => Err(format!("unknown method `{}`", other).into()),
///     }
/// });
///
/// let result = target.dispatch("greet", vec![value("Ann".to_string())]).unwrap();
/// assert_eq!(*result.downcast::<String>().unwrap(), "Hello, Ann");
/// ```
pub struct FnDispatcher<F> {
    call: F,
}

impl<F> FnDispatcher<F>
where
    F: Fn(&str, Vec<AnyValue>) -> Result<AnyValue, BoxError> + Send + Sync,
{
    /// Wraps a dispatch closure.
    pub fn new(call: F) -> Self {
        Self { call }
    }
}

impl<F> TargetDispatcher for FnDispatcher<F>
where
    F: Fn(&str, Vec<AnyValue>) -> Result<AnyValue, BoxError> + Send + Sync,
{
    fn dispatch(&self, method: &str, args: Vec<AnyValue>) -> Result<AnyValue, BoxError> {
        (self.call)(method, args).map_err(|err| Box::new(TargetError::new(err)) as BoxError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fn_dispatcher_envelopes_target_errors() {
        let target = FnDispatcher::new(|_method: &str, _args| Err("boom".into()));
        let err = target.dispatch("greet", Vec::new()).unwrap_err();
        let envelope = err.downcast::<TargetError>().expect("uniform envelope");
        assert_eq!(envelope.into_inner().to_string(), "boom");
    }

    #[test]
    fn unwrap_passes_bare_errors_through() {
        let bare: BoxError = "plain".into();
        assert_eq!(unwrap_target_error(bare).to_string(), "plain");

        let wrapped: BoxError = Box::new(TargetError::new("inner".into()));
        assert_eq!(unwrap_target_error(wrapped).to_string(), "inner");
    }

    #[test]
    fn envelope_display_and_source_expose_the_inner_error() {
        use std::error::Error;
        let envelope = TargetError::new("inner".into());
        assert_eq!(envelope.to_string(), "target invocation failed: inner");
        assert_eq!(envelope.source().unwrap().to_string(), "inner");
    }
}
