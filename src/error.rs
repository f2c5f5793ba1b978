//! Error types for reference binding and proxy dispatch.

use std::fmt;

/// Type-erased error produced by target factories and bound targets.
///
/// Target errors cross the dispatch boundary boxed so the gate can
/// propagate them without knowing their concrete type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Reference binding errors
///
/// Represents the error conditions that can occur while deriving a reference
/// identity, producing a target, or dispatching a call through a bound proxy.
///
/// The layer never masks or downgrades target failures: `Invocation` carries
/// the target's original error and its `Display` output is the inner
/// message, verbatim.
///
/// # Examples
///
/// ```rust
/// use refgate::{RefError, ReferenceKeyBuilder};
///
/// // Missing interface surfaces as a configuration error at build time.
/// match ReferenceKeyBuilder::new("").build() {
///     Err(RefError::Configuration(msg)) => {
///         assert!(msg.contains("interface"));
///     }
///     _ => unreachable!(),
/// }
///
/// // Invocation errors display the target's message unchanged.
/// let err = RefError::Invocation("boom".into());
/// assert_eq!(err.to_string(), "boom");
/// ```
#[derive(Debug)]
pub enum RefError {
    /// Identity could not be derived (missing interface, unresolved placeholder)
    Configuration(String),
    /// The target factory failed to produce a bound object
    Binding(String),
    /// The bound target raised an error; propagated verbatim
    Invocation(BoxError),
    /// A dispatched return value failed to downcast to the requested type
    TypeMismatch(&'static str),
}

impl fmt::Display for RefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            RefError::Binding(msg) => write!(f, "binding failed: {}", msg),
            // Never wrap the target's message; callers match on it.
            RefError::Invocation(inner) => write!(f, "{}", inner),
            RefError::TypeMismatch(name) => write!(f, "type mismatch for: {}", name),
        }
    }
}

impl std::error::Error for RefError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RefError::Invocation(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

/// Result type for reference binding operations
///
/// A convenience alias for `Result<T, RefError>` used throughout refgate.
pub type RefResult<T> = Result<T, RefError>;
