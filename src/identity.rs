//! Reference identity derivation for the binding layer.
//!
//! A [`ReferenceIdentity`] is the canonical key under which descriptors,
//! gates, and pending local targets are cached. It is derived from the
//! declared interface name plus selector attributes (group, version, extra
//! qualifiers), with `${...}` placeholders substituted through an
//! environment-supplied [`PlaceholderResolver`] before the key is finalized.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{RefError, RefResult};

/// Prefix shared by every canonical reference identity.
///
/// Local targets are exported under the same naming scheme, which is what
/// lets an export notification be matched against a pending reference by
/// direct key equality.
pub const IDENTITY_PREFIX: &str = "ServiceReference";

/// Environment service that substitutes `${...}` placeholders.
///
/// Supplied by the hosting environment; the key builder consults it for
/// every placeholder it encounters. Returning `None` for a requested key
/// makes the enclosing build fail with [`RefError::Configuration`].
pub trait PlaceholderResolver: Send + Sync {
    /// Looks up the replacement value for a placeholder key.
    fn lookup(&self, key: &str) -> Option<String>;
}

impl PlaceholderResolver for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl PlaceholderResolver for BTreeMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Resolver backed by the process environment (`std::env::var`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl PlaceholderResolver for ProcessEnv {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Resolver that knows no placeholders.
///
/// Used by default when no environment is wired in; any `${...}` occurrence
/// then fails the build, which is the safe reading of an absent environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlaceholders;

impl PlaceholderResolver for NoPlaceholders {
    fn lookup(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Canonical identity of a requested reference.
///
/// Composed of the interface name, optional group and version selectors, and
/// a canonicalized extra attribute set. Two requests with the same resolved
/// parts produce byte-identical canonical strings regardless of attribute
/// insertion order, and therefore resolve to the same descriptor.
///
/// Immutable once constructed. Equality and hashing use the canonical
/// string only; the parts are kept for introspection.
///
/// # Examples
///
/// ```rust
/// use refgate::ReferenceKeyBuilder;
///
/// let a = ReferenceKeyBuilder::new("demo.Greeter")
///     .group("prod")
///     .version("1.0.0")
///     .attribute("cluster", "east")
///     .attribute("timeout", "500")
///     .build()
///     .unwrap();
///
/// // Attribute insertion order does not matter.
/// let b = ReferenceKeyBuilder::new("demo.Greeter")
///     .attribute("timeout", "500")
///     .attribute("cluster", "east")
///     .version("1.0.0")
///     .group("prod")
///     .build()
///     .unwrap();
///
/// assert_eq!(a, b);
/// assert_eq!(
///     a.canonical(),
///     "ServiceReference:demo.Greeter:1.0.0:prod:cluster=east:timeout=500"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ReferenceIdentity {
    interface: Arc<str>,
    group: Option<Arc<str>>,
    version: Option<Arc<str>>,
    attributes: BTreeMap<String, String>,
    canonical: Arc<str>,
}

impl ReferenceIdentity {
    /// The declared interface name.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// The resolved group selector, if any.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// The resolved version selector, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Extra attributes, canonicalized (sorted by key, placeholders resolved).
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// The full canonical identity string.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl fmt::Display for ReferenceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

// Equality and hashing on the canonical string only; the parts are
// redundant with it by construction.
impl PartialEq for ReferenceIdentity {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for ReferenceIdentity {}

impl std::hash::Hash for ReferenceIdentity {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for ReferenceIdentity {
    #[inline(always)]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReferenceIdentity {
    #[inline(always)]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

/// Builder deriving a [`ReferenceIdentity`] from declared reference parts.
///
/// All parts go through placeholder substitution before the canonical string
/// is assembled; attributes are sorted by key so insertion order never leaks
/// into the identity. Building fails with [`RefError::Configuration`] when
/// the interface name is empty after resolution or a placeholder cannot be
/// resolved.
///
/// # Examples
///
/// ```rust
/// use refgate::ReferenceKeyBuilder;
/// use std::collections::HashMap;
///
/// let mut env = HashMap::new();
/// env.insert("env.group".to_string(), "prod".to_string());
///
/// let from_placeholder = ReferenceKeyBuilder::new("demo.Greeter")
///     .group("${env.group}")
///     .resolver(&env)
///     .build()
///     .unwrap();
/// let literal = ReferenceKeyBuilder::new("demo.Greeter")
///     .group("prod")
///     .build()
///     .unwrap();
///
/// assert_eq!(from_placeholder, literal);
/// ```
pub struct ReferenceKeyBuilder<'r> {
    interface: String,
    group: Option<String>,
    version: Option<String>,
    attributes: BTreeMap<String, String>,
    resolver: Option<&'r dyn PlaceholderResolver>,
}

impl<'r> ReferenceKeyBuilder<'r> {
    /// Starts a builder for the given declared interface name.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            group: None,
            version: None,
            attributes: BTreeMap::new(),
            resolver: None,
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

    /// Adds one extra selector attribute. Last write per key wins.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds a batch of extra selector attributes.
    pub fn attributes<K, V>(mut self, attrs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in attrs {
            self.attributes.insert(k.into(), v.into());
        }
        self
    }

    /// Supplies the environment resolver for `${...}` placeholders.
    pub fn resolver(mut self, resolver: &'r dyn PlaceholderResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Resolves placeholders, canonicalizes, and produces the identity.
    pub fn build(self) -> RefResult<ReferenceIdentity> {
        let interface = resolve_placeholders(self.interface.trim(), self.resolver)?;
        if interface.is_empty() {
            return Err(RefError::Configuration(
                "reference interface cannot be determined".to_string(),
            ));
        }

        let group = self.resolve_selector(self.group.as_deref())?;
        let version = self.resolve_selector(self.version.as_deref())?;

        let mut attributes = BTreeMap::new();
        for (key, value) in &self.attributes {
            attributes.insert(key.clone(), resolve_placeholders(value, self.resolver)?);
        }

        let mut canonical = String::with_capacity(64);
        canonical.push_str(IDENTITY_PREFIX);
        canonical.push(':');
        canonical.push_str(&interface);
        canonical.push(':');
        canonical.push_str(version.as_deref().unwrap_or(""));
        canonical.push(':');
        canonical.push_str(group.as_deref().unwrap_or(""));
        for (key, value) in &attributes {
            canonical.push(':');
            canonical.push_str(key);
            canonical.push('=');
            canonical.push_str(value);
        }

        Ok(ReferenceIdentity {
            interface: interface.into(),
            group: group.map(Into::into),
            version: version.map(Into::into),
            attributes,
            canonical: canonical.into(),
        })
    }

    fn resolve_selector(&self, raw: Option<&str>) -> RefResult<Option<String>> {
        match raw {
            None => Ok(None),
            Some(raw) => {
                let resolved = resolve_placeholders(raw, self.resolver)?;
                // A selector that resolves to nothing selects nothing.
                if resolved.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(resolved))
                }
            }
        }
    }
}

/// Substitutes every `${key}` occurrence in `raw` through the resolver.
///
/// Fails with [`RefError::Configuration`] on an unterminated placeholder or
/// a key the resolver does not know.
fn resolve_placeholders(
    raw: &str,
    resolver: Option<&dyn PlaceholderResolver>,
) -> RefResult<String> {
    if !raw.contains("${") {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            RefError::Configuration(format!("unterminated placeholder in `{}`", raw))
        })?;
        let key = &after[..end];
        let value = resolver.and_then(|r| r.lookup(key)).ok_or_else(|| {
            RefError::Configuration(format!("unresolved placeholder `${{{}}}` in `{}`", key, raw))
        })?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
