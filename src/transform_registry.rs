//! Transform registry for storing type-preserving sanitizers.
//!
//! This module provides the storage side of the sanitizer system: composite
//! registration keys, erased transform handles and the registry that maps one
//! to the other. Lookup is delegated to the cascade in [`crate::resolution`].

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::map::MutableKeys;
use indexmap::IndexMap;

use crate::resolution::{self, Resolution};

/// Reserved transform name of a scope's fallback transform for a type.
///
/// Registration rejects this value as an explicit or implicit name, so a
/// user-chosen name can never collide with it.
pub const DEFAULT_NAME: &str = "default";

/// Error type for transform invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    TypeMismatch {
        expected: String,
        actual: String,
    },
    ExecutionError(String),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::TypeMismatch { expected, actual } => {
                write!(f, "Type mismatch: transform accepts {}, got {}", expected, actual)
            }
            TransformError::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
        }
    }
}

impl std::error::Error for TransformError {}

/// Erased unary function stored behind a [`TransformHandle`].
pub type ErasedFn = dyn Fn(Box<dyn Any>) -> Result<Box<dyn Any>, TransformError> + Send + Sync;

/// A registered transform. The engine never inspects the body, only the
/// metadata carried alongside it.
#[derive(Clone)]
pub struct TransformHandle {
    source_name: String,
    value_type: String,
    /// Known for typed callables; dynamic ones are checked by name only
    type_id: Option<TypeId>,
    func: Arc<ErasedFn>,
}

impl TransformHandle {
    pub(crate) fn new(
        source_name: String,
        value_type: String,
        type_id: Option<TypeId>,
        func: Arc<ErasedFn>,
    ) -> Self {
        Self {
            source_name,
            value_type,
            type_id,
            func,
        }
    }

    fn accepts<T: Any>(&self) -> bool {
        match self.type_id {
            Some(type_id) => type_id == TypeId::of::<T>(),
            None => self.value_type == type_name::<T>(),
        }
    }

    /// Source identifier of the underlying function.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Canonical name of the type the transform accepts and returns.
    pub fn value_type(&self) -> &str {
        &self.value_type
    }

    /// Apply the transform to a value of its registered type.
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - The transformed value
    /// * `Err(TransformError::TypeMismatch)` - `T` is not the registered type
    /// * `Err(TransformError::ExecutionError)` - A dynamic callable reported failure
    pub fn apply<T: Any>(&self, value: T) -> Result<T, TransformError> {
        if !self.accepts::<T>() {
            return Err(TransformError::TypeMismatch {
                expected: self.value_type.clone(),
                actual: type_name::<T>().to_string(),
            });
        }

        let output = (self.func)(Box::new(value))?;
        output
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| TransformError::TypeMismatch {
                expected: type_name::<T>().to_string(),
                actual: format!("output of {}", self.source_name),
            })
    }
}

impl fmt::Debug for TransformHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformHandle")
            .field("source_name", &self.source_name)
            .field("value_type", &self.value_type)
            .finish_non_exhaustive()
    }
}

/// Identity of a stored transform.
///
/// Two keys address the same storage slot iff `value_type`, `scope` and
/// `transform_name` are equal. `source_name` is carried for the by-origin
/// match rules but is excluded from equality and hashing.
#[derive(Debug, Clone)]
pub struct RegistrationKey {
    pub value_type: String,
    pub scope: String,
    pub transform_name: String,
    pub source_name: String,
}

impl RegistrationKey {
    pub fn new(
        value_type: impl Into<String>,
        scope: impl Into<String>,
        transform_name: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            value_type: value_type.into(),
            scope: scope.into(),
            transform_name: transform_name.into(),
            source_name: source_name.into(),
        }
    }

    /// The reserved-default slot for the same type and scope.
    pub fn to_default(&self) -> Self {
        Self {
            transform_name: DEFAULT_NAME.to_string(),
            ..self.clone()
        }
    }

    pub fn is_default(&self) -> bool {
        self.transform_name == DEFAULT_NAME
    }
}

impl PartialEq for RegistrationKey {
    fn eq(&self, other: &Self) -> bool {
        self.value_type == other.value_type
            && self.scope == other.scope
            && self.transform_name == other.transform_name
    }
}

impl Eq for RegistrationKey {}

impl Hash for RegistrationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value_type.hash(state);
        self.scope.hash(state);
        self.transform_name.hash(state);
    }
}

impl fmt::Display for RegistrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}<{}> (source: {})",
            self.scope, self.transform_name, self.value_type, self.source_name
        )
    }
}

/// Shape of a lookup. `origin_hint` is compared against the stored
/// `source_name` by the by-origin rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
    pub value_type: String,
    pub scope: String,
    pub transform_name: String,
    pub origin_hint: String,
}

impl RequestKey {
    pub fn new(
        value_type: impl Into<String>,
        scope: impl Into<String>,
        transform_name: impl Into<String>,
        origin_hint: impl Into<String>,
    ) -> Self {
        Self {
            value_type: value_type.into(),
            scope: scope.into(),
            transform_name: transform_name.into(),
            origin_hint: origin_hint.into(),
        }
    }

    /// Request for a value of type `T`, using the name as origin hint.
    pub fn for_type<T: ?Sized>(scope: impl Into<String>, transform_name: impl Into<String>) -> Self {
        let transform_name = transform_name.into();
        Self {
            value_type: type_name::<T>().to_string(),
            scope: scope.into(),
            origin_hint: transform_name.clone(),
            transform_name,
        }
    }

    pub fn with_origin(mut self, origin_hint: impl Into<String>) -> Self {
        self.origin_hint = origin_hint.into();
        self
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}<{}> (origin: {})",
            self.scope, self.transform_name, self.value_type, self.origin_hint
        )
    }
}

/// Registry for storing sanitizer transforms by composite key.
///
/// The registry is a pure data structure: duplicate policy lives in
/// [`crate::registration`] and lookup order in [`crate::resolution`].
/// Entries iterate in insertion order.
#[derive(Debug, Default, Clone)]
pub struct TransformRegistry {
    entries: IndexMap<RegistrationKey, TransformHandle>,
}

impl TransformRegistry {
    /// Create a new empty transform registry
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Check if the slot addressed by `key` is occupied
    pub fn exists(&self, key: &RegistrationKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite the slot addressed by `key`.
    ///
    /// An overwrite keeps the slot's position and replaces both the stored key
    /// (so its `source_name` follows the new transform) and the transform.
    pub fn put(&mut self, key: RegistrationKey, transform: TransformHandle) {
        if let Some((_, stored_key, stored)) = self.entries.get_full_mut2(&key) {
            *stored_key = key;
            *stored = transform;
        } else {
            self.entries.insert(key, transform);
        }
    }

    /// Resolve a request through the rule cascade.
    pub fn get(&self, request: &RequestKey, want_default: bool) -> Option<&TransformHandle> {
        self.resolve(request, want_default).map(|found| found.transform)
    }

    /// Resolve a request and report which rule matched.
    pub fn resolve(&self, request: &RequestKey, want_default: bool) -> Option<Resolution<'_>> {
        resolution::cascade(&self.entries, request, want_default)
    }

    /// Iterate over stored entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = (&RegistrationKey, &TransformHandle)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-only, shareable handle over a fully populated registry.
///
/// Built once by [`crate::registration::Registrar::finish`] at the end of the
/// registration phase and handed to every collaborator by clone. Lookups need
/// no locking because nothing can write through this handle.
#[derive(Debug, Clone)]
pub struct SanitizerRegistry {
    inner: Arc<TransformRegistry>,
}

impl SanitizerRegistry {
    pub(crate) fn new(registry: TransformRegistry) -> Self {
        Self {
            inner: Arc::new(registry),
        }
    }

    /// Resolve a transform for the given request fields.
    ///
    /// Returns `None` on a miss; it never fails.
    pub fn resolve(
        &self,
        value_type: &str,
        scope: &str,
        transform_name: &str,
        origin_hint: &str,
        want_default: bool,
    ) -> Option<&TransformHandle> {
        let request = RequestKey::new(value_type, scope, transform_name, origin_hint);
        self.inner.get(&request, want_default)
    }

    pub fn resolve_request(&self, request: &RequestKey, want_default: bool) -> Option<Resolution<'_>> {
        self.inner.resolve(request, want_default)
    }

    pub fn exists(&self, key: &RegistrationKey) -> bool {
        self.inner.exists(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&RegistrationKey, &TransformHandle)> {
        self.inner.entries()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(source: &str) -> TransformHandle {
        let func: Arc<ErasedFn> = Arc::new(|value: Box<dyn Any>| Ok::<_, TransformError>(value));
        TransformHandle::new(source.to_string(), type_name::<String>().to_string(), None, func)
    }

    #[test]
    fn test_key_identity_excludes_source_name() {
        let a = RegistrationKey::new("String", "forms", "trim", "trim_v1");
        let b = RegistrationKey::new("String", "forms", "trim", "trim_v2");
        let c = RegistrationKey::new("String", "forms", "collapse", "trim_v1");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut registry = TransformRegistry::new();
        registry.put(a, handle("trim_v1"));
        assert!(registry.exists(&b));
        assert!(!registry.exists(&c));
    }

    #[test]
    fn test_put_overwrites_slot_and_stored_key() {
        let mut registry = TransformRegistry::new();
        let first = RegistrationKey::new("String", "forms", DEFAULT_NAME, "first");
        let second = RegistrationKey::new("String", "forms", DEFAULT_NAME, "second");

        registry.put(first, handle("first"));
        registry.put(second, handle("second"));

        assert_eq!(registry.len(), 1);
        let (key, transform) = registry.entries().next().unwrap();
        assert_eq!(key.source_name, "second");
        assert_eq!(transform.source_name(), "second");
    }

    #[test]
    fn test_exists_after_put() {
        let mut registry = TransformRegistry::new();
        let key = RegistrationKey::new("String", "forms", "trim", "trim");

        assert!(!registry.exists(&key));
        registry.put(key.clone(), handle("trim"));
        assert!(registry.exists(&key));
    }

    #[test]
    fn test_apply_rejects_wrong_type() {
        let transform = handle("identity");

        assert_eq!(transform.apply("abc".to_string()).unwrap(), "abc");
        let result = transform.apply(42_u32);
        assert!(matches!(result, Err(TransformError::TypeMismatch { .. })));
    }

    #[test]
    fn test_apply_checks_type_id_over_type_name() {
        let func: Arc<ErasedFn> = Arc::new(|value: Box<dyn Any>| Ok::<_, TransformError>(value));
        let transform = TransformHandle::new(
            "mislabeled".to_string(),
            type_name::<u32>().to_string(),
            Some(TypeId::of::<String>()),
            func,
        );

        let result = transform.apply(7_u32);
        assert!(matches!(result, Err(TransformError::TypeMismatch { .. })));
        assert_eq!(transform.apply("ok".to_string()).unwrap(), "ok");
    }

    #[test]
    fn test_default_key_shares_type_and_scope() {
        let key = RegistrationKey::new("String", "forms", "trim", "trim");
        let default = key.to_default();

        assert!(default.is_default());
        assert_eq!(default.scope, "forms");
        assert_eq!(default.source_name, "trim");
        assert_ne!(key, default);
    }
}
