//! Call-site interception contract.
//!
//! The layer that marks parameters lives outside this crate. For each marked
//! parameter it builds a request key, asks the registry for a named match,
//! falls back to the default tiers, invokes the transform and substitutes the
//! result before the wrapped call proceeds. [`Interceptor`] is that sequence.

use std::any::{type_name, Any};
use std::fmt;

use crate::transform_registry::{RequestKey, SanitizerRegistry, TransformError, DEFAULT_NAME};

/// Marker on a parameter that should be sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// Requested transform name; the reserved default when omitted
    pub name: String,
    /// Source identifier to match by origin; falls back to `name`
    pub origin: Option<String>,
}

impl Sanitized {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    fn origin_hint(&self) -> &str {
        self.origin.as_deref().unwrap_or(&self.name)
    }
}

impl Default for Sanitized {
    fn default() -> Self {
        Self::named(DEFAULT_NAME)
    }
}

/// The call being intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite<'a> {
    /// Scope that declares the callable
    pub scope: &'a str,
    /// Name of the callable, used in error messages
    pub callable: &'a str,
}

impl<'a> CallSite<'a> {
    pub fn new(scope: &'a str, callable: &'a str) -> Self {
        Self { scope, callable }
    }
}

/// Error surfaced to the caller of an intercepted function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptError {
    Unresolved {
        index: usize,
        callable: String,
    },
    Transform {
        index: usize,
        callable: String,
        source: TransformError,
    },
}

impl fmt::Display for InterceptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptError::Unresolved { index, callable } => {
                write!(f, "No default sanitizer found for the {}th arg of {}", index, callable)
            }
            InterceptError::Transform {
                index,
                callable,
                source,
            } => write!(
                f,
                "Sanitizer failed on the {}th arg of {}: {}",
                index, callable, source
            ),
        }
    }
}

impl std::error::Error for InterceptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InterceptError::Unresolved { .. } => None,
            InterceptError::Transform { source, .. } => Some(source),
        }
    }
}

/// Applies registered sanitizers to marked arguments.
///
/// # Example
///
/// ```
/// use sanitizer::builtins::WhitespaceScope;
/// use sanitizer::runtime::{CallSite, Interceptor, Sanitized};
/// use sanitizer::Registrar;
///
/// let mut registrar = Registrar::new();
/// registrar.register_scope(&WhitespaceScope).unwrap();
/// let interceptor = Interceptor::new(registrar.finish());
///
/// let site = CallSite::new("app::users", "create_user");
/// let name = interceptor
///     .sanitize_arg(&site, 0, &Sanitized::default(), "  Ada\u{00A0}\u{00A0}Lovelace ".to_string())
///     .unwrap();
/// assert_eq!(name, "Ada Lovelace");
/// ```
#[derive(Debug, Clone)]
pub struct Interceptor {
    registry: SanitizerRegistry,
}

impl Interceptor {
    pub fn new(registry: SanitizerRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SanitizerRegistry {
        &self.registry
    }

    /// Sanitize the argument at `index` of the call described by `site`.
    ///
    /// Tries the named tiers first and the default tiers second. A miss on
    /// both is an [`InterceptError::Unresolved`]. Panics raised by the
    /// transform itself are not caught.
    pub fn sanitize_arg<T: Any>(
        &self,
        site: &CallSite<'_>,
        index: usize,
        marker: &Sanitized,
        value: T,
    ) -> Result<T, InterceptError> {
        let request = RequestKey::new(type_name::<T>(), site.scope, &marker.name, marker.origin_hint());

        let resolution = match self.registry.resolve_request(&request, false) {
            Some(found) => found,
            None => {
                tracing::warn!(
                    "No sanitizer found by key [{}] for the {}th arg of {}",
                    request,
                    index,
                    site.callable
                );
                let found = self.registry.resolve_request(&request, true).ok_or_else(|| {
                    InterceptError::Unresolved {
                        index,
                        callable: site.callable.to_string(),
                    }
                })?;
                tracing::info!("Using default sanitizer [{}]", found.key);
                found
            }
        };

        tracing::debug!(
            "Invoking sanitizer [{}] on the {}th arg of {}",
            resolution.key,
            index,
            site.callable
        );
        resolution
            .transform
            .apply(value)
            .map_err(|source| InterceptError::Transform {
                index,
                callable: site.callable.to_string(),
                source,
            })
    }
}
