//! Registration phase: shape validation and duplicate policy.
//!
//! Every discovered scope hands its marked callables to a [`Registrar`]. Each
//! callable is validated (static receiver, exactly one parameter, parameter
//! type equal to return type), stored under its primary key and, when it was
//! registered without an explicit name, considered for the scope's default
//! slot. Any failure here is fatal: the caller must abort startup.
//!
//! The first implicitly named callable seen for a `(type, scope)` pair wins
//! the default slot unless a later one is marked with `set_default`.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::transform_registry::{
    ErasedFn, RegistrationKey, SanitizerRegistry, TransformError, TransformHandle,
    TransformRegistry, DEFAULT_NAME,
};

/// How a callable is bound to its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// Scope-level function with no instance state
    Static,
    /// Method bound to an instance
    Instance,
}

/// Declared shape of a candidate callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub receiver: Receiver,
    /// Canonical type names of the parameters, in order
    pub parameters: Vec<String>,
    /// Canonical type name of the return value
    pub returns: String,
}

impl Signature {
    /// Signature of a static `fn(T) -> T`.
    pub fn unary<T: ?Sized>() -> Self {
        Self {
            receiver: Receiver::Static,
            parameters: vec![type_name::<T>().to_string()],
            returns: type_name::<T>().to_string(),
        }
    }
}

/// A candidate transform exposed by a scope.
#[derive(Clone)]
pub struct Callable {
    source_name: String,
    signature: Signature,
    type_id: Option<TypeId>,
    invoker: Arc<ErasedFn>,
}

impl Callable {
    /// Wrap a plain function pointer as a type-preserving transform.
    ///
    /// # Example
    ///
    /// ```
    /// use sanitizer::Callable;
    ///
    /// fn shout(value: String) -> String {
    ///     value.to_uppercase()
    /// }
    ///
    /// let callable = Callable::unary("shout", shout);
    /// assert_eq!(callable.source_name(), "shout");
    /// ```
    pub fn unary<T: Any>(source_name: impl Into<String>, func: fn(T) -> T) -> Self {
        let invoker: Arc<ErasedFn> = Arc::new(
            move |value: Box<dyn Any>| -> Result<Box<dyn Any>, TransformError> {
                let value = value.downcast::<T>().map_err(|_| TransformError::TypeMismatch {
                    expected: type_name::<T>().to_string(),
                    actual: "unknown".to_string(),
                })?;
                Ok(Box::new(func(*value)))
            },
        );

        Self {
            source_name: source_name.into(),
            signature: Signature::unary::<T>(),
            type_id: Some(TypeId::of::<T>()),
            invoker,
        }
    }

    /// Build a callable from a declared signature and an erased invoker.
    ///
    /// The signature is trusted only after [`Registrar::register`] has
    /// validated it.
    pub fn from_parts<F>(source_name: impl Into<String>, signature: Signature, invoker: F) -> Self
    where
        F: Fn(Box<dyn Any>) -> Result<Box<dyn Any>, TransformError> + Send + Sync + 'static,
    {
        Self {
            source_name: source_name.into(),
            signature,
            type_id: None,
            invoker: Arc::new(invoker),
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    fn to_handle(&self) -> TransformHandle {
        TransformHandle::new(
            self.source_name.clone(),
            self.signature.returns.clone(),
            self.type_id,
            Arc::clone(&self.invoker),
        )
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("source_name", &self.source_name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Registration marker attached to a callable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizerMarker {
    /// Explicit transform name; `None` or empty means "use the source name"
    pub name: Option<String>,
    /// Take the scope's default slot even if one is already set
    pub set_default: bool,
}

impl SanitizerMarker {
    pub fn implicit() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            set_default: false,
        }
    }

    pub fn forced_default(mut self) -> Self {
        self.set_default = true;
        self
    }

    fn explicit_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }
}

/// A discovered unit that declares sanitizers.
pub trait SanitizerScope {
    /// Name used as the scope part of every registration key
    fn scope_name(&self) -> &str;

    /// Marked callables, in declaration order
    fn sanitizers(&self) -> Vec<(Callable, SanitizerMarker)>;
}

/// Error type for the registration phase. All variants are fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    NotStatic {
        scope: String,
        source: String,
    },
    NoParameter {
        scope: String,
        source: String,
    },
    TooManyParameters {
        scope: String,
        source: String,
        count: usize,
    },
    ReturnTypeMismatch {
        scope: String,
        source: String,
        parameter: String,
        returns: String,
    },
    EmptySourceName {
        scope: String,
    },
    ReservedName {
        scope: String,
        source: String,
    },
    Duplicate {
        key: RegistrationKey,
    },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::NotStatic { scope, source } => {
                write!(f, "Sanitizer must be a static function: {}::{}", scope, source)
            }
            RegistrationError::NoParameter { scope, source } => write!(
                f,
                "Sanitizer must accept one parameter but no parameter found: {}::{}",
                scope, source
            ),
            RegistrationError::TooManyParameters { scope, source, count } => write!(
                f,
                "Sanitizer can only accept one parameter but {} parameters found: {}::{}",
                count, scope, source
            ),
            RegistrationError::ReturnTypeMismatch {
                scope,
                source,
                parameter,
                returns,
            } => write!(
                f,
                "Sanitizer must return the same type as the parameter ({} != {}): {}::{}",
                returns, parameter, scope, source
            ),
            RegistrationError::EmptySourceName { scope } => {
                write!(f, "Sanitizer in scope '{}' has an empty source name", scope)
            }
            RegistrationError::ReservedName { scope, source } => write!(
                f,
                "Sanitizer name '{}' is reserved: {}::{}",
                DEFAULT_NAME, scope, source
            ),
            RegistrationError::Duplicate { key } => write!(
                f,
                "Duplicated sanitizer by key [{}], please specify a distinguishing name for it",
                key
            ),
        }
    }
}

impl std::error::Error for RegistrationError {}

/// Owner of the registry during the registration phase.
///
/// # Example
///
/// ```
/// use sanitizer::{Callable, Registrar, SanitizerMarker};
///
/// fn trim(value: String) -> String {
///     value.trim().to_string()
/// }
///
/// let mut registrar = Registrar::new();
/// registrar
///     .register("forms", Callable::unary("trim", trim), &SanitizerMarker::implicit())
///     .unwrap();
///
/// let registry = registrar.finish();
/// let transform = registry
///     .resolve(std::any::type_name::<String>(), "forms", "default", "default", true)
///     .unwrap();
/// assert_eq!(transform.apply(" x ".to_string()).unwrap(), "x");
/// ```
#[derive(Debug, Default)]
pub struct Registrar {
    registry: TransformRegistry,
}

impl Registrar {
    pub fn new() -> Self {
        Self {
            registry: TransformRegistry::new(),
        }
    }

    /// Validate and store one callable declared by `scope`.
    pub fn register(
        &mut self,
        scope: &str,
        callable: Callable,
        marker: &SanitizerMarker,
    ) -> Result<(), RegistrationError> {
        let value_type = validate_shape(scope, &callable)?;
        let source = callable.source_name();

        let (transform_name, implicit) = match marker.explicit_name() {
            Some(name) => (name, false),
            None => (source, true),
        };
        if transform_name == DEFAULT_NAME {
            return Err(RegistrationError::ReservedName {
                scope: scope.to_string(),
                source: source.to_string(),
            });
        }

        let key = RegistrationKey::new(value_type, scope, transform_name, source);
        if self.registry.exists(&key) {
            tracing::error!("Rejecting duplicated sanitizer [{}]", key);
            return Err(RegistrationError::Duplicate { key });
        }
        let default_key = key.to_default();
        tracing::info!("Caching sanitizer [{}]", key);
        self.registry.put(key, callable.to_handle());

        if implicit && (marker.set_default || !self.registry.exists(&default_key)) {
            tracing::info!("Caching default sanitizer [{}]", default_key);
            self.registry.put(default_key, callable.to_handle());
        }

        Ok(())
    }

    /// Register every marked callable of a scope, stopping at the first error.
    pub fn register_scope(&mut self, scope: &dyn SanitizerScope) -> Result<usize, RegistrationError> {
        let scope_name = scope.scope_name();
        let mut count = 0;
        for (callable, marker) in scope.sanitizers() {
            self.register(scope_name, callable, &marker)?;
            count += 1;
        }
        tracing::debug!("Registered {} sanitizers from scope '{}'", count, scope_name);
        Ok(count)
    }

    /// The registry populated so far
    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    /// End the registration phase and publish the read-only registry.
    pub fn finish(self) -> SanitizerRegistry {
        tracing::info!("Sanitizer registry ready with {} entries", self.registry.len());
        SanitizerRegistry::new(self.registry)
    }
}

/// Check the declared shape and return the value type name.
fn validate_shape<'a>(scope: &str, callable: &'a Callable) -> Result<&'a str, RegistrationError> {
    let source = callable.source_name();
    let signature = callable.signature();

    if source.is_empty() {
        return Err(RegistrationError::EmptySourceName {
            scope: scope.to_string(),
        });
    }
    if signature.receiver != Receiver::Static {
        return Err(RegistrationError::NotStatic {
            scope: scope.to_string(),
            source: source.to_string(),
        });
    }

    let parameter = match signature.parameters.as_slice() {
        [] => {
            return Err(RegistrationError::NoParameter {
                scope: scope.to_string(),
                source: source.to_string(),
            })
        }
        [parameter] => parameter,
        parameters => {
            return Err(RegistrationError::TooManyParameters {
                scope: scope.to_string(),
                source: source.to_string(),
                count: parameters.len(),
            })
        }
    };

    if *parameter != signature.returns {
        return Err(RegistrationError::ReturnTypeMismatch {
            scope: scope.to_string(),
            source: source.to_string(),
            parameter: parameter.clone(),
            returns: signature.returns.clone(),
        });
    }

    Ok(parameter.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::MatchRule;
    use crate::transform_registry::RequestKey;

    fn upper(value: String) -> String {
        value.to_uppercase()
    }

    fn lower(value: String) -> String {
        value.to_lowercase()
    }

    fn double(value: i64) -> i64 {
        value * 2
    }

    fn passthrough(value: Box<dyn Any>) -> Result<Box<dyn Any>, TransformError> {
        Ok(value)
    }

    fn shaped(receiver: Receiver, parameters: &[&str], returns: &str) -> Callable {
        let signature = Signature {
            receiver,
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            returns: returns.to_string(),
        };
        Callable::from_parts("shaped", signature, passthrough)
    }

    fn string_type() -> String {
        type_name::<String>().to_string()
    }

    #[test]
    fn test_rejects_instance_receiver() {
        let mut registrar = Registrar::new();
        let callable = shaped(Receiver::Instance, &["String"], "String");

        let err = registrar
            .register("forms", callable, &SanitizerMarker::implicit())
            .unwrap_err();
        assert!(matches!(err, RegistrationError::NotStatic { .. }));
        assert!(registrar.registry().is_empty());
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let mut registrar = Registrar::new();

        let err = registrar
            .register("forms", shaped(Receiver::Static, &[], "String"), &SanitizerMarker::implicit())
            .unwrap_err();
        assert!(matches!(err, RegistrationError::NoParameter { .. }));

        let err = registrar
            .register(
                "forms",
                shaped(Receiver::Static, &["String", "String"], "String"),
                &SanitizerMarker::implicit(),
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationError::TooManyParameters { count: 2, .. }));
    }

    #[test]
    fn test_rejects_type_changing_transform() {
        let mut registrar = Registrar::new();
        let callable = shaped(Receiver::Static, &["String"], "Option<String>");

        let err = registrar
            .register("forms", callable, &SanitizerMarker::implicit())
            .unwrap_err();
        assert!(err.to_string().contains("same type"));
    }

    #[test]
    fn test_rejects_reserved_name() {
        let mut registrar = Registrar::new();

        let err = registrar
            .register("forms", Callable::unary("upper", upper), &SanitizerMarker::named(DEFAULT_NAME))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::ReservedName { .. }));

        let err = registrar
            .register("forms", Callable::unary(DEFAULT_NAME, upper), &SanitizerMarker::implicit())
            .unwrap_err();
        assert!(matches!(err, RegistrationError::ReservedName { .. }));
    }

    #[test]
    fn test_duplicate_slot_requires_distinguishing_name() {
        let mut registrar = Registrar::new();
        registrar
            .register("forms", Callable::unary("upper", upper), &SanitizerMarker::named("case"))
            .unwrap();

        let err = registrar
            .register("forms", Callable::unary("lower", lower), &SanitizerMarker::named("case"))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Duplicate { .. }));
        assert!(err.to_string().contains("distinguishing name"));

        registrar
            .register("forms", Callable::unary("lower", lower), &SanitizerMarker::named("lower_case"))
            .unwrap();
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_rejected_duplicate_is_not_logged_as_cached() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut registrar = Registrar::new();
            registrar
                .register("forms", Callable::unary("upper", upper), &SanitizerMarker::named("case"))
                .unwrap();
            registrar
                .register("forms", Callable::unary("lower", lower), &SanitizerMarker::named("case"))
                .unwrap_err();
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.matches("Caching sanitizer").count(), 1);
        assert!(output.contains("Rejecting duplicated sanitizer"));
        assert!(output.contains("(source: lower)"));
    }

    #[test]
    fn test_explicit_name_is_not_promoted_to_default() {
        let mut registrar = Registrar::new();
        registrar
            .register("forms", Callable::unary("upper", upper), &SanitizerMarker::named("case"))
            .unwrap();

        let default_key = RegistrationKey::new(string_type(), "forms", DEFAULT_NAME, "upper");
        assert!(!registrar.registry().exists(&default_key));
        assert_eq!(registrar.registry().len(), 1);
    }

    #[test]
    fn test_empty_explicit_name_counts_as_implicit() {
        let mut registrar = Registrar::new();
        registrar
            .register("forms", Callable::unary("upper", upper), &SanitizerMarker::named(""))
            .unwrap();

        let primary = RegistrationKey::new(string_type(), "forms", "upper", "upper");
        assert!(registrar.registry().exists(&primary));
        assert!(registrar.registry().exists(&primary.to_default()));
    }

    #[test]
    fn test_first_implicit_registration_wins_default() {
        let mut registrar = Registrar::new();
        registrar
            .register("forms", Callable::unary("upper", upper), &SanitizerMarker::implicit())
            .unwrap();
        registrar
            .register("forms", Callable::unary("lower", lower), &SanitizerMarker::implicit())
            .unwrap();

        let registry = registrar.finish();
        let request = RequestKey::for_type::<String>("forms", DEFAULT_NAME);
        let found = registry.resolve_request(&request, true).unwrap();
        assert_eq!(found.rule, MatchRule::TypeScopeDefault);
        assert_eq!(found.transform.source_name(), "upper");
    }

    #[test]
    fn test_forced_default_overrides_first_registration() {
        let mut registrar = Registrar::new();
        registrar
            .register("forms", Callable::unary("upper", upper), &SanitizerMarker::implicit())
            .unwrap();
        registrar
            .register(
                "forms",
                Callable::unary("lower", lower),
                &SanitizerMarker::implicit().forced_default(),
            )
            .unwrap();

        let registry = registrar.finish();
        let transform = registry
            .resolve(&string_type(), "forms", DEFAULT_NAME, DEFAULT_NAME, true)
            .unwrap();
        assert_eq!(transform.source_name(), "lower");
        assert_eq!(transform.apply("MiXeD".to_string()).unwrap(), "mixed");
    }

    #[test]
    fn test_defaults_are_tracked_per_type() {
        let mut registrar = Registrar::new();
        registrar
            .register("math", Callable::unary("double", double), &SanitizerMarker::implicit())
            .unwrap();
        registrar
            .register("math", Callable::unary("upper", upper), &SanitizerMarker::implicit())
            .unwrap();

        let registry = registrar.finish();
        let int_default = registry
            .resolve(type_name::<i64>(), "math", DEFAULT_NAME, DEFAULT_NAME, true)
            .unwrap();
        assert_eq!(int_default.apply(21_i64).unwrap(), 42);

        let string_default = registry
            .resolve(&string_type(), "math", DEFAULT_NAME, DEFAULT_NAME, true)
            .unwrap();
        assert_eq!(string_default.source_name(), "upper");
    }

    struct FormScope;

    impl SanitizerScope for FormScope {
        fn scope_name(&self) -> &str {
            "forms"
        }

        fn sanitizers(&self) -> Vec<(Callable, SanitizerMarker)> {
            vec![
                (Callable::unary("upper", upper), SanitizerMarker::implicit()),
                (Callable::unary("lower", lower), SanitizerMarker::named("quiet")),
            ]
        }
    }

    #[test]
    fn test_register_scope_counts_callables() {
        let mut registrar = Registrar::new();
        let count = registrar.register_scope(&FormScope).unwrap();

        assert_eq!(count, 2);
        // upper, its default slot, and quiet
        assert_eq!(registrar.registry().len(), 3);
    }

    #[test]
    fn test_register_scope_twice_is_duplicate() {
        let mut registrar = Registrar::new();
        registrar.register_scope(&FormScope).unwrap();

        let err = registrar.register_scope(&FormScope).unwrap_err();
        assert!(matches!(err, RegistrationError::Duplicate { .. }));
    }
}
