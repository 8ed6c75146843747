//! # Sanitizer: Parameter Sanitization Registry
//!
//! Sanitizer lets a caller mark individual parameters as "sanitizable" and
//! have a registered, type-preserving transform applied to the argument right
//! before the function body runs.
//!
//! ## Features
//!
//! - **Transform registry**: Composite keys of value type, declaring scope,
//!   transform name and source name
//! - **Cascading resolution**: Six ordered match rules from most to least
//!   specific, with a separate default tier
//! - **Registration validation**: Shape checks, duplicate detection and
//!   "first implicit registration wins the default" policy
//! - **Whitespace normalization**: Unicode-aware collapsing of space-like and
//!   invisible characters
//! - **YAML manifests**: Bind built-in sanitizers into application scopes
//!
//! ## Example
//!
//! ```
//! use sanitizer::{Callable, Registrar, SanitizerMarker};
//! use sanitizer::builtins::WhitespaceScope;
//! use sanitizer::runtime::{CallSite, Interceptor, Sanitized};
//!
//! fn shout(value: String) -> String {
//!     value.to_uppercase()
//! }
//!
//! let mut registrar = Registrar::new();
//! registrar.register_scope(&WhitespaceScope).unwrap();
//! registrar
//!     .register("app::users", Callable::unary("shout", shout), &SanitizerMarker::named("loud"))
//!     .unwrap();
//! let interceptor = Interceptor::new(registrar.finish());
//!
//! let site = CallSite::new("app::users", "greet");
//! let loud = interceptor
//!     .sanitize_arg(&site, 0, &Sanitized::named("loud"), "hi".to_string())
//!     .unwrap();
//! assert_eq!(loud, "HI");
//! ```

// Core modules
pub mod transform_registry;
pub mod resolution;
pub mod registration;
pub mod whitespace;
pub mod builtins;

// Interception contract and configuration
pub mod runtime;

// Re-export key types
pub use transform_registry::{
    RegistrationKey, RequestKey, SanitizerRegistry, TransformError, TransformHandle,
    TransformRegistry, DEFAULT_NAME,
};
pub use resolution::{MatchRule, Resolution, DEFAULT_RULES, NAMED_RULES};
pub use registration::{
    Callable, Receiver, Registrar, RegistrationError, SanitizerMarker, SanitizerScope, Signature,
};

// Re-export runtime types
pub use runtime::{
    CallSite, InterceptError, Interceptor, Sanitized, SanitizerManifest, ManifestError,
};

/// Normalize whitespace in `text`, merging lines with a space or keeping
/// them separated by `'\n'`.
pub fn apply_whitespace_normalization(text: &str, merge_lines_by_space: bool) -> String {
    whitespace::sanitize_with(text, merge_lines_by_space)
}
