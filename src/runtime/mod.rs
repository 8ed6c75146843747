//! Runtime pieces used around the registry.
//!
//! This module provides the call-site interception contract and the YAML
//! manifest loader used to configure the registration phase.

pub mod intercept;
pub mod manifest;

// Re-export key types
pub use intercept::{CallSite, InterceptError, Interceptor, Sanitized};
pub use manifest::{load_manifests_from_dir, ManifestError, SanitizerBinding, SanitizerManifest};
