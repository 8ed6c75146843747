//! Built-in sanitizers shipped with the crate.

use crate::registration::{Callable, SanitizerMarker, SanitizerScope};
use crate::whitespace;

/// Scope name under which the whitespace sanitizers are registered.
pub const WHITESPACE_SCOPE: &str = "sanitizer::whitespace";

fn sanitize(value: String) -> String {
    whitespace::sanitize(&value)
}

fn sanitize_keep_lines(value: String) -> String {
    whitespace::sanitize_with(&value, false)
}

fn sanitize_line(value: String) -> String {
    whitespace::sanitize_line(&value)
}

fn sanitize_optional(value: Option<String>) -> Option<String> {
    whitespace::sanitize_opt(value.as_deref(), true)
}

/// Source names of all built-in callables, in registration order.
pub const BUILTIN_NAMES: &[&str] = &[
    "sanitize",
    "sanitize_keep_lines",
    "sanitize_line",
    "sanitize_optional",
];

/// Look up a built-in callable by its source name.
pub fn builtin_callable(source_name: &str) -> Option<Callable> {
    let callable = match source_name {
        "sanitize" => Callable::unary("sanitize", sanitize),
        "sanitize_keep_lines" => Callable::unary("sanitize_keep_lines", sanitize_keep_lines),
        "sanitize_line" => Callable::unary("sanitize_line", sanitize_line),
        "sanitize_optional" => Callable::unary("sanitize_optional", sanitize_optional),
        _ => return None,
    };
    Some(callable)
}

/// The whitespace sanitizers as a registrable scope.
///
/// `sanitize` and `sanitize_optional` are registered implicitly and become
/// the defaults for `String` and `Option<String>`; the line-preserving and
/// single-line variants are reachable as `keep_lines` and `single_line`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceScope;

impl SanitizerScope for WhitespaceScope {
    fn scope_name(&self) -> &str {
        WHITESPACE_SCOPE
    }

    fn sanitizers(&self) -> Vec<(Callable, SanitizerMarker)> {
        let markers = [
            ("sanitize", SanitizerMarker::implicit()),
            ("sanitize_keep_lines", SanitizerMarker::named("keep_lines")),
            ("sanitize_line", SanitizerMarker::named("single_line")),
            ("sanitize_optional", SanitizerMarker::implicit()),
        ];

        markers
            .into_iter()
            .filter_map(|(source, marker)| builtin_callable(source).map(|callable| (callable, marker)))
            .collect()
    }
}
