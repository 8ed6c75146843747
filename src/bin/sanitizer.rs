//! sanitizer CLI - whitespace normalization and registry inspection
//!
//! Normalizes text with the built-in whitespace sanitizer and shows how
//! sanitizer requests resolve against the built-ins plus YAML manifests.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::any::type_name;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use sanitizer::builtins::WhitespaceScope;
use sanitizer::runtime::{load_manifests_from_dir, SanitizerManifest};
use sanitizer::whitespace;
use sanitizer::{Registrar, RequestKey, Resolution, SanitizerRegistry, DEFAULT_NAME};

#[derive(Parser)]
#[command(name = "sanitizer")]
#[command(version, about = "Parameter sanitizer registry and whitespace normalizer", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize whitespace of the given text or of stdin
    Normalize {
        /// Text to normalize; reads stdin when omitted
        #[arg(short, long)]
        text: Option<String>,

        /// Keep line structure, joining lines with '\n'
        #[arg(short, long, conflicts_with = "single_line")]
        keep_lines: bool,

        /// Treat the input as a single line
        #[arg(short, long)]
        single_line: bool,
    },

    /// List every registered sanitizer
    List {
        /// Manifest files or directories to register after the built-ins
        #[arg(short, long)]
        manifest: Vec<PathBuf>,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which sanitizer a request resolves to
    Resolve {
        /// Manifest files or directories to register after the built-ins
        #[arg(short, long)]
        manifest: Vec<PathBuf>,

        /// Value type ("string", "optional-string" or a canonical type name)
        #[arg(short = 't', long = "type", default_value = "string")]
        value_type: String,

        /// Scope of the requesting call
        #[arg(short, long)]
        scope: String,

        /// Requested transform name
        #[arg(short, long, default_value = DEFAULT_NAME)]
        name: String,

        /// Source name to match by origin (defaults to the name)
        #[arg(short, long)]
        origin: Option<String>,

        /// Fall back to the default tiers when the named tiers miss
        #[arg(short, long)]
        default: bool,
    },
}

#[derive(Serialize)]
struct EntryView<'a> {
    value_type: &'a str,
    scope: &'a str,
    transform_name: &'a str,
    source_name: &'a str,
}

/// Initialize tracing subscriber writing to stderr
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Normalize {
            text,
            keep_lines,
            single_line,
        } => normalize(text, keep_lines, single_line),
        Commands::List { manifest, json } => list(&manifest, json),
        Commands::Resolve {
            manifest,
            value_type,
            scope,
            name,
            origin,
            default,
        } => resolve(&manifest, &value_type, &scope, &name, origin, default),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn normalize(text: Option<String>, keep_lines: bool, single_line: bool) -> Result<(), String> {
    let input = match text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            buffer
        }
    };

    println!("{}", normalize_text(&input, keep_lines, single_line));
    Ok(())
}

fn normalize_text(input: &str, keep_lines: bool, single_line: bool) -> String {
    if single_line {
        whitespace::sanitize_line(input)
    } else {
        whitespace::sanitize_with(input, !keep_lines)
    }
}

/// Run the registration phase: built-ins first, then manifests in order.
fn build_registry(manifests: &[PathBuf]) -> Result<SanitizerRegistry, String> {
    let mut registrar = Registrar::new();
    registrar
        .register_scope(&WhitespaceScope)
        .map_err(|e| e.to_string())?;

    for path in manifests {
        let manifest = if path.is_dir() {
            load_manifests_from_dir(path)
        } else {
            SanitizerManifest::load_from_file(path)
        }
        .map_err(|e| e.to_string())?;
        manifest.apply(&mut registrar).map_err(|e| e.to_string())?;
    }

    Ok(registrar.finish())
}

fn list(manifests: &[PathBuf], json: bool) -> Result<(), String> {
    let registry = build_registry(manifests)?;
    println!("{}", render_entries(&registry, json)?);
    Ok(())
}

fn render_entries(registry: &SanitizerRegistry, json: bool) -> Result<String, String> {
    let entries: Vec<EntryView> = registry
        .entries()
        .map(|(key, _)| EntryView {
            value_type: &key.value_type,
            scope: &key.scope,
            transform_name: &key.transform_name,
            source_name: &key.source_name,
        })
        .collect();

    if json {
        return serde_json::to_string_pretty(&entries).map_err(|e| format!("Failed to render JSON: {}", e));
    }

    let lines: Vec<String> = entries
        .iter()
        .map(|entry| {
            format!(
                "{}::{}<{}> -> {}",
                entry.scope, entry.transform_name, entry.value_type, entry.source_name
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

fn canonical_type(value_type: &str) -> String {
    match value_type {
        "string" => type_name::<String>().to_string(),
        "optional-string" => type_name::<Option<String>>().to_string(),
        other => other.to_string(),
    }
}

/// Named tiers first; the default tiers only when asked for.
fn find<'r>(registry: &'r SanitizerRegistry, request: &RequestKey, want_default: bool) -> Option<Resolution<'r>> {
    registry.resolve_request(request, false).or_else(|| {
        if want_default {
            registry.resolve_request(request, true)
        } else {
            None
        }
    })
}

fn resolve(
    manifests: &[PathBuf],
    value_type: &str,
    scope: &str,
    name: &str,
    origin: Option<String>,
    want_default: bool,
) -> Result<(), String> {
    let registry = build_registry(manifests)?;
    let origin = origin.unwrap_or_else(|| name.to_string());
    let request = RequestKey::new(canonical_type(value_type), scope, name, origin);

    match find(&registry, &request, want_default) {
        Some(found) => {
            println!("{} via {}", found.key, found.rule);
            Ok(())
        }
        None => Err(format!("No sanitizer found for [{}]", request)),
    }
}
