//! Setup configuration and entry-script resolution.
//!
//! The entry descriptor is resolved once at setup time and immutable
//! thereafter; only the module-id lookup is deferred to evaluation time.

use crate::error::IsomorphicError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Component, Path};

/// Configuration surface recognized at setup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IsomorphicConfiguration {
    /// Enable the compilation settle signal. When off, `compilation_promise`
    /// fails with `FeatureDisabled` on every call.
    pub use_compilation_promise: bool,
    /// Server-side dependencies that must stay bundled instead of being
    /// externalized (names or patterns, passed through to the compiler).
    pub node_externals_whitelist: Vec<String>,
}

/// The compiler's resolved entry configuration.
///
/// `Paths` follows last-one-wins semantics; `Bundles` supports exactly one
/// named bundle.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EntryConfiguration {
    Path(String),
    Paths(Vec<String>),
    Bundles(BTreeMap<String, Vec<String>>),
}

/// Resolve the single entry script out of an entry configuration.
pub fn resolve_entry_script(entry: &EntryConfiguration) -> Result<&str, IsomorphicError> {
    match entry {
        EntryConfiguration::Path(path) => Ok(path),
        EntryConfiguration::Paths(paths) => paths
            .last()
            .map(String::as_str)
            .ok_or(IsomorphicError::InvalidEntryConfiguration),
        EntryConfiguration::Bundles(bundles) => {
            if bundles.len() > 1 {
                return Err(IsomorphicError::UnsupportedMultiBundleConfiguration);
            }
            let (_, paths) = bundles
                .iter()
                .next()
                .ok_or(IsomorphicError::InvalidEntryConfiguration)?;
            paths
                .last()
                .map(String::as_str)
                .ok_or(IsomorphicError::InvalidEntryConfiguration)
        }
    }
}

/// Normalize the entry script to the `./`-prefixed, forward-slash path
/// relative to the compilation context - the same shape the compiler uses as
/// keys in its request-to-module-id table.
pub fn normalize_entry_request(context: &Path, entry_script: &str) -> String {
    let trimmed = entry_script.strip_prefix("./").unwrap_or(entry_script);
    let absolute = if Path::new(trimmed).is_absolute() {
        lexical_components(Path::new(trimmed))
    } else {
        lexical_components(&context.join(trimmed))
    };
    let context = lexical_components(context);

    // Longest shared prefix, then `..` for what remains of the context.
    let shared = context
        .iter()
        .zip(absolute.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<String> = Vec::new();
    for _ in shared..context.len() {
        parts.push("..".to_string());
    }
    parts.extend(absolute[shared..].iter().cloned());

    if parts.first().map(String::as_str) == Some("..") {
        parts.join("/")
    } else {
        format!("./{}", parts.join("/"))
    }
}

/// Resolve `.` and `..` segments without touching the filesystem.
fn lexical_components(path: &Path) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(segment) => out.push(segment.to_string_lossy().into_owned()),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    out
}
