//! Interface boundary to the external Compiler collaborator.
//!
//! The bundler itself (graph construction, loaders, plugins) is a black box
//! behind these traits: it accepts a configuration, watches it for the
//! process lifetime, and reports lifecycle events plus compiled artifacts.

use crate::config::EntryConfiguration;
use anyhow::Error;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

/// The slice of compiler configuration this core needs to read back.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Compilation root directory; entry paths and rewritten stack frames
    /// are relative to it.
    pub context: PathBuf,
    pub entry: EntryConfiguration,
}

/// Artifacts supplied with every "compile finished" event.
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerArtifacts {
    pub bundle_code: String,
    /// Raw source map object as emitted by the compiler.
    pub bundle_source_map: serde_json::Value,
    /// Relative request path (e.g. `./src/index.js`) to module id.
    pub request_to_module_id: HashMap<String, u32>,
}

/// Lifecycle notifications emitted by the compiler's watch mode.
pub trait CompilerEvents {
    fn on_compile_started(&self);
    fn on_compile_finished(&self, artifacts: CompilerArtifacts);
}

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Debounce window between a detected change and a recompilation.
    pub aggregate_timeout_ms: Option<u64>,
}

/// The external compiler collaborator.
///
/// `watch` must keep driving recompilation for the process lifetime,
/// delivering every lifecycle transition to `events` on the same thread that
/// handles evaluation requests.
pub trait Compiler {
    fn options(&self) -> &CompilerOptions;

    fn watch(&mut self, options: WatchOptions, events: Rc<dyn CompilerEvents>)
        -> Result<(), Error>;
}
