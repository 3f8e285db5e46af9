//! # isobundle
//!
//! Execute a browser-targeted module bundle inside a server process, so an
//! isomorphic application renders on the server from the exact artifact
//! deployed to the browser.
//!
//! ## How it fits together
//!
//! - An external compiler watches the application and reports lifecycle
//!   events plus compiled artifacts ([`Compiler`], [`CompilerEvents`]).
//! - The coordinator keeps a single settle signal per compilation so request
//!   handlers can defer until the bundle is ready.
//! - Each successful compilation publishes one immutable [`CompiledBundle`];
//!   evaluation runs it in a fresh sandboxed V8 isolate and returns the
//!   entry module's exports.
//! - Runtime stack traces are rewritten back to original source positions
//!   through the bundle's source map.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use isobundle::{
//!     create_compiler_configuration, create_isomorphic_bundle, IsomorphicConfiguration,
//! };
//!
//! // Retarget the application's bundler configuration for in-process
//! // evaluation, then hand it to the compiler implementation.
//! let compiler_configuration = create_compiler_configuration(&application_configuration, &[]);
//! let mut compiler = MyCompiler::new(compiler_configuration);
//!
//! let bundle = create_isomorphic_bundle(
//!     &mut compiler,
//!     IsomorphicConfiguration {
//!         use_compilation_promise: true,
//!         ..Default::default()
//!     },
//! )?;
//!
//! // Per request:
//! bundle.compilation_promise()?.settled().await;
//! let mut exports = bundle.eval_bundle_code(Some("http://localhost:8000/about"))?;
//! let html = exports.call_json(&[serde_json::json!({"url": "/about"})])?;
//! ```

mod assembler;
mod bundle;
mod compiler;
mod config;
mod coordinator;
mod error;
mod evaluator;
mod isomorphic;
mod stack;

pub use assembler::create_compiler_configuration;
pub use bundle::{BundleCache, CompiledBundle};
pub use compiler::{Compiler, CompilerArtifacts, CompilerEvents, CompilerOptions, WatchOptions};
pub use config::{
    normalize_entry_request, resolve_entry_script, EntryConfiguration, IsomorphicConfiguration,
};
pub use coordinator::{CompilationCoordinator, CompilationPromise};
pub use error::{IsomorphicError, Result};
pub use evaluator::{evaluate, ExportsAccessor, ModuleExports, BUNDLE_ORIGIN_LABEL};
pub use isomorphic::{create_isomorphic_bundle, IsomorphicBundle};
pub use stack::rewrite_stack;
