//! Bundle evaluation orchestration.
//!
//! `create_isomorphic_bundle` wires the lifecycle coordinator and bundle
//! cache to an external compiler's watch mode and returns the handle server
//! request handlers use: await the compilation promise, evaluate the entry
//! module, and rewrite error stacks through the current source map.

use crate::bundle::{BundleCache, CompiledBundle};
use crate::compiler::{Compiler, CompilerArtifacts, CompilerEvents, WatchOptions};
use crate::config::{normalize_entry_request, resolve_entry_script, IsomorphicConfiguration};
use crate::coordinator::{CompilationCoordinator, CompilationPromise};
use crate::evaluator::{evaluate, ModuleExports, BUNDLE_ORIGIN_LABEL};
use crate::error::IsomorphicError;
use crate::stack::rewrite_stack;
use std::path::PathBuf;
use std::rc::Rc;
use url::Url;

pub struct IsomorphicBundle {
    context: PathBuf,
    /// Entry path normalized to the compiler's request-table shape,
    /// resolved once at setup.
    entry_request: String,
    coordinator: CompilationCoordinator,
    cache: BundleCache,
}

/// Resolve the entry descriptor, subscribe to the compiler's lifecycle
/// events, and start watching.
///
/// Entry-configuration errors surface here, before any compilation runs.
pub fn create_isomorphic_bundle(
    compiler: &mut dyn Compiler,
    configuration: IsomorphicConfiguration,
) -> Result<Rc<IsomorphicBundle>, IsomorphicError> {
    let options = compiler.options().clone();
    let entry_script = resolve_entry_script(&options.entry)?;
    let entry_request = normalize_entry_request(&options.context, entry_script);
    log::debug!("resolved entry request: {}", entry_request);

    let bundle = Rc::new(IsomorphicBundle {
        context: options.context,
        entry_request,
        coordinator: CompilationCoordinator::new(configuration.use_compilation_promise),
        cache: BundleCache::new(),
    });

    compiler.watch(WatchOptions::default(), bundle.clone())?;

    Ok(bundle)
}

impl IsomorphicBundle {
    /// Settle signal for the compilation currently in progress. See
    /// `CompilationCoordinator::compilation_promise` for the contract.
    pub fn compilation_promise(&self) -> Result<CompilationPromise, IsomorphicError> {
        self.coordinator.compilation_promise()
    }

    /// Evaluate the current bundle and return the entry module's exports.
    ///
    /// `request_context` parameterizes the seeded `window.location` for
    /// globals that vary per request. Requires a finished compilation;
    /// callers racing the first one should await `compilation_promise`.
    pub fn eval_bundle_code(
        &self,
        request_context: Option<&str>,
    ) -> Result<ModuleExports, IsomorphicError> {
        let bundle = self.cache.current().ok_or(IsomorphicError::BundleNotReady)?;

        let module_id = bundle
            .module_id_map
            .get(&self.entry_request)
            .copied()
            .ok_or_else(|| IsomorphicError::EntryModuleIdNotFound {
                request: self.entry_request.clone(),
            })?;

        let globals = browser_globals(request_context);
        let accessor = evaluate(&bundle.code, &globals, None)?;
        Ok(accessor.module_exports(module_id)?)
    }

    /// Rewrite bundle-originated frames in `stack` to original source
    /// positions. Best effort: unresolvable frames - and all frames while no
    /// compiled bundle or source map exists - are returned unchanged.
    ///
    /// The source map is snapshotted on entry; a compilation finishing
    /// mid-call does not affect this invocation.
    pub fn format_error_stack(&self, stack: &str) -> String {
        let bundle = match self.cache.current() {
            Some(bundle) => bundle,
            None => return stack.to_string(),
        };
        match &bundle.source_map {
            Some(source_map) => rewrite_stack(stack, BUNDLE_ORIGIN_LABEL, source_map, &self.context),
            None => stack.to_string(),
        }
    }
}

impl CompilerEvents for IsomorphicBundle {
    fn on_compile_started(&self) {
        self.coordinator.compile_started();
    }

    fn on_compile_finished(&self, artifacts: CompilerArtifacts) {
        self.cache.publish(CompiledBundle::from_artifacts(artifacts));
        self.coordinator.compile_finished();
    }
}

/// Host-shielded globals seeded into every evaluation. A `window` object is
/// always present; its `location` reflects the per-request context URL.
fn browser_globals(request_context: Option<&str>) -> serde_json::Map<String, serde_json::Value> {
    let window = match request_context {
        Some(context) => serde_json::json!({"location": location_object(context)}),
        None => serde_json::json!({}),
    };
    let mut globals = serde_json::Map::new();
    globals.insert("window".to_string(), window);
    globals
}

fn location_object(request_context: &str) -> serde_json::Value {
    match Url::parse(request_context) {
        Ok(url) => serde_json::json!({
            "href": url.as_str(),
            "protocol": format!("{}:", url.scheme()),
            "host": url.host_str().map(|host| match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            }).unwrap_or_default(),
            "hostname": url.host_str().unwrap_or_default(),
            "pathname": url.path(),
            "search": url.query().map(|query| format!("?{}", query)).unwrap_or_default(),
            "hash": url.fragment().map(|fragment| format!("#{}", fragment)).unwrap_or_default(),
        }),
        // Not a parseable URL; expose it verbatim.
        Err(_) => serde_json::json!({"href": request_context}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerOptions;
    use crate::config::EntryConfiguration;
    use anyhow::Error;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory compiler: tests drive lifecycle events by hand through the
    /// subscribed sink.
    struct FakeCompiler {
        options: CompilerOptions,
        events: RefCell<Option<Rc<dyn CompilerEvents>>>,
    }

    impl FakeCompiler {
        fn new(entry: EntryConfiguration) -> Self {
            Self {
                options: CompilerOptions {
                    context: PathBuf::from("/srv/proj"),
                    entry,
                },
                events: RefCell::new(None),
            }
        }

        fn finish_compilation(&self, artifacts: CompilerArtifacts) {
            let events = self.events.borrow();
            let events = events.as_ref().unwrap();
            events.on_compile_started();
            events.on_compile_finished(artifacts);
        }
    }

    impl Compiler for FakeCompiler {
        fn options(&self) -> &CompilerOptions {
            &self.options
        }

        fn watch(
            &mut self,
            _options: WatchOptions,
            events: Rc<dyn CompilerEvents>,
        ) -> Result<(), Error> {
            *self.events.borrow_mut() = Some(events);
            Ok(())
        }
    }

    fn registry_bundle(factories: &str) -> String {
        format!(
            r#"
(function (modules) {{
  var installed = {{}};
  function requireModule(id) {{
    if (installed[id]) {{ return installed[id].exports; }}
    var module = installed[id] = {{ exports: {{}} }};
    modules[id](module, module.exports, requireModule);
    return module.exports;
  }}
  return requireModule;
}})([{}])
"#,
            factories
        )
    }

    fn artifacts_for(factories: &str, entry_request: &str) -> CompilerArtifacts {
        CompilerArtifacts {
            bundle_code: registry_bundle(factories),
            bundle_source_map: json!({
                "version": 3,
                "sources": ["webpack://src/index.js"],
                "names": [],
                "mappings": "KASI"
            }),
            request_to_module_id: HashMap::from([(entry_request.to_string(), 0)]),
        }
    }

    fn entry() -> EntryConfiguration {
        EntryConfiguration::Path("./src/index.js".to_string())
    }

    #[test]
    fn test_eval_before_first_compilation() {
        let mut compiler = FakeCompiler::new(entry());
        let bundle =
            create_isomorphic_bundle(&mut compiler, IsomorphicConfiguration::default()).unwrap();
        assert!(matches!(
            bundle.eval_bundle_code(None),
            Err(IsomorphicError::BundleNotReady)
        ));
    }

    #[test]
    fn test_evaluates_entry_module() {
        let mut compiler = FakeCompiler::new(entry());
        let bundle =
            create_isomorphic_bundle(&mut compiler, IsomorphicConfiguration::default()).unwrap();
        compiler.finish_compilation(artifacts_for(
            "function (module) { module.exports = { revision: 1 }; }",
            "./src/index.js",
        ));

        // Repeated evaluations of the same revision observe the same exports.
        let mut first = bundle.eval_bundle_code(None).unwrap();
        let mut second = bundle.eval_bundle_code(None).unwrap();
        assert_eq!(first.to_json().unwrap(), json!({"revision": 1}));
        assert_eq!(second.to_json().unwrap(), json!({"revision": 1}));
    }

    #[test]
    fn test_recompilation_supersedes_bundle() {
        let mut compiler = FakeCompiler::new(entry());
        let bundle =
            create_isomorphic_bundle(&mut compiler, IsomorphicConfiguration::default()).unwrap();
        compiler.finish_compilation(artifacts_for(
            "function (module) { module.exports = { revision: 1 }; }",
            "./src/index.js",
        ));
        compiler.finish_compilation(artifacts_for(
            "function (module) { module.exports = { revision: 2 }; }",
            "./src/index.js",
        ));

        let mut exports = bundle.eval_bundle_code(None).unwrap();
        assert_eq!(exports.to_json().unwrap(), json!({"revision": 2}));
    }

    #[test]
    fn test_request_context_shapes_window_location() {
        let mut compiler = FakeCompiler::new(entry());
        let bundle =
            create_isomorphic_bundle(&mut compiler, IsomorphicConfiguration::default()).unwrap();
        compiler.finish_compilation(artifacts_for(
            "function (module) { module.exports = { path: window.location.pathname, search: window.location.search }; }",
            "./src/index.js",
        ));

        let mut exports = bundle
            .eval_bundle_code(Some("http://localhost:8000/about?tab=team"))
            .unwrap();
        assert_eq!(
            exports.to_json().unwrap(),
            json!({"path": "/about", "search": "?tab=team"})
        );
    }

    #[test]
    fn test_missing_entry_module_id() {
        let mut compiler = FakeCompiler::new(entry());
        let bundle =
            create_isomorphic_bundle(&mut compiler, IsomorphicConfiguration::default()).unwrap();
        // The compiled table does not contain the configured entry.
        compiler.finish_compilation(artifacts_for(
            "function (module) { module.exports = {}; }",
            "./src/other.js",
        ));

        match bundle.eval_bundle_code(None) {
            Err(IsomorphicError::EntryModuleIdNotFound { request }) => {
                assert_eq!(request, "./src/index.js");
            }
            other => panic!("expected EntryModuleIdNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_multi_bundle_entry_fails_at_setup() {
        let mut bundles = std::collections::BTreeMap::new();
        bundles.insert("app".to_string(), vec!["./src/app.js".to_string()]);
        bundles.insert("admin".to_string(), vec!["./src/admin.js".to_string()]);
        let mut compiler = FakeCompiler::new(EntryConfiguration::Bundles(bundles));

        let result = create_isomorphic_bundle(&mut compiler, IsomorphicConfiguration::default());
        assert!(matches!(
            result.err(),
            Some(IsomorphicError::UnsupportedMultiBundleConfiguration)
        ));
    }

    #[test]
    fn test_compilation_promise_feature_gate() {
        let mut compiler = FakeCompiler::new(entry());
        let bundle =
            create_isomorphic_bundle(&mut compiler, IsomorphicConfiguration::default()).unwrap();
        assert!(matches!(
            bundle.compilation_promise(),
            Err(IsomorphicError::FeatureDisabled)
        ));
    }

    #[tokio::test]
    async fn test_compilation_promise_tracks_lifecycle() {
        let mut compiler = FakeCompiler::new(entry());
        let bundle = create_isomorphic_bundle(
            &mut compiler,
            IsomorphicConfiguration {
                use_compilation_promise: true,
                ..Default::default()
            },
        )
        .unwrap();

        {
            let events = compiler.events.borrow();
            events.as_ref().unwrap().on_compile_started();
        }
        let promise = bundle.compilation_promise().unwrap();
        assert!(!promise.is_settled());

        compiler.finish_compilation(artifacts_for(
            "function (module) { module.exports = {}; }",
            "./src/index.js",
        ));
        promise.settled().await;
        assert!(bundle.compilation_promise().unwrap().is_settled());
    }

    #[test]
    fn test_format_error_stack_end_to_end() {
        let mut compiler = FakeCompiler::new(entry());
        let bundle =
            create_isomorphic_bundle(&mut compiler, IsomorphicConfiguration::default()).unwrap();

        // No bundle yet: input returned unchanged.
        let stack = format!("Error: x\n    at t ({}:1:7)", BUNDLE_ORIGIN_LABEL);
        assert_eq!(bundle.format_error_stack(&stack), stack);

        compiler.finish_compilation(artifacts_for(
            "function (module) { module.exports = {}; }",
            "./src/index.js",
        ));
        assert_eq!(
            bundle.format_error_stack(&stack),
            "Error: x\n    at t (/srv/proj/src/index.js:10:4)"
        );
    }
}
