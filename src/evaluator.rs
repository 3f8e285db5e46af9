//! Sandboxed bundle evaluation in a V8 isolate.
//!
//! Every evaluation gets a fresh `deno_core::JsRuntime` with no extensions,
//! no module loader, and no ops: the bundle sees only the globals seeded
//! from the caller's map and cannot reach the host's filesystem, network, or
//! environment. The bundle text is executed as one script whose completion
//! value must be the bundler's module registry function (`require(id)`);
//! the returned accessor looks modules up by id inside that registry.

use anyhow::{anyhow, Error};
use deno_core::error::JsError;
use deno_core::{serde_v8, v8, JsRuntime, RuntimeOptions};

/// Synthetic file name embedded in the evaluated script so stack frames that
/// originate from the bundle are recognizable later.
pub const BUNDLE_ORIGIN_LABEL: &str = "isobundle";

/// Evaluate bundle source text and capture its module registry.
///
/// Evaluation errors in the bundle's top-level code are not caught here;
/// they propagate with the origin label embedded in their stack.
pub fn evaluate(
    bundle_code: &str,
    globals: &serde_json::Map<String, serde_json::Value>,
    origin_label: Option<&'static str>,
) -> Result<ExportsAccessor, Error> {
    let label = origin_label.unwrap_or(BUNDLE_ORIGIN_LABEL);
    let mut runtime = JsRuntime::new(RuntimeOptions::default());

    seed_globals(&mut runtime, globals)?;

    let completion = runtime.execute_script(label, bundle_code.to_string())?;

    let registry = {
        let scope = &mut runtime.handle_scope();
        let local = v8::Local::new(scope, completion);
        let function = v8::Local::<v8::Function>::try_from(local)
            .map_err(|_| anyhow!("bundle did not evaluate to a module registry function"))?;
        v8::Global::new(scope, function)
    };

    Ok(ExportsAccessor { registry, runtime })
}

fn seed_globals(
    runtime: &mut JsRuntime,
    globals: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), Error> {
    let scope = &mut runtime.handle_scope();
    let context = scope.get_current_context();
    let global = context.global(scope);
    for (name, value) in globals {
        let key = v8::String::new(scope, name)
            .ok_or_else(|| anyhow!("invalid global name: {}", name))?;
        let seeded = serde_v8::to_v8(scope, value)
            .map_err(|e| anyhow!("global \"{}\" is not seedable: {}", name, e))?;
        global.set(scope, key.into(), seeded);
    }
    Ok(())
}

/// Handle to an evaluated bundle's internal module registry.
pub struct ExportsAccessor {
    // Declared before the runtime: v8 globals must drop while the isolate
    // is still alive.
    registry: v8::Global<v8::Function>,
    runtime: JsRuntime,
}

impl std::fmt::Debug for ExportsAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportsAccessor").finish_non_exhaustive()
    }
}

impl ExportsAccessor {
    /// Look up a module by id, triggering its lazy evaluation on first
    /// access. Exceptions thrown by the module factory surface as a
    /// `JsError` with the bundle's stack intact.
    pub fn module_exports(mut self, module_id: u32) -> Result<ModuleExports, Error> {
        log::debug!("evaluating module ID {}", module_id);
        let exports = {
            let scope = &mut self.runtime.handle_scope();
            let tc = &mut v8::TryCatch::new(scope);
            let registry = v8::Local::new(tc, &self.registry);
            let receiver: v8::Local<v8::Value> = v8::undefined(tc).into();
            let id: v8::Local<v8::Value> = v8::Integer::new_from_unsigned(tc, module_id).into();
            match registry.call(tc, receiver, &[id]) {
                Some(value) => v8::Global::new(tc, value),
                None => {
                    let exception = tc
                        .exception()
                        .ok_or_else(|| anyhow!("module evaluation terminated"))?;
                    return Err(JsError::from_v8_exception(tc, exception).into());
                }
            }
        };
        Ok(ModuleExports {
            exports,
            accessor: self,
        })
    }
}

/// One module's exported value, kept alive together with its isolate.
pub struct ModuleExports {
    exports: v8::Global<v8::Value>,
    accessor: ExportsAccessor,
}

impl std::fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleExports").finish_non_exhaustive()
    }
}

impl ModuleExports {
    /// Convert the exports to JSON. Fails for values with no JSON
    /// representation (e.g. an exported function).
    pub fn to_json(&mut self) -> Result<serde_json::Value, Error> {
        let scope = &mut self.accessor.runtime.handle_scope();
        let local = v8::Local::new(scope, &self.exports);
        serde_v8::from_v8(scope, local)
            .map_err(|e| anyhow!("module exports are not JSON-representable: {}", e))
    }

    pub fn is_callable(&mut self) -> bool {
        let scope = &mut self.accessor.runtime.handle_scope();
        let local = v8::Local::new(scope, &self.exports);
        local.is_function()
    }

    /// Call the exports as a function with JSON arguments, returning the
    /// JSON-converted result. This is the usual shape of an isomorphic
    /// entry: a render function taking request-specific props.
    pub fn call_json(&mut self, args: &[serde_json::Value]) -> Result<serde_json::Value, Error> {
        let scope = &mut self.accessor.runtime.handle_scope();
        let tc = &mut v8::TryCatch::new(scope);
        let local = v8::Local::new(tc, &self.exports);
        let function = v8::Local::<v8::Function>::try_from(local)
            .map_err(|_| anyhow!("module exports are not callable"))?;

        let mut call_args: Vec<v8::Local<v8::Value>> = Vec::with_capacity(args.len());
        for arg in args {
            let converted = serde_v8::to_v8(tc, arg)
                .map_err(|e| anyhow!("argument is not convertible: {}", e))?;
            call_args.push(converted);
        }
        let receiver: v8::Local<v8::Value> = v8::undefined(tc).into();
        match function.call(tc, receiver, &call_args) {
            Some(value) => serde_v8::from_v8(tc, value)
                .map_err(|e| anyhow!("return value is not JSON-representable: {}", e)),
            None => {
                let exception = tc
                    .exception()
                    .ok_or_else(|| anyhow!("call terminated"))?;
                Err(JsError::from_v8_exception(tc, exception).into())
            }
        }
    }
}
