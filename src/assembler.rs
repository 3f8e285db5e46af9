//! Compiler configuration assembly.
//!
//! A pure transform over the application's bundler configuration object that
//! retargets the build for in-process evaluation: node target, hidden source
//! map, externalized server-side dependencies, browser-only style loaders
//! substituted, and a manifest plugin for the module-id table.

use serde_json::{json, Map, Value};

const BROWSER_STYLE_LOADER: &str = "style-loader";
const NODE_STYLE_LOADER: &str = "node-style-loader";

/// Build the configuration handed to the external Compiler.
///
/// `configuration` is the application's own bundler configuration;
/// `node_externals_whitelist` lists dependencies that must stay bundled.
pub fn create_compiler_configuration(
    configuration: &Value,
    node_externals_whitelist: &[String],
) -> Value {
    let mut assembled = match configuration.clone() {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let manifest_path = match assembled.get("context").and_then(Value::as_str) {
        Some(context) => format!("{}/manifest.json", context.trim_end_matches('/')),
        None => "manifest.json".to_string(),
    };

    assembled.insert("devtool".to_string(), json!("hidden-source-map"));
    assembled.insert("target".to_string(), json!("node"));

    // The bundle must not receive node shims; the evaluation sandbox decides
    // what the bundle sees.
    assembled.insert(
        "node".to_string(),
        json!({
            "__dirname": false,
            "__filename": false,
            "Buffer": false,
            "console": false,
            "global": false,
            "process": false,
            "setImmediate": false
        }),
    );

    assembled.insert(
        "externals".to_string(),
        json!([{
            "node-externals": {
                "import-type": "commonjs2",
                "whitelist": node_externals_whitelist
            }
        }]),
    );

    if let Some(module) = assembled.get_mut("module") {
        replace_style_loaders(module);
    }

    let plugins = assembled
        .entry("plugins".to_string())
        .or_insert_with(|| json!([]));
    if let Some(plugins) = plugins.as_array_mut() {
        plugins.push(json!({"dll-plugin": {"path": manifest_path}}));
    }

    Value::Object(assembled)
}

/// Substitute the browser-only style loader everywhere inside the `module`
/// section, whatever nesting of rules, arrays, and use-entries holds it.
fn replace_style_loaders(value: &mut Value) {
    match value {
        Value::String(loader) if loader == BROWSER_STYLE_LOADER => {
            *loader = NODE_STYLE_LOADER.to_string();
        }
        Value::Array(items) => {
            for item in items {
                replace_style_loaders(item);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                replace_style_loaders(item);
            }
        }
        _ => {}
    }
}
