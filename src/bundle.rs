//! Compiled bundle cache.
//!
//! Each successful compilation produces one immutable `CompiledBundle` that
//! supersedes the previous one wholesale. The cache is single-writer (the
//! compile-finished handler) and multi-reader: readers take an `Rc` snapshot
//! at call start and never observe a partially replaced bundle.

use crate::compiler::CompilerArtifacts;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use swc_sourcemap::SourceMap;

/// One compilation's output: bundle text, parsed source map, and the
/// request-to-module-id table. Immutable once published.
pub struct CompiledBundle {
    pub code: String,
    /// `None` when the compiler emitted no usable source map; stack frames
    /// are then left unrewritten.
    pub source_map: Option<SourceMap>,
    pub module_id_map: HashMap<String, u32>,
}

impl CompiledBundle {
    pub fn from_artifacts(artifacts: CompilerArtifacts) -> Self {
        let source_map = parse_source_map(&artifacts.bundle_source_map);
        if source_map.is_none() {
            log::warn!("bundle source map could not be parsed; stack traces will not be rewritten");
        }
        Self {
            code: artifacts.bundle_code,
            source_map,
            module_id_map: artifacts.request_to_module_id,
        }
    }
}

fn parse_source_map(raw: &serde_json::Value) -> Option<SourceMap> {
    let bytes = serde_json::to_vec(raw).ok()?;
    SourceMap::from_slice(&bytes).ok()
}

#[derive(Default)]
pub struct BundleCache {
    current: RefCell<Option<Rc<CompiledBundle>>>,
}

impl BundleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published bundle. Readers holding the previous `Rc` keep
    /// observing the previous bundle in full.
    pub fn publish(&self, bundle: CompiledBundle) {
        *self.current.borrow_mut() = Some(Rc::new(bundle));
    }

    pub fn current(&self) -> Option<Rc<CompiledBundle>> {
        self.current.borrow().clone()
    }
}
