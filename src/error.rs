//! Error taxonomy for bundle evaluation.
//!
//! Setup and entry-resolution failures are fatal and typed; bundle runtime
//! errors pass through the `Evaluation` arm unmodified so callers can feed
//! their stack text to `format_error_stack`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IsomorphicError {
    /// The entry configuration resolved to zero bundles.
    #[error("invalid \"entry\" configuration")]
    InvalidEntryConfiguration,

    /// The entry configuration resolved to more than one bundle. Multi-bundle
    /// evaluation is unsupported: it is ambiguous which bundle serves a
    /// given request.
    #[error("unsupported \"entry\" configuration: multiple bundles are not supported")]
    UnsupportedMultiBundleConfiguration,

    /// The compiled request-to-module-id table has no entry for the
    /// normalized entry path. Indicates drift between the configured entry
    /// and the actual compiled output.
    #[error("cannot determine entry module ID for \"{request}\"")]
    EntryModuleIdNotFound { request: String },

    /// `compilation_promise` was called without `use_compilation_promise`
    /// being enabled at setup.
    #[error("\"compilation_promise\" feature has not been enabled")]
    FeatureDisabled,

    /// No compilation has finished yet; callers that may race the first
    /// compilation should await the compilation promise first.
    #[error("no compiled bundle is available yet")]
    BundleNotReady,

    /// Evaluation-layer failure, including exceptions thrown by the bundle
    /// itself (as a `deno_core::error::JsError` with its stack intact).
    #[error(transparent)]
    Evaluation(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, IsomorphicError>;
