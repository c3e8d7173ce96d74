//! Error types for the bridge. Everything is fatal: the CLI surfaces the
//! message and exits non-zero.

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// Filesystem error while reading the document or writing artifacts
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration document could not be deserialized
    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error (debug dumps, template contexts)
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Template rendering error
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// The compiled structure was internally inconsistent at render time
    #[error("render error: {0}")]
    Render(String),

    /// The policy document failed to compile
    #[error(transparent)]
    Compile(#[from] policy_engine::CompileError),
}
