//! # Policy Bridge
//!
//! Everything around the compiler that touches the outside world: loading
//! the YAML configuration document, rendering Terraform and Graphviz
//! artifacts from the compiled policy, and the CLI binary. The compiler
//! itself lives in `policy_engine` and never sees a file or a template.

pub mod config;
pub mod error;
pub mod render;

pub use config::Config;
pub use error::BridgeError;
pub use render::{write_files, RenderedFile, Renderer};
