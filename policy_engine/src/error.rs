// Error types for policy compilation. Every error aborts the whole run;
// the compiler never produces partial output.

use thiserror::Error;

/// Errors raised while compiling a policy document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A tier or traffic-type declaration is neither a scalar name nor a
    /// plain mapping of the expected shape.
    #[error("malformed entity declaration: {0}")]
    MalformedEntity(String),

    /// A rule references a name that is neither a declared tier nor a known
    /// CIDR range.
    #[error("unknown network tier or CIDR range: {0:?}")]
    UnknownNetworkTier(String),

    /// A rule references a traffic type that was never declared.
    #[error("unknown traffic type: {0:?}")]
    UnknownTrafficType(String),

    /// A name is declared both as a tier and as a known CIDR range. The two
    /// namespaces share the reference role in rules, so the collision is
    /// rejected instead of silently preferring one side.
    #[error("ambiguous reference: {0:?} names both a network tier and a known CIDR range")]
    AmbiguousReference(String),

    /// A declaration claims the reserved wildcard name.
    #[error("{0:?} is reserved for the wildcard and cannot be declared")]
    ReservedName(String),
}
