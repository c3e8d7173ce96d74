pub mod aggregate;
pub mod compiler;
pub mod entity;
pub mod ephemeral;
pub mod error;
pub mod expand;
pub mod prune;
pub mod rule;

pub use entity::{
    EntityCatalog, KnownCidrRange, NetworkTier, TierDecl, TrafficType, TrafficTypeDecl,
    ANY_PROTOCOL, WILDCARD,
};

pub use rule::{Endpoint, ExpandedTrafficRule, PolicyDocument, RefList, TrafficRule};

pub use expand::ExpandedRuleSet;

pub use prune::PruneMode;

pub use aggregate::{Direction, RuleBucket, RuleBucketMap, TierRuleSet};

pub use ephemeral::{
    DerivedRules,            // Per-tier derived rule pair
    EphemeralRule,           // Return-traffic rule for stateless filters
    ANYWHERE,                // The unrestricted CIDR block
    EPHEMERAL_PORT_MAX,
    EPHEMERAL_PORT_MIN,
};

pub use compiler::{CompiledPolicy, CompilerOptions, PolicyCompiler};

pub use error::CompileError;
