// Compiler facade: normalize -> expand -> prune -> aggregate, one pass, no
// state kept across runs. Consumers read the output structure; nothing in
// here performs I/O.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::{self, TierRuleSet};
use crate::entity::{self, KnownCidrRange, NetworkTier, TrafficType};
use crate::ephemeral::{self, DerivedRules};
use crate::error::CompileError;
use crate::expand;
use crate::prune::{self, PruneMode};
use crate::rule::PolicyDocument;

/// Compilation options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    pub prune_mode: PruneMode,
}

/// The network policy compiler. Stateless; one instance can compile any
/// number of documents, concurrently if the caller wants to.
#[derive(Debug, Clone, Default)]
pub struct PolicyCompiler {
    options: CompilerOptions,
}

impl PolicyCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        Self { options }
    }

    /// Compile a policy document into the grouped per-tier rule structure.
    pub fn compile(&self, document: &PolicyDocument) -> Result<CompiledPolicy, CompileError> {
        let catalog = entity::normalize(
            &document.network_tiers,
            document
                .known_cidr_ranges
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
            document
                .known_traffic_types
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        )?;

        let expanded = expand::expand(&catalog, &document.network_traffic_rules)?;
        let pruned = prune::prune(&expanded, self.options.prune_mode);
        let grouped_rules = aggregate::group(&catalog, &pruned);

        Ok(CompiledPolicy {
            public_tiers: catalog.public_tiers(),
            private_tiers: catalog.private_tiers(),
            nat_tier: catalog.nat_tier(),
            tiers: catalog.tiers().to_vec(),
            known_cidr_ranges: catalog.cidr_ranges().to_vec(),
            known_traffic_types: catalog.traffic_types().to_vec(),
            grouped_rules,
        })
    }
}

/// The compiled policy handed to downstream renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledPolicy {
    pub tiers: Vec<NetworkTier>,
    pub public_tiers: Vec<String>,
    pub private_tiers: Vec<String>,
    pub nat_tier: Option<String>,
    pub known_cidr_ranges: Vec<KnownCidrRange>,
    pub known_traffic_types: Vec<TrafficType>,
    pub grouped_rules: BTreeMap<String, TierRuleSet>,
}

impl CompiledPolicy {
    /// One tier's grouped rules.
    pub fn tier_rules(&self, tier: &str) -> Option<&TierRuleSet> {
        self.grouped_rules.get(tier)
    }

    /// Resolve a traffic-type name appearing in a bucket key, including the
    /// synthetic wildcard.
    pub fn traffic_type(&self, name: &str) -> Option<TrafficType> {
        if name == entity::WILDCARD {
            return Some(TrafficType::wildcard());
        }
        self.known_traffic_types.iter().find(|t| t.name == name).cloned()
    }

    /// Derived ephemeral return-traffic rules per tier, for stateless
    /// consumers. Computed on demand; the grouped buckets stay untouched.
    pub fn derived_rules(&self) -> BTreeMap<String, DerivedRules> {
        self.grouped_rules
            .iter()
            .map(|(tier, rules)| (tier.clone(), ephemeral::synthesize(rules)))
            .collect()
    }
}
