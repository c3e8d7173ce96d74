// Per-tier rule aggregation.
//
// Every surviving triple is viewed from each tier it touches: an egress view
// on the source tier and an ingress view on the destination tier. A
// tier-to-tier triple therefore shows up twice, once per owner, because
// firewall rules are tier-local. The tier-axis wildcard expands to every
// declared tier here, on both the owning side and the recorded-target side.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::EntityCatalog;
use crate::expand::ExpandedRuleSet;
use crate::rule::Endpoint;

/// Rule direction relative to the owning tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ingress => "ingress",
            Direction::Egress => "egress",
        }
    }
}

/// Targets recorded for one (tier, direction, traffic type) coordinate:
/// other tiers by name, raw CIDR blocks by expression. Both lists are
/// deduplicated and sorted before the structure is handed downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleBucket {
    pub tier_targets: Vec<String>,
    pub cidr_targets: Vec<String>,
}

impl RuleBucket {
    pub fn is_empty(&self) -> bool {
        self.tier_targets.is_empty() && self.cidr_targets.is_empty()
    }

    fn record(&mut self, target: &Endpoint, all_tiers: &[String]) {
        match target {
            Endpoint::Tier(name) => self.tier_targets.push(name.clone()),
            Endpoint::Any => self.tier_targets.extend(all_tiers.iter().cloned()),
            Endpoint::CidrRange {
                cidr_expression, ..
            } => self.cidr_targets.push(cidr_expression.clone()),
        }
    }

    fn finish(&mut self) {
        self.tier_targets.sort();
        self.tier_targets.dedup();
        self.cidr_targets.sort();
        self.cidr_targets.dedup();
    }
}

/// Buckets keyed by traffic-type name.
pub type RuleBucketMap = BTreeMap<String, RuleBucket>;

/// Both directions of one tier's rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRuleSet {
    pub ingress: RuleBucketMap,
    pub egress: RuleBucketMap,
}

impl TierRuleSet {
    pub fn direction(&self, direction: Direction) -> &RuleBucketMap {
        match direction {
            Direction::Ingress => &self.ingress,
            Direction::Egress => &self.egress,
        }
    }
}

/// Group the surviving triples by owning tier and direction. Every declared
/// tier gets an entry, and every bucket list comes out deduplicated and
/// lexicographically sorted, so identical inputs produce identical output
/// whatever the declaration order was.
pub fn group(catalog: &EntityCatalog, rules: &ExpandedRuleSet) -> BTreeMap<String, TierRuleSet> {
    let all_tiers: Vec<String> = catalog.tiers().iter().map(|t| t.name.clone()).collect();

    let mut grouped: BTreeMap<String, TierRuleSet> = all_tiers
        .iter()
        .map(|name| (name.clone(), TierRuleSet::default()))
        .collect();

    for rule in rules.iter() {
        let type_name = &rule.traffic_type.name;

        for owner in owning_tiers(&rule.source, &all_tiers) {
            let bucket = grouped
                .get_mut(owner)
                .expect("owning tier is always declared")
                .egress
                .entry(type_name.clone())
                .or_default();
            bucket.record(&rule.destination, &all_tiers);
        }

        for owner in owning_tiers(&rule.destination, &all_tiers) {
            let bucket = grouped
                .get_mut(owner)
                .expect("owning tier is always declared")
                .ingress
                .entry(type_name.clone())
                .or_default();
            bucket.record(&rule.source, &all_tiers);
        }
    }

    for tier_rules in grouped.values_mut() {
        for bucket in tier_rules.ingress.values_mut() {
            bucket.finish();
        }
        for bucket in tier_rules.egress.values_mut() {
            bucket.finish();
        }
    }

    grouped
}

/// The tiers that own a directional view of a rule with this endpoint. A
/// CIDR range owns nothing: it is a leaf, not an enforcement point.
fn owning_tiers<'a>(endpoint: &'a Endpoint, all_tiers: &'a [String]) -> &'a [String] {
    match endpoint {
        Endpoint::Tier(name) => std::slice::from_ref(name),
        Endpoint::Any => all_tiers,
        Endpoint::CidrRange { .. } => &[],
    }
}
