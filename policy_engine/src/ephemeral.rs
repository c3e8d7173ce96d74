// Derived ephemeral-port rules for stateless enforcement points.
//
// A stateless filter drops return traffic unless it is explicitly allowed,
// so each tier gets a high-port return rule per direction, inferred from the
// CIDR blocks the opposite direction already talks to. The ingress rule is
// derived first; its blocks are part of the ingress side by the time the
// egress union is taken.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::aggregate::{Direction, RuleBucketMap, TierRuleSet};

/// The CIDR block meaning "anywhere". When a derived rule's union contains
/// it, the whole allow-list collapses to this single entry.
pub const ANYWHERE: &str = "0.0.0.0/0";

/// Ephemeral port range used for return traffic.
pub const EPHEMERAL_PORT_MIN: u16 = 1024;
pub const EPHEMERAL_PORT_MAX: u16 = 65535;

/// A derived return-traffic rule. Appended to a tier's per-direction rule
/// list by stateless consumers, never merged into the traffic-type buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralRule {
    pub direction: Direction,
    pub from_port: u16,
    pub to_port: u16,
    pub protocol: String,
    pub cidr_blocks: Vec<String>,
}

impl EphemeralRule {
    fn new(direction: Direction, cidr_blocks: Vec<String>) -> Self {
        Self {
            direction,
            from_port: EPHEMERAL_PORT_MIN,
            to_port: EPHEMERAL_PORT_MAX,
            protocol: "tcp".to_string(),
            cidr_blocks,
        }
    }
}

/// The pair of derived rules for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedRules {
    pub ingress: EphemeralRule,
    pub egress: EphemeralRule,
}

/// Synthesize the derived rules for one tier's grouped rule set.
pub fn synthesize(rules: &TierRuleSet) -> DerivedRules {
    let ingress_blocks = collapse(cidr_union(&rules.egress, []));
    let egress_blocks = collapse(cidr_union(
        &rules.ingress,
        ingress_blocks.iter().cloned(),
    ));

    DerivedRules {
        ingress: EphemeralRule::new(Direction::Ingress, ingress_blocks),
        egress: EphemeralRule::new(Direction::Egress, egress_blocks),
    }
}

fn cidr_union(
    buckets: &RuleBucketMap,
    extra: impl IntoIterator<Item = String>,
) -> BTreeSet<String> {
    let mut union: BTreeSet<String> = buckets
        .values()
        .flat_map(|bucket| bucket.cidr_targets.iter().cloned())
        .collect();
    union.extend(extra);
    union
}

fn collapse(blocks: BTreeSet<String>) -> Vec<String> {
    if blocks.contains(ANYWHERE) {
        vec![ANYWHERE.to_string()]
    } else {
        blocks.into_iter().collect()
    }
}
