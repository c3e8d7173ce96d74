// Declarative traffic rules and their resolved form.
//
// Each axis of a rule (source, destination, traffic type) accepts one
// reference or a list of references; a reference is a tier name, a known
// CIDR-range name, or the reserved wildcard. Resolution tags every endpoint
// once, so later stages never re-examine raw names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{TierDecl, TrafficType, TrafficTypeDecl, WILDCARD};

/// One reference or a list of references on a rule axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefList {
    One(String),
    Many(Vec<String>),
}

impl RefList {
    pub fn one(name: impl Into<String>) -> Self {
        RefList::One(name.into())
    }

    pub fn many<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RefList::Many(names.into_iter().map(Into::into).collect())
    }

    /// The wildcard reference.
    pub fn wildcard() -> Self {
        RefList::One(WILDCARD.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            RefList::One(name) => std::slice::from_ref(name).iter(),
            RefList::Many(names) => names.iter(),
        }
        .map(String::as_str)
    }
}

/// A declarative traffic rule as written in the input document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficRule {
    pub source: RefList,
    pub destination: RefList,
    #[serde(alias = "trafficType")]
    pub traffic_type: RefList,
}

impl TrafficRule {
    pub fn new(source: RefList, destination: RefList, traffic_type: RefList) -> Self {
        Self {
            source,
            destination,
            traffic_type,
        }
    }
}

/// The whole input document consumed by the compiler, as deserialized by an
/// external parser. Field names follow the document format.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub network_tiers: Vec<TierDecl>,
    #[serde(default)]
    pub known_cidr_ranges: BTreeMap<String, String>,
    #[serde(default)]
    pub known_traffic_types: BTreeMap<String, TrafficTypeDecl>,
    #[serde(default)]
    pub network_traffic_rules: Vec<TrafficRule>,
}

/// A resolved rule endpoint. CIDR ranges carry their expression so that no
/// later stage needs the catalog to read it; `Any` is the tier-axis wildcard,
/// which the aggregator expands to every declared tier (never CIDR ranges).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Endpoint {
    Tier(String),
    CidrRange { name: String, cidr_expression: String },
    Any,
}

impl Endpoint {
    /// The key this endpoint occupies in the expanded rule structure.
    pub fn key(&self) -> &str {
        match self {
            Endpoint::Tier(name) => name,
            Endpoint::CidrRange { name, .. } => name,
            Endpoint::Any => WILDCARD,
        }
    }

    pub fn is_tier(&self) -> bool {
        matches!(self, Endpoint::Tier(_))
    }

    pub fn is_cidr_range(&self) -> bool {
        matches!(self, Endpoint::CidrRange { .. })
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Endpoint::Any)
    }
}

/// One fully resolved (source, destination, traffic type) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedTrafficRule {
    pub source: Endpoint,
    pub destination: Endpoint,
    pub traffic_type: TrafficType,
}
