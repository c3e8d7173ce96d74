// Entity declarations and normalization.
//
// The input document is duck typed: a tier is either a bare name or a
// {name, public} mapping, a traffic type either a bare port or a
// {port, protocol} mapping. Normalization resolves the shape exactly once
// into canonical lookup tables; nothing downstream branches on shape again.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CompileError;

/// Reserved reference name that stands for every tier (on the source and
/// destination axes) or every port and protocol (on the traffic-type axis).
pub const WILDCARD: &str = "all";

/// Sentinel protocol carried by the wildcard traffic type.
pub const ANY_PROTOCOL: &str = "-1";

const DEFAULT_PROTOCOL: &str = "tcp";

/// A named network segment. `public` marks tiers that sit behind an internet
/// gateway; the first public tier in declaration order doubles as the
/// NAT-egress tier for the private ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTier {
    pub name: String,
    pub public: bool,
}

impl NetworkTier {
    pub fn new(name: impl Into<String>, public: bool) -> Self {
        Self {
            name: name.into(),
            public,
        }
    }
}

/// A named external address block. The expression is opaque to the compiler:
/// it may be a literal CIDR (`"203.0.113.0/24"`) or a symbolic reference
/// (`"var.office_ip_ranges"`) that only the downstream renderer understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownCidrRange {
    pub name: String,
    pub cidr_expression: String,
}

impl KnownCidrRange {
    pub fn new(name: impl Into<String>, cidr_expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cidr_expression: cidr_expression.into(),
        }
    }
}

/// A named port/protocol pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrafficType {
    pub name: String,
    pub port: u16,
    pub protocol: String,
}

impl TrafficType {
    pub fn new(name: impl Into<String>, port: u16, protocol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port,
            protocol: protocol.into(),
        }
    }

    /// The synthetic wildcard traffic type: port 0, any protocol. It is never
    /// declared in the input; the reserved name resolves to this value.
    pub fn wildcard() -> Self {
        Self::new(WILDCARD, 0, ANY_PROTOCOL)
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == WILDCARD
    }
}

/// Raw tier entry as written in the document: a bare name or a mapping.
/// The catch-all variant keeps shape rejection inside the normalizer.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TierDecl {
    Name(String),
    Spec {
        name: String,
        #[serde(default)]
        public: bool,
    },
    Other(Value),
}

/// Raw traffic-type entry: a bare port or a {port, protocol} mapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TrafficTypeDecl {
    Port(u16),
    Spec {
        port: u16,
        #[serde(default = "default_protocol")]
        protocol: String,
    },
    Other(Value),
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

/// Canonical entity tables produced by [`normalize`]. Tiers keep their
/// declaration order; CIDR ranges and traffic types are sorted by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCatalog {
    tiers: Vec<NetworkTier>,
    tier_index: HashMap<String, usize>,
    cidr_ranges: Vec<KnownCidrRange>,
    cidr_index: HashMap<String, usize>,
    traffic_types: Vec<TrafficType>,
    traffic_type_index: HashMap<String, usize>,
}

impl EntityCatalog {
    /// Declared tiers in declaration order.
    pub fn tiers(&self) -> &[NetworkTier] {
        &self.tiers
    }

    /// Declared CIDR ranges, sorted by name.
    pub fn cidr_ranges(&self) -> &[KnownCidrRange] {
        &self.cidr_ranges
    }

    /// Declared traffic types, sorted by name. The synthetic wildcard is not
    /// listed here; [`EntityCatalog::traffic_type`] resolves it on demand.
    pub fn traffic_types(&self) -> &[TrafficType] {
        &self.traffic_types
    }

    pub fn tier(&self, name: &str) -> Option<&NetworkTier> {
        self.tier_index.get(name).map(|&i| &self.tiers[i])
    }

    pub fn cidr_range(&self, name: &str) -> Option<&KnownCidrRange> {
        self.cidr_index.get(name).map(|&i| &self.cidr_ranges[i])
    }

    /// Look up a traffic type by name. The reserved name resolves to the
    /// synthetic wildcard.
    pub fn traffic_type(&self, name: &str) -> Option<TrafficType> {
        if name == WILDCARD {
            return Some(TrafficType::wildcard());
        }
        self.traffic_type_index
            .get(name)
            .map(|&i| self.traffic_types[i].clone())
    }

    /// Names of public tiers, in declaration order.
    pub fn public_tiers(&self) -> Vec<String> {
        self.tiers
            .iter()
            .filter(|t| t.public)
            .map(|t| t.name.clone())
            .collect()
    }

    /// Names of private tiers, in declaration order.
    pub fn private_tiers(&self) -> Vec<String> {
        self.tiers
            .iter()
            .filter(|t| !t.public)
            .map(|t| t.name.clone())
            .collect()
    }

    /// The NAT-egress tier: the first public tier in declaration order.
    pub fn nat_tier(&self) -> Option<String> {
        self.tiers.iter().find(|t| t.public).map(|t| t.name.clone())
    }
}

/// Build the canonical entity tables from raw declarations.
///
/// Fails with [`CompileError::MalformedEntity`] on unexpected declaration
/// shapes or duplicate tier names, [`CompileError::ReservedName`] when a
/// declaration claims the wildcard name, and
/// [`CompileError::AmbiguousReference`] when a name appears in both the tier
/// and CIDR-range namespaces.
pub fn normalize(
    tiers: &[TierDecl],
    cidr_ranges: impl IntoIterator<Item = (String, String)>,
    traffic_types: impl IntoIterator<Item = (String, TrafficTypeDecl)>,
) -> Result<EntityCatalog, CompileError> {
    let mut normalized_tiers: Vec<NetworkTier> = Vec::with_capacity(tiers.len());
    let mut tier_index: HashMap<String, usize> = HashMap::new();

    for decl in tiers {
        let tier = match decl {
            TierDecl::Name(name) => NetworkTier::new(name.clone(), false),
            TierDecl::Spec { name, public } => NetworkTier::new(name.clone(), *public),
            TierDecl::Other(value) => {
                return Err(CompileError::MalformedEntity(format!(
                    "network tier must be a name or a {{name, public}} mapping, got {value}"
                )));
            }
        };
        if tier.name == WILDCARD {
            return Err(CompileError::ReservedName(tier.name));
        }
        if tier_index.contains_key(&tier.name) {
            return Err(CompileError::MalformedEntity(format!(
                "network tier {:?} is declared twice",
                tier.name
            )));
        }
        tier_index.insert(tier.name.clone(), normalized_tiers.len());
        normalized_tiers.push(tier);
    }

    let mut normalized_cidrs: Vec<KnownCidrRange> = cidr_ranges
        .into_iter()
        .map(|(name, expr)| KnownCidrRange::new(name, expr))
        .collect();
    normalized_cidrs.sort_by(|a, b| a.name.cmp(&b.name));
    let mut cidr_index: HashMap<String, usize> = HashMap::new();
    for (i, range) in normalized_cidrs.iter().enumerate() {
        if range.name == WILDCARD {
            return Err(CompileError::ReservedName(range.name.clone()));
        }
        if tier_index.contains_key(&range.name) {
            return Err(CompileError::AmbiguousReference(range.name.clone()));
        }
        if cidr_index.insert(range.name.clone(), i).is_some() {
            return Err(CompileError::MalformedEntity(format!(
                "known CIDR range {:?} is declared twice",
                range.name
            )));
        }
    }

    let mut normalized_types: Vec<TrafficType> = Vec::new();
    for (name, decl) in traffic_types {
        if name == WILDCARD {
            return Err(CompileError::ReservedName(name));
        }
        let traffic_type = match decl {
            TrafficTypeDecl::Port(port) => TrafficType::new(name, port, DEFAULT_PROTOCOL),
            TrafficTypeDecl::Spec { port, protocol } => TrafficType::new(name, port, protocol),
            TrafficTypeDecl::Other(value) => {
                return Err(CompileError::MalformedEntity(format!(
                    "traffic type {name:?} must be a port or a {{port, protocol}} mapping, got {value}"
                )));
            }
        };
        normalized_types.push(traffic_type);
    }
    normalized_types.sort_by(|a, b| a.name.cmp(&b.name));
    let traffic_type_index: HashMap<String, usize> = normalized_types
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.clone(), i))
        .collect();

    Ok(EntityCatalog {
        tiers: normalized_tiers,
        tier_index,
        cidr_ranges: normalized_cidrs,
        cidr_index,
        traffic_types: normalized_types,
        traffic_type_index,
    })
}
