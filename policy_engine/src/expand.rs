// Wildcard expansion and cross-product rule generation.
//
// Rules are resolved against the entity catalog and emitted into a
// three-level structure keyed source name -> traffic-type name ->
// destination name. The wildcard is a live key on every axis; the pruner
// matches against it and the aggregator is what finally expands it to the
// declared tier set.

use std::collections::{BTreeMap, BTreeSet};

use crate::entity::{EntityCatalog, TrafficType, WILDCARD};
use crate::error::CompileError;
use crate::rule::{Endpoint, ExpandedTrafficRule, RefList, TrafficRule};

/// The expanded rule structure. Insertion order is insignificant; the keyed
/// maps give set semantics and deterministic iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpandedRuleSet {
    rules: BTreeMap<String, BTreeMap<String, BTreeMap<String, ExpandedTrafficRule>>>,
}

impl ExpandedRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a triple. Re-inserting the same key path is a no-op overwrite,
    /// which is what gives the cross product its dedup behavior.
    pub fn insert(&mut self, rule: ExpandedTrafficRule) {
        self.rules
            .entry(rule.source.key().to_string())
            .or_default()
            .entry(rule.traffic_type.name.clone())
            .or_default()
            .insert(rule.destination.key().to_string(), rule);
    }

    pub fn contains(&self, source: &str, traffic_type: &str, destination: &str) -> bool {
        self.get(source, traffic_type, destination).is_some()
    }

    pub fn get(
        &self,
        source: &str,
        traffic_type: &str,
        destination: &str,
    ) -> Option<&ExpandedTrafficRule> {
        self.rules
            .get(source)?
            .get(traffic_type)?
            .get(destination)
    }

    pub fn remove(&mut self, source: &str, traffic_type: &str, destination: &str) {
        let Some(by_type) = self.rules.get_mut(source) else {
            return;
        };
        if let Some(by_dest) = by_type.get_mut(traffic_type) {
            by_dest.remove(destination);
            if by_dest.is_empty() {
                by_type.remove(traffic_type);
            }
        }
        if by_type.is_empty() {
            self.rules.remove(source);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpandedTrafficRule> {
        self.rules
            .values()
            .flat_map(|by_type| by_type.values())
            .flat_map(|by_dest| by_dest.values())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Expand the declarative rules into the full triple structure.
///
/// One synthetic self-to-self allow-all rule is appended per tier before the
/// declared rules are resolved, so every tier talks to itself on every
/// traffic type without the document having to say so.
pub fn expand(
    catalog: &EntityCatalog,
    rules: &[TrafficRule],
) -> Result<ExpandedRuleSet, CompileError> {
    let mut expanded = ExpandedRuleSet::new();

    for tier in catalog.tiers() {
        expanded.insert(ExpandedTrafficRule {
            source: Endpoint::Tier(tier.name.clone()),
            destination: Endpoint::Tier(tier.name.clone()),
            traffic_type: TrafficType::wildcard(),
        });
    }

    for rule in rules {
        let sources = resolve_endpoints(catalog, &rule.source)?;
        let destinations = resolve_endpoints(catalog, &rule.destination)?;
        let traffic_types = resolve_traffic_types(catalog, &rule.traffic_type)?;

        for source in &sources {
            for destination in &destinations {
                for traffic_type in &traffic_types {
                    expanded.insert(ExpandedTrafficRule {
                        source: source.clone(),
                        destination: destination.clone(),
                        traffic_type: traffic_type.clone(),
                    });
                }
            }
        }
    }

    Ok(expanded)
}

/// Resolve one tier/CIDR axis to a deduplicated endpoint set. Every name is
/// validated even when the wildcard is present; a wildcard in the list then
/// collapses the whole axis, since the explicit names are redundant subsets.
fn resolve_endpoints(
    catalog: &EntityCatalog,
    refs: &RefList,
) -> Result<BTreeSet<Endpoint>, CompileError> {
    let mut endpoints = BTreeSet::new();
    for name in refs.iter() {
        if name == WILDCARD {
            endpoints.insert(Endpoint::Any);
        } else if catalog.tier(name).is_some() {
            endpoints.insert(Endpoint::Tier(name.to_string()));
        } else if let Some(range) = catalog.cidr_range(name) {
            endpoints.insert(Endpoint::CidrRange {
                name: range.name.clone(),
                cidr_expression: range.cidr_expression.clone(),
            });
        } else {
            return Err(CompileError::UnknownNetworkTier(name.to_string()));
        }
    }
    if endpoints.contains(&Endpoint::Any) {
        endpoints.retain(Endpoint::is_any);
    }
    Ok(endpoints)
}

/// Resolve the traffic-type axis, with the same wildcard collapse rule.
fn resolve_traffic_types(
    catalog: &EntityCatalog,
    refs: &RefList,
) -> Result<BTreeSet<TrafficType>, CompileError> {
    let mut traffic_types = BTreeSet::new();
    for name in refs.iter() {
        let traffic_type = catalog
            .traffic_type(name)
            .ok_or_else(|| CompileError::UnknownTrafficType(name.to_string()))?;
        traffic_types.insert(traffic_type);
    }
    if traffic_types.iter().any(TrafficType::is_wildcard) {
        traffic_types.retain(TrafficType::is_wildcard);
    }
    Ok(traffic_types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{normalize, TierDecl, TrafficTypeDecl};
    use serde_json::json;

    fn catalog() -> EntityCatalog {
        let tiers: Vec<TierDecl> =
            serde_json::from_value(json!([{"name": "web", "public": true}, "app", "db"])).unwrap();
        normalize(
            &tiers,
            [("office".to_string(), "var.office_ip_ranges".to_string())],
            [("ssh".to_string(), TrafficTypeDecl::Port(22))],
        )
        .unwrap()
    }

    #[test]
    fn every_tier_gets_a_self_allow_all_rule() {
        let expanded = expand(&catalog(), &[]).unwrap();
        for tier in ["web", "app", "db"] {
            assert!(expanded.contains(tier, WILDCARD, tier));
        }
        assert_eq!(expanded.len(), 3);
    }

    #[test]
    fn cross_product_covers_every_combination() {
        let rules = vec![TrafficRule::new(
            RefList::many(["web", "app"]),
            RefList::many(["db", "office"]),
            RefList::one("ssh"),
        )];
        let expanded = expand(&catalog(), &rules).unwrap();

        for source in ["web", "app"] {
            for destination in ["db", "office"] {
                assert!(expanded.contains(source, "ssh", destination));
            }
        }
        // 4 cross-product triples + 3 synthetic self rules.
        assert_eq!(expanded.len(), 7);
    }

    #[test]
    fn wildcard_mixed_with_explicit_names_collapses() {
        let explicit = vec![TrafficRule::new(
            RefList::wildcard(),
            RefList::one("db"),
            RefList::one("ssh"),
        )];
        let mixed = vec![TrafficRule::new(
            RefList::many(["all", "web", "app"]),
            RefList::one("db"),
            RefList::one("ssh"),
        )];

        let expanded_explicit = expand(&catalog(), &explicit).unwrap();
        let expanded_mixed = expand(&catalog(), &mixed).unwrap();

        assert_eq!(expanded_explicit, expanded_mixed);
        assert!(expanded_mixed.contains(WILDCARD, "ssh", "db"));
        assert!(!expanded_mixed.contains("web", "ssh", "db"));
    }

    #[test]
    fn wildcard_traffic_type_mixed_with_named_collapses() {
        let rules = vec![TrafficRule::new(
            RefList::one("web"),
            RefList::one("db"),
            RefList::many(["ssh", "all"]),
        )];
        let expanded = expand(&catalog(), &rules).unwrap();

        assert!(expanded.contains("web", WILDCARD, "db"));
        assert!(!expanded.contains("web", "ssh", "db"));
    }

    #[test]
    fn wildcard_source_stays_a_single_key() {
        let rules = vec![TrafficRule::new(
            RefList::wildcard(),
            RefList::one("db"),
            RefList::one("ssh"),
        )];
        let expanded = expand(&catalog(), &rules).unwrap();
        assert!(expanded.contains(WILDCARD, "ssh", "db"));
        assert_eq!(expanded.len(), 4);
    }

    #[test]
    fn cidr_range_resolves_with_its_expression() {
        let rules = vec![TrafficRule::new(
            RefList::one("office"),
            RefList::one("web"),
            RefList::one("ssh"),
        )];
        let expanded = expand(&catalog(), &rules).unwrap();
        let rule = expanded.get("office", "ssh", "web").unwrap();
        assert_eq!(
            rule.source,
            Endpoint::CidrRange {
                name: "office".to_string(),
                cidr_expression: "var.office_ip_ranges".to_string(),
            }
        );
    }

    #[test]
    fn unknown_endpoint_reference_fails() {
        let rules = vec![TrafficRule::new(
            RefList::one("dmz"),
            RefList::one("db"),
            RefList::one("ssh"),
        )];
        assert_eq!(
            expand(&catalog(), &rules).unwrap_err(),
            CompileError::UnknownNetworkTier("dmz".to_string())
        );
    }

    #[test]
    fn unknown_traffic_type_reference_fails() {
        let rules = vec![TrafficRule::new(
            RefList::one("web"),
            RefList::one("db"),
            RefList::one("telnet"),
        )];
        assert_eq!(
            expand(&catalog(), &rules).unwrap_err(),
            CompileError::UnknownTrafficType("telnet".to_string())
        );
    }

    #[test]
    fn duplicate_references_dedupe() {
        let rules = vec![
            TrafficRule::new(
                RefList::many(["web", "web"]),
                RefList::one("db"),
                RefList::one("ssh"),
            ),
            TrafficRule::new(RefList::one("web"), RefList::one("db"), RefList::one("ssh")),
        ];
        let expanded = expand(&catalog(), &rules).unwrap();
        assert_eq!(expanded.len(), 4);
    }
}
