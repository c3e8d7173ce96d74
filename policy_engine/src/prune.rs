// Subsumption-based pruning.
//
// A triple is redundant when a broader wildcard triple already authorizes
// the same traffic: a blanket source for the same type/destination, a
// blanket destination for the same source/type, or a blanket traffic type
// for the same source/destination. The pass is single-shot: removal
// decisions are made against a frozen snapshot of the full structure, so
// the outcome does not depend on iteration order and removed entries never
// cascade into further removals.

use crate::entity::WILDCARD;
use crate::expand::ExpandedRuleSet;

/// Controls how the wildcard lookups are gated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PruneMode {
    /// Only fully concrete triples are candidates for removal, and the two
    /// tier-axis checks apply only when both endpoints of the candidate are
    /// tiers. This is the behavior the rest of the pipeline relies on.
    #[default]
    Guarded,
    /// Compatibility mode reproducing earlier releases, where the
    /// destination-wildcard and traffic-type-wildcard checks were bare
    /// existence lookups with their own-wildcard guards folded into the
    /// lookup path. Under this mode every triple is a candidate and a
    /// wildcard entry matches itself, so blanket-destination and
    /// blanket-type rules (including the synthetic self-allow rules) are
    /// dropped from the output.
    Legacy,
}

/// Remove triples that a broader wildcard entry already covers.
pub fn prune(rules: &ExpandedRuleSet, mode: PruneMode) -> ExpandedRuleSet {
    let snapshot = rules;
    let mut pruned = rules.clone();

    for rule in snapshot.iter() {
        let source = rule.source.key();
        let traffic_type = rule.traffic_type.name.as_str();
        let destination = rule.destination.key();

        let redundant = match mode {
            PruneMode::Guarded => {
                if source == WILDCARD || traffic_type == WILDCARD || destination == WILDCARD {
                    false
                } else {
                    // Wildcard expansion never produces CIDR ranges, so the
                    // tier-axis checks only make sense between tiers.
                    let tier_to_tier = rule.source.is_tier() && rule.destination.is_tier();
                    (tier_to_tier && snapshot.contains(WILDCARD, traffic_type, destination))
                        || (tier_to_tier && snapshot.contains(source, traffic_type, WILDCARD))
                        || snapshot.contains(source, WILDCARD, destination)
                }
            }
            PruneMode::Legacy => {
                (source != WILDCARD && snapshot.contains(WILDCARD, traffic_type, destination))
                    || snapshot.contains(source, traffic_type, WILDCARD)
                    || snapshot.contains(source, WILDCARD, destination)
            }
        };

        if redundant {
            pruned.remove(source, traffic_type, destination);
        }
    }

    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{normalize, EntityCatalog, TierDecl, TrafficTypeDecl};
    use crate::expand::expand;
    use crate::rule::{RefList, TrafficRule};
    use serde_json::json;

    fn catalog() -> EntityCatalog {
        let tiers: Vec<TierDecl> =
            serde_json::from_value(json!([{"name": "web", "public": true}, "app", "db"])).unwrap();
        normalize(
            &tiers,
            [("office".to_string(), "var.office_ip_ranges".to_string())],
            [
                ("ssh".to_string(), TrafficTypeDecl::Port(22)),
                ("https".to_string(), TrafficTypeDecl::Port(443)),
            ],
        )
        .unwrap()
    }

    fn rule(source: &str, destination: &str, traffic_type: &str) -> TrafficRule {
        TrafficRule::new(
            RefList::one(source),
            RefList::one(destination),
            RefList::one(traffic_type),
        )
    }

    #[test]
    fn blanket_source_subsumes_concrete_source() {
        let expanded = expand(
            &catalog(),
            &[rule("all", "db", "ssh"), rule("app", "db", "ssh")],
        )
        .unwrap();
        let pruned = prune(&expanded, PruneMode::Guarded);

        assert!(pruned.contains(WILDCARD, "ssh", "db"));
        assert!(!pruned.contains("app", "ssh", "db"));
    }

    #[test]
    fn blanket_destination_subsumes_concrete_destination() {
        let expanded = expand(
            &catalog(),
            &[rule("web", "all", "https"), rule("web", "db", "https")],
        )
        .unwrap();
        let pruned = prune(&expanded, PruneMode::Guarded);

        assert!(pruned.contains("web", "https", WILDCARD));
        assert!(!pruned.contains("web", "https", "db"));
    }

    #[test]
    fn blanket_traffic_type_subsumes_concrete_type() {
        let expanded = expand(
            &catalog(),
            &[rule("web", "db", "all"), rule("web", "db", "ssh")],
        )
        .unwrap();
        let pruned = prune(&expanded, PruneMode::Guarded);

        assert!(pruned.contains("web", WILDCARD, "db"));
        assert!(!pruned.contains("web", "ssh", "db"));
    }

    #[test]
    fn unrelated_concrete_triples_survive() {
        let expanded = expand(
            &catalog(),
            &[rule("all", "db", "ssh"), rule("app", "web", "ssh")],
        )
        .unwrap();
        let pruned = prune(&expanded, PruneMode::Guarded);

        // Different destination: the blanket-source entry does not cover it.
        assert!(pruned.contains("app", "ssh", "web"));
    }

    #[test]
    fn wildcard_entries_are_never_candidates_when_guarded() {
        let expanded = expand(
            &catalog(),
            &[rule("all", "db", "ssh"), rule("web", "all", "ssh")],
        )
        .unwrap();
        let pruned = prune(&expanded, PruneMode::Guarded);

        assert!(pruned.contains(WILDCARD, "ssh", "db"));
        assert!(pruned.contains("web", "ssh", WILDCARD));
        // Synthetic self rules carry the type wildcard and survive too.
        for tier in ["web", "app", "db"] {
            assert!(pruned.contains(tier, WILDCARD, tier));
        }
    }

    #[test]
    fn cidr_endpoints_are_not_pruned_by_tier_axis_wildcards() {
        // all -> all tiers; the office range is not a tier, so neither the
        // blanket source nor the blanket destination covers it.
        let expanded = expand(
            &catalog(),
            &[
                rule("all", "db", "ssh"),
                rule("office", "db", "ssh"),
                rule("web", "all", "https"),
                rule("web", "office", "https"),
            ],
        )
        .unwrap();
        let pruned = prune(&expanded, PruneMode::Guarded);

        assert!(pruned.contains("office", "ssh", "db"));
        assert!(pruned.contains("web", "https", "office"));
    }

    #[test]
    fn blanket_traffic_type_subsumes_cidr_endpoint_triples() {
        let expanded = expand(
            &catalog(),
            &[rule("office", "web", "all"), rule("office", "web", "ssh")],
        )
        .unwrap();
        let pruned = prune(&expanded, PruneMode::Guarded);

        assert!(pruned.contains("office", WILDCARD, "web"));
        assert!(!pruned.contains("office", "ssh", "web"));
    }

    #[test]
    fn legacy_mode_drops_wildcard_entries_that_match_themselves() {
        let expanded = expand(
            &catalog(),
            &[rule("web", "all", "ssh"), rule("web", "db", "all")],
        )
        .unwrap();
        let pruned = prune(&expanded, PruneMode::Legacy);

        // The blanket-destination entry satisfies its own lookup and the
        // blanket-type entry satisfies its own, so both disappear, as do the
        // synthetic self-allow rules.
        assert!(!pruned.contains("web", "ssh", WILDCARD));
        assert!(!pruned.contains("web", WILDCARD, "db"));
        for tier in ["web", "app", "db"] {
            assert!(!pruned.contains(tier, WILDCARD, tier));
        }
    }

    #[test]
    fn legacy_mode_still_applies_the_blanket_source_check() {
        let expanded = expand(
            &catalog(),
            &[rule("all", "db", "ssh"), rule("app", "db", "ssh")],
        )
        .unwrap();
        let pruned = prune(&expanded, PruneMode::Legacy);

        assert!(pruned.contains(WILDCARD, "ssh", "db"));
        assert!(!pruned.contains("app", "ssh", "db"));
    }

    #[test]
    fn removal_decisions_do_not_cascade() {
        // (app, ssh, db) is covered by the blanket source; removing it must
        // not re-evaluate anything else against the shrunken structure.
        let expanded = expand(
            &catalog(),
            &[
                rule("all", "db", "ssh"),
                rule("app", "db", "ssh"),
                rule("app", "web", "ssh"),
            ],
        )
        .unwrap();
        let pruned = prune(&expanded, PruneMode::Guarded);

        assert!(!pruned.contains("app", "ssh", "db"));
        assert!(pruned.contains("app", "ssh", "web"));
        assert!(pruned.contains(WILDCARD, "ssh", "db"));
    }
}
