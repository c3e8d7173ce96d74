//! Template context construction.
//!
//! Everything the templates print is precomputed here as plain data: the
//! templates only loop and substitute. Terraform expressions (resource
//! references, variable lookups, concat calls) are built as strings so that
//! the templates never need to understand HCL.

use regex::Regex;
use serde::Serialize;

use policy_engine::{CompiledPolicy, DerivedRules, RuleBucket, TierRuleSet, TrafficType};

use crate::config::Config;
use crate::error::BridgeError;

/// Prefix marking a CIDR expression as a Terraform variable reference
/// rather than a literal block.
const VAR_PREFIX: &str = "var.";

/// Spacing between network ACL rule numbers, leaving room for manual rules.
const ACL_RULE_NUMBER_BASE: u32 = 100;
const ACL_RULE_NUMBER_STEP: u32 = 10;

/// One subnet resource: a (tier, availability zone) pair.
#[derive(Debug, Clone, Serialize)]
pub struct SubnetContext {
    pub name: String,
    pub tier: String,
    pub az: String,
    pub az_index: usize,
    pub netnum: usize,
    pub public: bool,
}

/// One rendered security-group rule.
#[derive(Debug, Clone, Serialize)]
pub struct SgRuleContext {
    pub resource_name: String,
    pub direction: &'static str,
    pub from_port: u16,
    pub to_port: u16,
    pub protocol: String,
    /// Set for tier targets: the peer security group name.
    pub source_security_group: Option<String>,
    /// Set for CIDR targets: a ready HCL list expression.
    pub cidr_blocks_expr: Option<String>,
}

/// One rendered network-ACL entry.
#[derive(Debug, Clone, Serialize)]
pub struct AclEntryContext {
    pub resource_name: String,
    pub rule_number: u32,
    pub egress: bool,
    pub protocol: String,
    /// None for the any-protocol wildcard, which matches every port.
    pub from_port: Option<u16>,
    pub to_port: Option<u16>,
    /// Ready HCL expression: a quoted literal, an indexed variable lookup,
    /// or a subnet attribute reference.
    pub cidr_block: String,
    /// Set when the entry fans out over a list variable via `count`.
    pub count_of: Option<String>,
}

/// One Terraform variable declaration.
#[derive(Debug, Clone, Serialize)]
pub struct VariableContext {
    pub name: String,
    pub r#type: &'static str,
}

/// One edge of the traffic-rule diagram.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeContext {
    pub from: String,
    pub to: String,
    pub label: String,
}

/// Subnets for every (tier, availability zone) pair, in declaration order.
/// The netnum feeds `cidrsubnet()` and stays stable as long as the tier and
/// zone lists do.
pub fn subnets(compiled: &CompiledPolicy, availability_zones: &[String]) -> Vec<SubnetContext> {
    let mut subnets = Vec::new();
    for (tier_index, tier) in compiled.tiers.iter().enumerate() {
        for (az_index, az) in availability_zones.iter().enumerate() {
            subnets.push(SubnetContext {
                name: format!("{}_{}", tier.name, az_index),
                tier: tier.name.clone(),
                az: az.clone(),
                az_index,
                netnum: tier_index * availability_zones.len() + az_index,
                public: tier.public,
            });
        }
    }
    subnets
}

/// Security-group rules for one tier: per direction, per traffic type, one
/// rule per peer tier plus one rule for the whole CIDR bucket.
pub fn security_group_rules(
    tier: &str,
    rules: &TierRuleSet,
    compiled: &CompiledPolicy,
) -> Result<Vec<SgRuleContext>, BridgeError> {
    let mut out = Vec::new();
    for (direction, buckets) in [("ingress", &rules.ingress), ("egress", &rules.egress)] {
        for (type_name, bucket) in buckets.iter() {
            let traffic_type = resolve_traffic_type(compiled, type_name)?;
            let (from_port, to_port, protocol) = port_range(&traffic_type);
            let relation = if direction == "ingress" {
                "ingress_from"
            } else {
                "egress_to"
            };

            for target in &bucket.tier_targets {
                out.push(SgRuleContext {
                    resource_name: format!("{tier}_{type_name}_{relation}_{target}"),
                    direction,
                    from_port,
                    to_port,
                    protocol: protocol.clone(),
                    source_security_group: Some(format!("{target}_tier")),
                    cidr_blocks_expr: None,
                });
            }

            if !bucket.cidr_targets.is_empty() {
                out.push(SgRuleContext {
                    resource_name: format!("{tier}_{type_name}_{relation}_cidr_blocks"),
                    direction,
                    from_port,
                    to_port,
                    protocol: protocol.clone(),
                    source_security_group: None,
                    cidr_blocks_expr: Some(cidr_list_expr(&bucket.cidr_targets)),
                });
            }
        }
    }
    Ok(out)
}

/// Network-ACL entries for one tier, ephemeral return-traffic rules
/// appended last. Stateless filters cannot reference peer security groups,
/// so tier targets become subnet CIDR attribute references, one entry per
/// availability zone.
pub fn acl_entries(
    tier: &str,
    rules: &TierRuleSet,
    derived: &DerivedRules,
    compiled: &CompiledPolicy,
    az_count: usize,
) -> Result<Vec<AclEntryContext>, BridgeError> {
    let mut out = Vec::new();

    for (egress, buckets) in [(false, &rules.ingress), (true, &rules.egress)] {
        let mut rule_number = ACL_RULE_NUMBER_BASE;
        let relation = if egress { "egress_to" } else { "ingress_from" };

        for (type_name, bucket) in buckets.iter() {
            let traffic_type = resolve_traffic_type(compiled, type_name)?;
            let ports = acl_ports(&traffic_type);
            let protocol = acl_protocol(&traffic_type);

            for (index, block) in acl_blocks(bucket, az_count).into_iter().enumerate() {
                let (cidr_block, count_of) = block;
                out.push(AclEntryContext {
                    resource_name: format!("{tier}_{type_name}_{relation}_{index}"),
                    rule_number,
                    egress,
                    protocol: protocol.clone(),
                    from_port: ports.map(|(from, _)| from),
                    to_port: ports.map(|(_, to)| to),
                    cidr_block,
                    count_of,
                });
                rule_number += ACL_RULE_NUMBER_STEP;
            }
        }

        let ephemeral = if egress {
            &derived.egress
        } else {
            &derived.ingress
        };
        for (index, block) in ephemeral.cidr_blocks.iter().enumerate() {
            let (cidr_block, count_of) = cidr_expr(block);
            out.push(AclEntryContext {
                resource_name: format!("{tier}_ephemeral_{relation}_{index}"),
                rule_number,
                egress,
                protocol: ephemeral.protocol.clone(),
                from_port: Some(ephemeral.from_port),
                to_port: Some(ephemeral.to_port),
                cidr_block,
                count_of,
            });
            rule_number += ACL_RULE_NUMBER_STEP;
        }
    }

    Ok(out)
}

/// The Terraform variables the artifacts need: the fixed VPC inputs plus one
/// list variable per `var.<name>` reference found in the known CIDR ranges.
pub fn variables(compiled: &CompiledPolicy) -> Vec<VariableContext> {
    let mut out = vec![
        VariableContext {
            name: "vpc_cidr_block".to_string(),
            r#type: "string",
        },
        VariableContext {
            name: "vpc_name".to_string(),
            r#type: "string",
        },
        VariableContext {
            name: "vpc_owner".to_string(),
            r#type: "string",
        },
    ];

    let reference = Regex::new(r"var\.(\w+)").expect("variable reference pattern is valid");
    for range in &compiled.known_cidr_ranges {
        if let Some(captures) = reference.captures(&range.cidr_expression) {
            let name = captures[1].to_string();
            if out.iter().all(|v| v.name != name) {
                out.push(VariableContext {
                    name,
                    r#type: "list(string)",
                });
            }
        }
    }
    out
}

/// Nodes and edges of the traffic-rule diagram. Nodes are every tier and
/// known CIDR range, sorted by name; edges come from the declarative rules
/// as written, wildcards included.
pub fn traffic_graph(config: &Config, compiled: &CompiledPolicy) -> (Vec<String>, Vec<EdgeContext>) {
    let mut nodes: Vec<String> = compiled
        .tiers
        .iter()
        .map(|t| t.name.clone())
        .chain(compiled.known_cidr_ranges.iter().map(|r| r.name.clone()))
        .collect();
    nodes.sort();

    let mut edges = Vec::new();
    for rule in &config.policy.network_traffic_rules {
        let label = rule
            .traffic_type
            .iter()
            .collect::<Vec<_>>()
            .join(", ");
        for source in rule.source.iter() {
            for destination in rule.destination.iter() {
                edges.push(EdgeContext {
                    from: source.to_string(),
                    to: destination.to_string(),
                    label: label.clone(),
                });
            }
        }
    }
    (nodes, edges)
}

fn resolve_traffic_type(
    compiled: &CompiledPolicy,
    name: &str,
) -> Result<TrafficType, BridgeError> {
    compiled.traffic_type(name).ok_or_else(|| {
        BridgeError::Render(format!("grouped rules reference unknown traffic type {name:?}"))
    })
}

/// Security-group port range: the wildcard maps to protocol -1 over 0..0.
fn port_range(traffic_type: &TrafficType) -> (u16, u16, String) {
    if traffic_type.is_wildcard() {
        (0, 0, traffic_type.protocol.clone())
    } else {
        (
            traffic_type.port,
            traffic_type.port,
            traffic_type.protocol.clone(),
        )
    }
}

/// ACL port range: the any-protocol wildcard takes no ports at all.
fn acl_ports(traffic_type: &TrafficType) -> Option<(u16, u16)> {
    if traffic_type.is_wildcard() {
        None
    } else {
        Some((traffic_type.port, traffic_type.port))
    }
}

fn acl_protocol(traffic_type: &TrafficType) -> String {
    traffic_type.protocol.clone()
}

/// Every CIDR block an ACL bucket contributes: subnet references for tier
/// targets (one per availability zone), literal or variable expressions for
/// CIDR targets.
fn acl_blocks(bucket: &RuleBucket, az_count: usize) -> Vec<(String, Option<String>)> {
    let mut blocks = Vec::new();
    for target in &bucket.tier_targets {
        for az_index in 0..az_count {
            blocks.push((
                format!("aws_subnet.{target}_{az_index}.cidr_block"),
                None,
            ));
        }
    }
    for block in &bucket.cidr_targets {
        blocks.push(cidr_expr(block));
    }
    blocks
}

/// An HCL expression for one CIDR value: literal blocks are quoted, variable
/// references fan out over the list via `count`.
fn cidr_expr(block: &str) -> (String, Option<String>) {
    if block.starts_with(VAR_PREFIX) {
        (format!("{block}[count.index]"), Some(block.to_string()))
    } else {
        (format!("{block:?}"), None)
    }
}

/// An HCL list expression for a whole CIDR bucket, concatenating literal
/// blocks with any referenced list variables.
fn cidr_list_expr(blocks: &[String]) -> String {
    let (variables, literals): (Vec<&String>, Vec<&String>) =
        blocks.iter().partition(|b| b.starts_with(VAR_PREFIX));

    let literal_list = format!(
        "[{}]",
        literals
            .iter()
            .map(|b| format!("{b:?}"))
            .collect::<Vec<_>>()
            .join(", ")
    );

    if variables.is_empty() {
        literal_list
    } else {
        let mut parts = Vec::new();
        if !literals.is_empty() {
            parts.push(literal_list);
        }
        parts.extend(variables.iter().map(|v| v.to_string()));
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            format!("concat({})", parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_engine::PolicyCompiler;
    use serde_json::json;

    fn compiled() -> CompiledPolicy {
        let document = serde_json::from_value(json!({
            "network_tiers": [{"name": "web", "public": true}, "db"],
            "known_cidr_ranges": {
                "office": "var.office_ip_ranges",
                "anywhere": "0.0.0.0/0",
            },
            "known_traffic_types": {"https": 443, "ssh": 22},
            "network_traffic_rules": [
                {"source": "web", "destination": "db", "traffic_type": "ssh"},
                {"source": "office", "destination": "web", "traffic_type": "ssh"},
                {"source": "web", "destination": "anywhere", "traffic_type": "https"},
            ],
        }))
        .unwrap();
        PolicyCompiler::new().compile(&document).unwrap()
    }

    #[test]
    fn subnets_cover_every_tier_and_zone() {
        let compiled = compiled();
        let azs = vec!["us-east-1a".to_string(), "us-east-1b".to_string()];
        let subnets = subnets(&compiled, &azs);

        assert_eq!(subnets.len(), 4);
        assert_eq!(subnets[0].name, "web_0");
        assert!(subnets[0].public);
        assert_eq!(subnets[3].name, "db_1");
        assert_eq!(subnets[3].netnum, 3);
        assert!(!subnets[3].public);
    }

    #[test]
    fn tier_targets_become_peer_security_groups() {
        let compiled = compiled();
        let rules =
            security_group_rules("db", &compiled.grouped_rules["db"], &compiled).unwrap();

        let ssh = rules
            .iter()
            .find(|r| r.resource_name == "db_ssh_ingress_from_web")
            .unwrap();
        assert_eq!(ssh.direction, "ingress");
        assert_eq!(ssh.from_port, 22);
        assert_eq!(ssh.source_security_group.as_deref(), Some("web_tier"));
    }

    #[test]
    fn cidr_targets_become_one_list_rule() {
        let compiled = compiled();
        let rules =
            security_group_rules("web", &compiled.grouped_rules["web"], &compiled).unwrap();

        let office = rules
            .iter()
            .find(|r| r.resource_name == "web_ssh_ingress_from_cidr_blocks")
            .unwrap();
        assert_eq!(
            office.cidr_blocks_expr.as_deref(),
            Some("var.office_ip_ranges")
        );

        let egress = rules
            .iter()
            .find(|r| r.resource_name == "web_https_egress_to_cidr_blocks")
            .unwrap();
        assert_eq!(egress.cidr_blocks_expr.as_deref(), Some("[\"0.0.0.0/0\"]"));
    }

    #[test]
    fn wildcard_bucket_renders_as_any_protocol() {
        let compiled = compiled();
        let rules =
            security_group_rules("web", &compiled.grouped_rules["web"], &compiled).unwrap();

        let self_allow = rules
            .iter()
            .find(|r| r.resource_name == "web_all_ingress_from_web")
            .unwrap();
        assert_eq!(self_allow.protocol, "-1");
        assert_eq!(self_allow.from_port, 0);
        assert_eq!(self_allow.to_port, 0);
    }

    #[test]
    fn acl_entries_append_ephemeral_rules_last() {
        let compiled = compiled();
        let derived = &compiled.derived_rules()["web"];
        let entries =
            acl_entries("web", &compiled.grouped_rules["web"], derived, &compiled, 2).unwrap();

        let last_ingress = entries
            .iter()
            .filter(|e| !e.egress)
            .next_back()
            .unwrap();
        assert!(last_ingress.resource_name.starts_with("web_ephemeral_ingress_from"));
        assert_eq!(last_ingress.from_port, Some(1024));
        assert_eq!(last_ingress.to_port, Some(65535));
        // web egresses to 0.0.0.0/0, so the derived ingress collapses.
        assert_eq!(last_ingress.cidr_block, "\"0.0.0.0/0\"");
    }

    #[test]
    fn variable_references_fan_out_with_count() {
        let compiled = compiled();
        let derived = &compiled.derived_rules()["web"];
        let entries =
            acl_entries("web", &compiled.grouped_rules["web"], derived, &compiled, 1).unwrap();

        let office = entries
            .iter()
            .find(|e| e.cidr_block.contains("office_ip_ranges"))
            .unwrap();
        assert_eq!(office.cidr_block, "var.office_ip_ranges[count.index]");
        assert_eq!(office.count_of.as_deref(), Some("var.office_ip_ranges"));
    }

    #[test]
    fn rule_numbers_are_unique_per_direction() {
        let compiled = compiled();
        let derived = &compiled.derived_rules()["web"];
        let entries =
            acl_entries("web", &compiled.grouped_rules["web"], derived, &compiled, 2).unwrap();

        let mut ingress_numbers: Vec<u32> = entries
            .iter()
            .filter(|e| !e.egress)
            .map(|e| e.rule_number)
            .collect();
        let before = ingress_numbers.len();
        ingress_numbers.sort();
        ingress_numbers.dedup();
        assert_eq!(ingress_numbers.len(), before);
    }

    #[test]
    fn variables_include_the_scraped_list_references() {
        let compiled = compiled();
        let variables = variables(&compiled);

        let names: Vec<&str> = variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["vpc_cidr_block", "vpc_name", "vpc_owner", "office_ip_ranges"]
        );
        assert_eq!(variables[3].r#type, "list(string)");
    }

    #[test]
    fn graph_nodes_are_sorted_and_edges_follow_the_document() {
        let compiled = compiled();
        let config = Config {
            region: None,
            availability_zones: Vec::new(),
            policy: serde_json::from_value(json!({
                "network_tiers": ["web", "db"],
                "known_traffic_types": {"ssh": 22},
                "network_traffic_rules": [
                    {"source": "all", "destination": "db", "traffic_type": "ssh"},
                ],
            }))
            .unwrap(),
        };

        let (nodes, edges) = traffic_graph(&config, &compiled);
        assert_eq!(nodes, vec!["anywhere", "db", "office", "web"]);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from, "all");
        assert_eq!(edges[0].label, "ssh");
    }

    #[test]
    fn concat_expression_mixes_literals_and_variables() {
        let blocks = vec![
            "10.0.0.0/8".to_string(),
            "var.partner_ranges".to_string(),
        ];
        assert_eq!(
            cidr_list_expr(&blocks),
            "concat([\"10.0.0.0/8\"], var.partner_ranges)"
        );
    }
}
