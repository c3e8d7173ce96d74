// examples/compile_usage.rs
//
// Example demonstrating PolicyCompiler usage patterns

use policy_engine::compiler::{CompilerOptions, PolicyCompiler};
use policy_engine::prune::PruneMode;
use policy_engine::rule::PolicyDocument;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== PolicyCompiler Usage Examples ===\n");

    // Example 1: A small tiered network
    basic_compilation()?;

    // Example 2: Wildcards and subsumption
    wildcard_rules()?;

    // Example 3: Derived ephemeral rules for stateless filters
    derived_rules()?;

    println!("\n=== All Examples Completed Successfully ===");
    Ok(())
}

// ============================================================================
// Example 1: Basic Compilation
// ============================================================================

fn basic_compilation() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Example 1: Basic Compilation ---");

    let document: PolicyDocument = serde_json::from_value(serde_json::json!({
        "network_tiers": [
            {"name": "web", "public": true},
            "app",
            "db",
        ],
        "known_traffic_types": {
            "https": 443,
            "postgres": {"port": 5432, "protocol": "tcp"},
        },
        "network_traffic_rules": [
            {"source": "web", "destination": "app", "traffic_type": "https"},
            {"source": "app", "destination": "db", "traffic_type": "postgres"},
        ],
    }))?;

    let compiled = PolicyCompiler::new().compile(&document)?;

    println!("✓ Compiled {} tiers", compiled.tiers.len());
    println!("  Public tiers:  {:?}", compiled.public_tiers);
    println!("  Private tiers: {:?}", compiled.private_tiers);
    println!("  NAT tier:      {:?}", compiled.nat_tier);

    for (tier, rules) in &compiled.grouped_rules {
        println!("  {tier}:");
        for (traffic_type, bucket) in &rules.ingress {
            println!(
                "    ingress {traffic_type}: tiers={:?} cidrs={:?}",
                bucket.tier_targets, bucket.cidr_targets
            );
        }
        for (traffic_type, bucket) in &rules.egress {
            println!(
                "    egress  {traffic_type}: tiers={:?} cidrs={:?}",
                bucket.tier_targets, bucket.cidr_targets
            );
        }
    }

    Ok(())
}

// ============================================================================
// Example 2: Wildcards and Subsumption
// ============================================================================

fn wildcard_rules() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n--- Example 2: Wildcards and Subsumption ---");

    let document: PolicyDocument = serde_json::from_value(serde_json::json!({
        "network_tiers": ["bastion", "web", "db"],
        "known_traffic_types": {"ssh": 22},
        "network_traffic_rules": [
            // Blanket rule: every tier may ssh to the bastion...
            {"source": "all", "destination": "bastion", "traffic_type": "ssh"},
            // ...which makes this narrower rule redundant.
            {"source": "web", "destination": "bastion", "traffic_type": "ssh"},
        ],
    }))?;

    let compiled = PolicyCompiler::new().compile(&document)?;
    let ingress = &compiled.grouped_rules["bastion"].ingress["ssh"];
    println!("✓ bastion ingress ssh sources: {:?}", ingress.tier_targets);

    // The Legacy prune mode reproduces the unguarded lookups of earlier
    // releases; note the missing self-allow entries in its output.
    let legacy = PolicyCompiler::with_options(CompilerOptions {
        prune_mode: PruneMode::Legacy,
    })
    .compile(&document)?;
    println!(
        "✓ legacy mode kept {} traffic types on bastion ingress",
        legacy.grouped_rules["bastion"].ingress.len()
    );

    Ok(())
}

// ============================================================================
// Example 3: Derived Ephemeral Rules
// ============================================================================

fn derived_rules() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n--- Example 3: Derived Ephemeral Rules ---");

    let document: PolicyDocument = serde_json::from_value(serde_json::json!({
        "network_tiers": [{"name": "web", "public": true}],
        "known_cidr_ranges": {
            "anywhere": "0.0.0.0/0",
            "office": "203.0.113.0/24",
        },
        "known_traffic_types": {"https": 443},
        "network_traffic_rules": [
            {"source": "web", "destination": "anywhere", "traffic_type": "https"},
            {"source": "office", "destination": "web", "traffic_type": "https"},
        ],
    }))?;

    let compiled = PolicyCompiler::new().compile(&document)?;
    for (tier, derived) in compiled.derived_rules() {
        println!(
            "✓ {tier}: ephemeral ingress {:?} / egress {:?}",
            derived.ingress.cidr_blocks, derived.egress.cidr_blocks
        );
    }

    Ok(())
}
