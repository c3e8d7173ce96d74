//! Template rendering.
//!
//! The renderer owns a minijinja environment with the embedded template set
//! and turns one compiled policy into the full artifact list: Terraform for
//! the VPC scaffolding, one security group and one network ACL per tier, and
//! a Graphviz diagram of the declared traffic rules. All state is explicit:
//! the environment, the configuration, and the compiled policy are plain
//! parameters, and the output directory only appears in [`write_files`].

pub mod context;

use std::fs;
use std::path::Path;

use minijinja::{context, Environment, UndefinedBehavior};

use policy_engine::CompiledPolicy;

use crate::config::Config;
use crate::error::BridgeError;

const MAIN_TF: &str = include_str!("../../templates/main.tf.j2");
const SUBNETS_TF: &str = include_str!("../../templates/subnets.tf.j2");
const SECURITY_GROUP_TF: &str = include_str!("../../templates/security_group.tf.j2");
const NETWORK_ACL_TF: &str = include_str!("../../templates/network_acl.tf.j2");
const INTERNET_GATEWAY_TF: &str = include_str!("../../templates/internet_gateway.tf.j2");
const NAT_GATEWAYS_TF: &str = include_str!("../../templates/nat_gateways.tf.j2");
const VARIABLES_TF: &str = include_str!("../../templates/variables.tf.j2");
const OUTPUTS_TF: &str = include_str!("../../templates/outputs.tf.j2");
const TRAFFIC_RULES_DOT: &str = include_str!("../../templates/traffic_rules.dot.j2");

const DEFAULT_REGION: &str = "us-east-1";

/// One rendered artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub name: String,
    pub contents: String,
}

/// Renders compiled policies into Terraform and Graphviz artifacts.
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self, BridgeError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template("main.tf", MAIN_TF)?;
        env.add_template("subnets.tf", SUBNETS_TF)?;
        env.add_template("security_group.tf", SECURITY_GROUP_TF)?;
        env.add_template("network_acl.tf", NETWORK_ACL_TF)?;
        env.add_template("internet_gateway.tf", INTERNET_GATEWAY_TF)?;
        env.add_template("nat_gateways.tf", NAT_GATEWAYS_TF)?;
        env.add_template("variables.tf", VARIABLES_TF)?;
        env.add_template("outputs.tf", OUTPUTS_TF)?;
        env.add_template("traffic_rules.dot", TRAFFIC_RULES_DOT)?;
        Ok(Self { env })
    }

    /// Render the whole artifact set.
    pub fn render_all(
        &self,
        config: &Config,
        compiled: &CompiledPolicy,
    ) -> Result<Vec<RenderedFile>, BridgeError> {
        let mut files = vec![
            self.render_main(config)?,
            self.render_subnets(config, compiled)?,
        ];
        files.extend(self.render_security_groups(compiled)?);
        files.extend(self.render_network_acls(config, compiled)?);
        files.push(self.render_internet_gateway(config, compiled)?);
        if compiled.nat_tier.is_some() {
            files.push(self.render_nat_gateways(config, compiled)?);
        }
        files.push(self.render_variables(compiled)?);
        files.push(self.render_outputs(config, compiled)?);
        files.push(self.render_traffic_rules_dot(config, compiled)?);
        Ok(files)
    }

    fn render(
        &self,
        template: &str,
        ctx: minijinja::Value,
        name: impl Into<String>,
    ) -> Result<RenderedFile, BridgeError> {
        let contents = self.env.get_template(template)?.render(ctx)?;
        Ok(RenderedFile {
            name: name.into(),
            contents,
        })
    }

    fn render_main(&self, config: &Config) -> Result<RenderedFile, BridgeError> {
        let region = config.region.as_deref().unwrap_or(DEFAULT_REGION);
        self.render("main.tf", context! { region }, "main.tf")
    }

    fn render_subnets(
        &self,
        config: &Config,
        compiled: &CompiledPolicy,
    ) -> Result<RenderedFile, BridgeError> {
        let subnets = context::subnets(compiled, &config.availability_zones);
        self.render("subnets.tf", context! { subnets }, "subnets.tf")
    }

    fn render_security_groups(
        &self,
        compiled: &CompiledPolicy,
    ) -> Result<Vec<RenderedFile>, BridgeError> {
        let mut files = Vec::new();
        for (tier, rules) in &compiled.grouped_rules {
            let name = format!("{tier}_tier");
            let rules = context::security_group_rules(tier, rules, compiled)?;
            files.push(self.render(
                "security_group.tf",
                context! { name, rules },
                format!("security_group_{name}.tf"),
            )?);
        }
        Ok(files)
    }

    fn render_network_acls(
        &self,
        config: &Config,
        compiled: &CompiledPolicy,
    ) -> Result<Vec<RenderedFile>, BridgeError> {
        let derived = compiled.derived_rules();
        let az_count = config.availability_zones.len();

        let mut files = Vec::new();
        for (tier, rules) in &compiled.grouped_rules {
            let name = format!("{tier}_tier");
            let subnet_ids = (0..az_count)
                .map(|az_index| format!("aws_subnet.{tier}_{az_index}.id"))
                .collect::<Vec<_>>()
                .join(", ");
            let entries = context::acl_entries(tier, rules, &derived[tier], compiled, az_count)?;
            files.push(self.render(
                "network_acl.tf",
                context! { name, subnet_ids, entries },
                format!("network_acl_{name}.tf"),
            )?);
        }
        Ok(files)
    }

    fn render_internet_gateway(
        &self,
        config: &Config,
        compiled: &CompiledPolicy,
    ) -> Result<RenderedFile, BridgeError> {
        let public_subnets: Vec<String> = context::subnets(compiled, &config.availability_zones)
            .into_iter()
            .filter(|s| s.public)
            .map(|s| s.name)
            .collect();
        self.render(
            "internet_gateway.tf",
            context! { public_subnets },
            "internet_gateway.tf",
        )
    }

    fn render_nat_gateways(
        &self,
        config: &Config,
        compiled: &CompiledPolicy,
    ) -> Result<RenderedFile, BridgeError> {
        let nat_tier = compiled
            .nat_tier
            .clone()
            .ok_or_else(|| BridgeError::Render("NAT gateways need a public tier".to_string()))?;

        let az_count = config.availability_zones.len();
        let private_associations: Vec<minijinja::Value> =
            context::subnets(compiled, &config.availability_zones)
                .into_iter()
                .filter(|s| !s.public)
                .map(|s| context! { subnet => s.name, az_index => s.az_index })
                .collect();

        self.render(
            "nat_gateways.tf",
            context! { az_count, nat_tier, private_associations },
            "nat_gateways.tf",
        )
    }

    fn render_variables(&self, compiled: &CompiledPolicy) -> Result<RenderedFile, BridgeError> {
        let variables = context::variables(compiled);
        self.render("variables.tf", context! { variables }, "variables.tf")
    }

    fn render_outputs(
        &self,
        config: &Config,
        compiled: &CompiledPolicy,
    ) -> Result<RenderedFile, BridgeError> {
        let subnets = context::subnets(compiled, &config.availability_zones);
        self.render("outputs.tf", context! { subnets }, "outputs.tf")
    }

    fn render_traffic_rules_dot(
        &self,
        config: &Config,
        compiled: &CompiledPolicy,
    ) -> Result<RenderedFile, BridgeError> {
        let (nodes, edges) = context::traffic_graph(config, compiled);
        self.render(
            "traffic_rules.dot",
            context! { nodes, edges },
            "traffic_rules.dot",
        )
    }
}

/// Write the artifacts into the output directory, clearing stale ones first.
pub fn write_files(output_dir: &Path, files: &[RenderedFile]) -> Result<(), BridgeError> {
    fs::create_dir_all(output_dir)?;

    for entry in fs::read_dir(output_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some() {
            fs::remove_file(&path)?;
        }
    }

    for file in files {
        fs::write(output_dir.join(&file.name), &file.contents)?;
    }
    Ok(())
}
