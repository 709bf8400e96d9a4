//! Validate command - check a manifest without contacting a back-end

use super::{CommandContext, Runnable};
use anyhow::Result;
use clap::Parser;
use rustible_machine::manifest::Manifest;
use serde_json::json;
use std::path::PathBuf;

/// Arguments for the validate command
#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    /// Machine manifest (YAML or JSON)
    #[arg(required = true)]
    pub manifest: PathBuf,
}

impl ValidateArgs {
    /// Execute the validate command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        ctx.output.banner("MANIFEST VALIDATION");
        ctx.output
            .info(&format!("Validating: {}", self.manifest.display()));

        let manifest = match Manifest::from_file(&self.manifest)
            .and_then(|m| m.prepare(&ctx.registry))
        {
            Ok(manifest) => manifest,
            Err(e) => return Ok(ctx.fail(&e)),
        };

        if ctx.output.is_json() {
            ctx.output.json(&json!({
                "valid": true,
                "machines": manifest.machines,
            }));
            return Ok(0);
        }

        ctx.output.section("Machines");
        let rows: Vec<Vec<String>> = manifest
            .machines
            .iter()
            .map(|m| {
                vec![
                    m.name.clone(),
                    m.driver.clone(),
                    m.requested_state.to_string(),
                    m.driver_options.len().to_string(),
                ]
            })
            .collect();
        ctx.output
            .table(&["NAME", "DRIVER", "STATE", "OPTIONS"], &rows);

        if manifest.is_empty() {
            ctx.output.warning("Manifest defines no machines");
        } else {
            println!("\nManifest is valid: {} machine(s)", manifest.len());
        }
        Ok(0)
    }
}

#[async_trait::async_trait]
impl Runnable for ValidateArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        self.execute(ctx).await
    }
}
