//! Plan command - check mode for a manifest
//!
//! Derives the actions `apply` would issue and prints them together with the
//! configuration differences, without touching any machine.

use super::{CommandContext, Runnable};
use crate::cli::commands::apply::ApplyArgs;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Arguments for the plan command
#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    /// Machine manifest (YAML or JSON)
    #[arg(required = true)]
    pub manifest: PathBuf,

    /// Only plan these machines (comma separated names)
    #[arg(short = 'l', long)]
    pub limit: Option<String>,
}

impl PlanArgs {
    /// Execute the plan command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let apply = ApplyArgs {
            manifest: self.manifest.clone(),
            limit: self.limit.clone(),
            check: true,
            diff: true,
        };
        apply.execute(ctx).await
    }
}

#[async_trait::async_trait]
impl Runnable for PlanArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        self.execute(ctx).await
    }
}
