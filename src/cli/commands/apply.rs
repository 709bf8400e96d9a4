//! Apply command - reconcile every machine in a manifest
//!
//! Machines are reconciled concurrently, at most `forks` at a time, and
//! reported in manifest order.

use super::{parse_limit, CommandContext, Runnable};
use crate::cli::output::{MachineStatus, RecapStats};
use anyhow::Result;
use clap::Parser;
use futures::stream::{self, StreamExt};
use rustible_machine::machine::HostSpec;
use rustible_machine::manifest::Manifest;
use rustible_machine::reconcile::{ReconcileError, ReconcileResult};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments for the apply command
#[derive(Parser, Debug, Clone)]
pub struct ApplyArgs {
    /// Machine manifest (YAML or JSON)
    #[arg(required = true)]
    pub manifest: PathBuf,

    /// Only reconcile these machines (comma separated names)
    #[arg(short = 'l', long)]
    pub limit: Option<String>,

    /// Compute the actions without executing them
    #[arg(long)]
    pub check: bool,

    /// Show configuration differences
    #[arg(long, short = 'D')]
    pub diff: bool,
}

type Outcome = (HostSpec, std::result::Result<ReconcileResult, ReconcileError>);

impl ApplyArgs {
    /// Execute the apply command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        ctx.output
            .banner(if self.check { "MACHINE PLAN" } else { "MACHINE APPLY" });
        ctx.output
            .info(&format!("Manifest: {}", self.manifest.display()));

        let manifest = match Manifest::from_file(&self.manifest)
            .and_then(|m| m.prepare(&ctx.registry))
        {
            Ok(manifest) => manifest,
            Err(e) => return Ok(ctx.fail(&e)),
        };

        let specs = match parse_limit(self.limit.as_deref()) {
            Some(names) => {
                for name in &names {
                    if !manifest.names().contains(&name.as_str()) {
                        ctx.output
                            .warning(&format!("Machine '{}' is not in the manifest", name));
                    }
                }
                manifest
                    .machines
                    .into_iter()
                    .filter(|m| names.contains(&m.name))
                    .collect()
            }
            None => manifest.machines,
        };

        if specs.is_empty() {
            ctx.output.warning("No machines to reconcile");
            return Ok(0);
        }

        let backend = ctx.backend();
        let reconciler = ctx.reconciler(self.check);
        ctx.output.debug(&format!(
            "backend={} forks={} timeout={:?}",
            backend.name(),
            ctx.forks,
            ctx.timeout
        ));

        let outcomes: Vec<Outcome> = stream::iter(specs)
            .map(|spec| {
                let backend = Arc::clone(&backend);
                let reconciler = reconciler.clone();
                async move {
                    let outcome = reconciler.reconcile(&spec, backend.as_ref()).await;
                    (spec, outcome)
                }
            })
            .buffered(ctx.forks)
            .collect()
            .await;

        Ok(self.report(ctx, &outcomes))
    }

    /// Print results and return the exit code of the first failure.
    fn report(&self, ctx: &CommandContext, outcomes: &[Outcome]) -> i32 {
        let mut stats = RecapStats::new();
        let mut documents = Vec::with_capacity(outcomes.len());
        let mut exit_code = 0;

        for (spec, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    let status = match (result.changed, result.check_mode) {
                        (false, _) => MachineStatus::Ok,
                        (true, true) => MachineStatus::Planned,
                        (true, false) => MachineStatus::Changed,
                    };
                    let message = result.changed.then(|| result.actions.to_string());
                    ctx.output
                        .machine_result(&spec.name, status, message.as_deref());
                    if self.diff || self.check {
                        if let Some(diff) = &result.diff {
                            ctx.output.diff(&diff.render());
                        }
                    }
                    stats.record(&spec.name, status);

                    let mut document = result.to_facts();
                    document["name"] = json!(spec.name);
                    documents.push(document);
                }
                Err(err) => {
                    ctx.output.machine_result(
                        &spec.name,
                        MachineStatus::Failed,
                        Some(&err.error.to_string()),
                    );
                    if !err.completed.is_empty() {
                        ctx.output.warning(&format!(
                            "{}: completed before the failure: {}",
                            spec.name, err.completed
                        ));
                    }
                    stats.record(&spec.name, MachineStatus::Failed);
                    if exit_code == 0 {
                        exit_code = err.exit_code();
                    }

                    documents.push(json!({
                        "name": spec.name,
                        "failed": true,
                        "msg": err.error.to_string(),
                        "completed": err.completed,
                        "failed_action": err.failed_action,
                    }));
                }
            }
        }

        ctx.output.recap(&stats);
        if ctx.output.is_json() {
            ctx.output.json(&json!({
                "changed": stats.changed() > 0,
                "check_mode": self.check,
                "machines": documents,
            }));
        }
        ctx.output.flush();

        exit_code
    }
}

#[async_trait::async_trait]
impl Runnable for ApplyArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        self.execute(ctx).await
    }
}
