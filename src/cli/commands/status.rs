//! Status command - describe machines through the back-end

use super::{CommandContext, Runnable};
use anyhow::Result;
use clap::Parser;
use rustible_machine::backend::{BackendError, Operation};
use rustible_machine::error::Error;
use serde_json::json;

/// Arguments for the status command
#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    /// Machine names
    #[arg(required = true)]
    pub names: Vec<String>,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let backend = ctx.backend();
        let mut rows = Vec::with_capacity(self.names.len());
        let mut documents = Vec::with_capacity(self.names.len());

        for name in &self.names {
            let host = match tokio::time::timeout(ctx.timeout, backend.describe(name)).await {
                Ok(Ok(host)) => host,
                Ok(Err(e)) => return Ok(ctx.fail(&Error::from(e))),
                Err(_) => {
                    let e = BackendError::Timeout {
                        operation: Operation::Describe,
                        timeout: ctx.timeout,
                    };
                    return Ok(ctx.fail(&Error::from(e)));
                }
            };

            match &host {
                Some(h) => rows.push(vec![
                    name.clone(),
                    h.driver_name.clone(),
                    h.status().to_string(),
                    h.config_version.to_string(),
                ]),
                None => rows.push(vec![
                    name.clone(),
                    "-".to_string(),
                    "absent".to_string(),
                    "-".to_string(),
                ]),
            }
            documents.push(json!({ "name": name, "machine": host }));
        }

        if ctx.output.is_json() {
            ctx.output.json(&json!({ "machines": documents }));
        } else {
            ctx.output
                .table(&["NAME", "DRIVER", "STATE", "VERSION"], &rows);
        }

        Ok(0)
    }
}

#[async_trait::async_trait]
impl Runnable for StatusArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        self.execute(ctx).await
    }
}
