//! Drivers command - browse the driver catalog

use super::{CommandContext, Runnable};
use anyhow::Result;
use clap::Parser;
use rustible_machine::drivers::DriverSchema;
use rustible_machine::error::Error;

/// Arguments for the drivers command
#[derive(Parser, Debug, Clone)]
pub struct DriversArgs {
    /// Show the options of this driver
    pub name: Option<String>,
}

impl DriversArgs {
    /// Execute the drivers command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        match &self.name {
            Some(name) => match ctx.registry.get(name) {
                Some(schema) => {
                    show_driver(ctx, schema)?;
                    Ok(0)
                }
                None => Ok(ctx.fail(&Error::UnknownDriver(name.clone()))),
            },
            None => {
                list_drivers(ctx)?;
                Ok(0)
            }
        }
    }
}

fn list_drivers(ctx: &CommandContext) -> Result<()> {
    if ctx.output.is_json() {
        let schemas: Vec<&DriverSchema> = ctx.registry.iter().collect();
        ctx.output.json(&serde_json::to_value(schemas)?);
        return Ok(());
    }

    let rows: Vec<Vec<String>> = ctx
        .registry
        .iter()
        .map(|schema| {
            let required: Vec<&str> = schema
                .required_options()
                .map(|o| o.name.as_str())
                .collect();
            let capabilities = schema.capabilities();
            let updatable: Vec<&str> = capabilities.iter().collect();
            vec![
                schema.name.clone(),
                join_or_dash(&required),
                join_or_dash(&updatable),
            ]
        })
        .collect();
    ctx.output
        .table(&["DRIVER", "REQUIRED", "UPDATABLE"], &rows);
    Ok(())
}

fn show_driver(ctx: &CommandContext, schema: &DriverSchema) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&serde_json::to_value(schema)?);
        return Ok(());
    }

    ctx.output.section(&format!("{}: {}", schema.name, schema.description));
    let rows: Vec<Vec<String>> = schema
        .options
        .iter()
        .map(|o| {
            vec![
                o.name.clone(),
                o.kind.to_string(),
                yes_no(o.required),
                yes_no(o.updatable),
                o.description.clone(),
            ]
        })
        .collect();
    ctx.output.table(
        &["OPTION", "TYPE", "REQUIRED", "UPDATABLE", "DESCRIPTION"],
        &rows,
    );

    for group in &schema.exclusive {
        println!("\nAt most one of: {}", group.join(", "));
    }
    Ok(())
}

fn join_or_dash(items: &[&str]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn yes_no(flag: bool) -> String {
    let word = if flag { "yes" } else { "no" };
    word.to_string()
}

#[async_trait::async_trait]
impl Runnable for DriversArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        self.execute(ctx).await
    }
}
