// ABOUTME: Console rendering of command results as JSON, colored key/value text or tables
// ABOUTME: Everything here writes to stdout; diagnostics go through tracing on stderr
use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use iamviz_core::Inventory;
use iamviz_graph::RunSummary;
use tabled::{settings::Style, Table, Tabled};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConsoleFormat {
    Json,
    Pretty,
    Table,
}

/// One row per discovered service.
#[derive(Debug, Tabled)]
pub struct ServiceRow {
    #[tabled(rename = "REGION")]
    pub region: String,
    #[tabled(rename = "SERVICE")]
    pub service: String,
    #[tabled(rename = "IDENTITY")]
    pub identity: String,
    #[tabled(rename = "INVOKERS")]
    pub invokers: String,
}

#[derive(Debug, Tabled)]
struct FieldRow {
    #[tabled(rename = "FIELD")]
    field: String,
    #[tabled(rename = "VALUE")]
    value: String,
}

pub fn service_rows(inventory: &Inventory) -> Vec<ServiceRow> {
    let mut rows: Vec<ServiceRow> = inventory
        .services
        .iter()
        .map(|perms| ServiceRow {
            region: perms.service.region.id.clone(),
            service: perms.service.name.clone(),
            identity: perms.service.identity.clone(),
            invokers: perms.invokers.join(", "),
        })
        .collect();
    rows.sort_by(|a, b| (&a.region, &a.service).cmp(&(&b.region, &b.service)));
    rows
}

pub fn print_inventory(format: ConsoleFormat, inventory: &Inventory) -> Result<()> {
    match format {
        ConsoleFormat::Json => println!("{}", serde_json::to_string_pretty(inventory)?),
        ConsoleFormat::Table => {
            println!("{}", Table::new(service_rows(inventory)).with(Style::modern()));
        }
        ConsoleFormat::Pretty => {
            println!("{}: {}", "project".cyan().bold(), inventory.project.green());
            for row in service_rows(inventory) {
                println!(
                    "\n{} {}",
                    row.service.bold(),
                    format!("({})", row.region).dimmed()
                );
                println!("  {}: {}", "identity".cyan(), row.identity.green());
                if row.invokers.is_empty() {
                    println!("  {}: {}", "invokers".cyan(), "none".yellow());
                } else {
                    println!("  {}: {}", "invokers".cyan(), row.invokers);
                }
            }
        }
    }
    Ok(())
}

pub fn print_summary(format: ConsoleFormat, summary: &RunSummary) -> Result<()> {
    print_output(format, &serde_json::to_value(summary)?)
}

pub fn print_output(format: ConsoleFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        ConsoleFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        ConsoleFormat::Pretty => {
            print_pretty(value)?;
        }
        ConsoleFormat::Table => {
            print_table(value)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => {
                        println!("{}: {}", key_colored, s.green());
                    }
                    serde_json::Value::Number(n) => {
                        println!("{}: {}", key_colored, n.to_string().yellow());
                    }
                    serde_json::Value::Null => {
                        println!("{}: {}", key_colored, "-".dimmed());
                    }
                    serde_json::Value::Array(items) if items.is_empty() => {
                        println!("{}: {}", key_colored, "none".dimmed());
                    }
                    serde_json::Value::Array(items) => {
                        println!("{}:", key_colored);
                        for item in items {
                            println!("  - {}", compact(item));
                        }
                    }
                    _ => {
                        println!("{}: {}", key_colored, val);
                    }
                }
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}

fn print_table(value: &serde_json::Value) -> Result<()> {
    let rows: Vec<FieldRow> = match value {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(key, val)| FieldRow {
                field: key.clone(),
                value: compact(val),
            })
            .collect(),
        _ => return print_pretty(value),
    };
    println!("{}", Table::new(rows).with(Style::modern()));
    Ok(())
}

/// Single-line rendering of a JSON value for list items and table cells.
fn compact(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        serde_json::Value::Array(items) => items.iter().map(compact).collect::<Vec<_>>().join(", "),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, compact(v)))
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}
