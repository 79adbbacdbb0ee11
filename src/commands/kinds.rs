//! `aapsync kinds`

use anyhow::Result;
use colored::Colorize;
use syncgraph::{PROVISION_ORDER, ResourceKind};

use crate::ui;

/// One line per kind: position, name, dependencies.
pub fn lines() -> Vec<String> {
    PROVISION_ORDER
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            let deps: Vec<String> = kind.dependencies().iter().map(ResourceKind::to_string).collect();
            let deps = if deps.is_empty() {
                "-".to_string()
            } else {
                deps.join(", ")
            };
            format!("{:>2}. {:<24} {}", i + 1, kind.to_string(), deps)
        })
        .collect()
}

pub fn run() -> Result<()> {
    ui::header("Provisioning order");
    for line in lines() {
        println!("  {line}");
    }
    println!();
    println!("  {}", "Cleanup runs the same list bottom-up.".dimmed());
    Ok(())
}
