//! Human-readable output for plans and budgets

use colored::Colorize;
use serde::Serialize;

use cmdsplit_engine::{CommandForm, Invocation};

/// Longest command preview printed per invocation
const PREVIEW_CHARS: usize = 160;

/// Outcome for one artifact set
#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct PlanEntry {
    pub(crate) artifact_set: String,
    pub(crate) invocations: Vec<Invocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

/// Host budget breakdown
#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct BudgetReport {
    pub(crate) arg_max: usize,
    pub(crate) environment_bytes: usize,
    pub(crate) environment_variables: usize,
    pub(crate) safety_margin: usize,
    pub(crate) max_command_size: usize,
}

pub(crate) fn print_plan(entries: &[PlanEntry], max_size: usize) {
    println!();
    println!("{}", "Invocation Plan".cyan().bold());
    println!("{}", "━".repeat(50).dimmed());
    println!("  Budget: {} bytes", max_size.to_string().yellow());

    for entry in entries {
        println!();
        if let Some(error) = &entry.error {
            println!(
                "  {} {}: {}",
                "✗".red(),
                entry.artifact_set.bold(),
                error.red()
            );
            continue;
        }
        if entry.invocations.is_empty() {
            println!(
                "  {} {}: no target files, skipped",
                "-".dimmed(),
                entry.artifact_set.bold()
            );
            continue;
        }

        println!(
            "  {} {}: {} invocation(s)",
            "✓".green(),
            entry.artifact_set.bold(),
            entry.invocations.len()
        );
        for invocation in &entry.invocations {
            print_invocation(invocation);
        }
    }
    println!();
}

fn print_invocation(invocation: &Invocation) {
    let files = invocation
        .category
        .as_deref()
        .and_then(|c| invocation.artifacts.files(c))
        .map(<[String]>::len);
    let scope = match (&invocation.category, files) {
        (Some(category), Some(count)) => format!("{} ({} files)", category, count),
        _ => "all categories".to_owned(),
    };
    let form = match invocation.command.form() {
        CommandForm::Exec => "exec",
        CommandForm::Shell => "shell",
    };

    println!(
        "    [{}] {} - {} bytes, {}",
        invocation.id.cyan(),
        scope,
        invocation.command.rendered_len(),
        form
    );
    println!("      report: {}", invocation.report_path.display());
    println!("      $ {}", preview(&invocation.command.rendered()).dimmed());
}

fn preview(command: &str) -> String {
    let flat = command.replace('\n', "\\n");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let head: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    }
}

pub(crate) fn print_budget(report: &BudgetReport) {
    println!();
    println!("{}", "Command Size Budget".cyan().bold());
    println!("{}", "━".repeat(50).dimmed());
    let rows = [
        ("ARG_MAX", report.arg_max),
        ("Environment bytes", report.environment_bytes),
        ("Environment variables", report.environment_variables),
        ("Safety margin", report.safety_margin),
    ];
    for (label, value) in rows {
        println!("  {:<24}{}", format!("{}:", label), value);
    }
    println!(
        "  {:<24}{}",
        "Max command size:",
        report.max_command_size.to_string().green().bold()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_and_flattens() {
        assert_eq!(preview("a\nb"), "a\\nb");
        let long = "x".repeat(PREVIEW_CHARS + 10);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
    }
}
