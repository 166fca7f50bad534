//! cmdsplit CLI - plan tool invocations that fit the command line
//!
//! Renders invocation templates, lists their target categories, and plans
//! split invocations for a configured tool over artifact descriptions.

// CLI tools legitimately use print macros for user output
#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

mod display;

use display::{BudgetReport, PlanEntry};

use cmdsplit_engine::{
    ArtifactSet, CategoryVocabulary, CommandBudget, Composer, EngineSettings, SymbolTable,
    Template, ToolConfig,
};

/// cmdsplit - templated tool invocations that fit the command line
#[derive(Parser)]
#[command(
    name = "cmdsplit",
    version,
    about = "Plan size-constrained invocations of command-line analysis tools",
    long_about = "cmdsplit evaluates tool invocation templates against categorized source\nfiles and splits file lists so every command fits the host's ARG_MAX."
)]
struct Cli {
    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a template against a symbol table
    Render {
        #[command(flatten)]
        template: TemplateSource,

        /// JSON object of symbols (strings or string arrays)
        #[arg(short, long)]
        symbols: Option<PathBuf>,

        /// Print one argument per line
        #[arg(long, conflicts_with = "json")]
        argv: bool,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// List the file categories a template references
    Targets {
        #[command(flatten)]
        template: TemplateSource,

        /// Additional names to treat as categories
        #[arg(short, long = "category")]
        categories: Vec<String>,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Plan the invocations of a configured tool
    Plan {
        /// Tool directory containing tool.conf
        #[arg(short, long)]
        tool_dir: PathBuf,

        /// Artifact description JSON (one object or an array)
        #[arg(short, long)]
        artifacts: PathBuf,

        /// Directory reports and captured output go to
        #[arg(short, long, env = "CMDSPLIT_RESULTS_DIR")]
        results_dir: Option<PathBuf>,

        /// Command size budget in bytes (default: derived from the host)
        #[arg(short, long)]
        max_size: Option<usize>,

        /// Package directory used to resolve tool-config-file
        #[arg(short, long)]
        package_dir: Option<PathBuf>,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the host command size budget
    Budget {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

/// Template text or a file holding it
#[derive(clap::Args)]
struct TemplateSource {
    /// Template text
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    text: Option<String>,

    /// Read the template from a file
    #[arg(short, long)]
    file: Option<PathBuf>,
}

impl TemplateSource {
    fn load(&self) -> Result<Template> {
        match (&self.text, &self.file) {
            (Some(text), _) => Template::parse(text).context("Invalid template"),
            (None, Some(path)) => Ok(Template::load(path)?),
            (None, None) => bail!("No template given"),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Render {
            template,
            symbols,
            argv,
            json,
        } => cmd_render(&template, symbols.as_deref(), argv, json),
        Commands::Targets {
            template,
            categories,
            json,
        } => cmd_targets(&template, categories, json),
        Commands::Plan {
            tool_dir,
            artifacts,
            results_dir,
            max_size,
            package_dir,
            json,
        } => cmd_plan(PlanArgs {
            tool_dir,
            artifacts,
            results_dir,
            max_size,
            package_dir,
            json,
        }),
        Commands::Budget { json } => cmd_budget(json),
    }
}

fn read_symbols(path: &Path) -> Result<SymbolTable> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read symbols: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid symbol table: {}", path.display()))
}

fn cmd_render(
    source: &TemplateSource,
    symbols: Option<&Path>,
    argv: bool,
    json: bool,
) -> Result<()> {
    let template = source.load()?;
    let symbols = symbols.map(read_symbols).transpose()?.unwrap_or_default();
    let command = template.evaluate(&symbols);

    if json {
        println!("{}", serde_json::to_string_pretty(&command)?);
    } else if argv {
        for arg in command.argv() {
            println!("{}", arg);
        }
    } else {
        println!("{}", command);
    }
    Ok(())
}

fn cmd_targets(source: &TemplateSource, categories: Vec<String>, json: bool) -> Result<()> {
    let template = source.load()?;
    let vocabulary = categories
        .into_iter()
        .fold(CategoryVocabulary::new(), |vocabulary, name| {
            vocabulary.with_category(name)
        });
    let targets = cmdsplit_engine::target_variables(&template, &vocabulary);

    if json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    if targets.is_empty() {
        println!("{}", "No file categories referenced".yellow());
    }
    for target in &targets {
        if target.listed {
            println!("{}  separator {:?}", target.name.cyan(), target.separator);
        } else {
            println!("{}  {}", target.name.cyan(), "conditionals only".dimmed());
        }
    }
    println!("{} {:?}", "Form:".dimmed(), template.form());
    Ok(())
}

struct PlanArgs {
    tool_dir: PathBuf,
    artifacts: PathBuf,
    results_dir: Option<PathBuf>,
    max_size: Option<usize>,
    package_dir: Option<PathBuf>,
    json: bool,
}

fn cmd_plan(args: PlanArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let settings = EngineSettings::load(&cwd)?;

    let mut config = ToolConfig::load(&args.tool_dir)
        .with_context(|| format!("Failed to load tool from {}", args.tool_dir.display()))?;
    if let Some(package_dir) = &args.package_dir {
        config.resolve_tool_config_file(package_dir)?;
    }
    let template = config.invoke_template()?;

    let text = std::fs::read_to_string(&args.artifacts)
        .with_context(|| format!("Failed to read artifacts: {}", args.artifacts.display()))?;
    let sets = ArtifactSet::from_json(&text)
        .with_context(|| format!("Invalid artifacts: {}", args.artifacts.display()))?;

    let max_size = args
        .max_size
        .unwrap_or_else(|| settings.budget().for_current_process());
    let results_dir = args.results_dir.unwrap_or(settings.results_dir);
    log::info!(
        "Planning {} artifact sets with budget {} bytes",
        sets.len(),
        max_size
    );

    let composer = Composer::from_config(&config, template, max_size, results_dir);

    let entries: Vec<PlanEntry> = sets
        .iter()
        .map(|set| match composer.compose(set) {
            Ok(invocations) => PlanEntry {
                artifact_set: set.id.clone(),
                invocations,
                error: None,
            },
            Err(e) => PlanEntry {
                artifact_set: set.id.clone(),
                invocations: Vec::new(),
                error: Some(e.to_string()),
            },
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        display::print_plan(&entries, max_size);
    }

    let failed = entries.iter().filter(|e| e.error.is_some()).count();
    if failed > 0 {
        bail!("{} of {} artifact sets could not be planned", failed, entries.len());
    }
    Ok(())
}

fn cmd_budget(json: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let budget: CommandBudget = EngineSettings::load(&cwd)?.budget();
    let (environment_bytes, environment_variables) =
        CommandBudget::environment_size(std::env::vars_os());
    let report = BudgetReport {
        arg_max: budget.arg_max,
        environment_bytes,
        environment_variables,
        safety_margin: budget.safety_margin,
        max_command_size: budget.for_current_process(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display::print_budget(&report);
    }
    Ok(())
}
