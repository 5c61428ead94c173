use anyhow::{Context, Result};
use clap::Parser;
use class_search::class_record::ClassRecord;
use class_search::cli::{Cli, Commands, OutputFormat, normalize_class_name};
use class_search::config::{SearchConfig, resolve_config};
use class_search::engine::{CancelToken, SearchEngine, SearchOutcome};
use class_search::workspace::{LoadReport, Workspace};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = resolve_config(&cli)?;

    let (workspace, report) = load_workspace(&cli, &config)?;

    match cli.command.clone() {
        Commands::Stats => {
            let stats = WorkspaceStats {
                classes: workspace.class_count(),
                files: workspace.file_count(),
                load: report,
            };
            write_stats_output(&stats, cli.format)?;
        }
        Commands::Outline { class_name } => {
            let name = normalize_class_name(&class_name);
            let class = workspace
                .class(&name)
                .with_context(|| format!("Class not found in inputs: {name}"))?;
            write_outline_output(class, cli.format)?;
        }
        command => {
            let search = command
                .search(config.match_options())?
                .context("Command does not describe a search")?;
            let engine = SearchEngine::new(config.threads)?;
            let start = Instant::now();
            let outcome =
                engine.run_blocking(Arc::new(search), workspace.snapshot(), CancelToken::new())?;
            log::debug!(
                "searched {} units on {} threads in {}ms",
                workspace.class_count() + workspace.file_count(),
                engine.threads(),
                start.elapsed().as_millis()
            );
            write_search_output(&outcome, cli.format)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_workspace(cli: &Cli, config: &SearchConfig) -> Result<(Workspace, LoadReport)> {
    if cli.inputs.is_empty() {
        anyhow::bail!("No inputs given; pass one or more -i <PATH>");
    }

    let start = Instant::now();
    let mut workspace = Workspace::new(config.parse_options());
    let mut report = LoadReport::default();
    for input in &cli.inputs {
        let loaded = workspace
            .load_path(input)
            .with_context(|| format!("Failed to load {}", input.display()))?;
        report.merge(loaded);
    }
    log::info!(
        "loaded {} classes and {} files ({} failures) in {}ms",
        report.classes,
        report.files,
        report.failures.len(),
        start.elapsed().as_millis()
    );
    Ok((workspace, report))
}

#[derive(Debug, Serialize)]
struct WorkspaceStats {
    classes: usize,
    files: usize,
    load: LoadReport,
}

fn write_stats_output(stats: &WorkspaceStats, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(stats)?),
        OutputFormat::Text => {
            println!("classes: {}", stats.classes);
            println!("files: {}", stats.files);
            println!("anomalies: {}", stats.load.anomalies);
            println!("failures: {}", stats.load.failures.len());
            for f in &stats.load.failures {
                println!("- {}: {}", f.path, f.error);
            }
        }
    }
    Ok(())
}

fn write_outline_output(class: &ClassRecord, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&class.outline())?),
        OutputFormat::Text => {
            let mut out = String::new();
            for outer in class.enclosing_chain() {
                out.push_str(&format!("{outer} > "));
            }
            out.push_str(&format!("{}\n", class.name()));
            if let Some(s) = class.super_name() {
                out.push_str(&format!("  extends {s}\n"));
            }
            for i in class.interfaces() {
                out.push_str(&format!("  implements {i}\n"));
            }
            for inner in class.inner_classes() {
                out.push_str(&format!("  inner {} ({})\n", inner.name, inner.simple_name()));
            }
            for f in class.fields() {
                match &f.value {
                    Some(v) => out.push_str(&format!("  field {} {} = {v}\n", f.name, f.descriptor)),
                    None => out.push_str(&format!("  field {} {}\n", f.name, f.descriptor)),
                }
            }
            for m in class.methods() {
                out.push_str(&format!("  method {}{}", m.name, m.descriptor));
                if !m.exceptions.is_empty() {
                    out.push_str(&format!(" throws {}", m.exceptions.join(", ")));
                }
                out.push('\n');
            }
            print!("{out}");
        }
    }
    Ok(())
}

fn write_search_output(outcome: &SearchOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Text => {
            for r in &outcome.results {
                println!("{r}");
            }
            for d in &outcome.diagnostics {
                eprintln!("[class-search] {d}");
            }
        }
    }
    Ok(())
}
