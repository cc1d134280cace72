use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::pipeline::IngestionEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    Status,
    Validate(String),
    Backups,
    Help,
}

/// Parses `args[1..]`. Unknown commands are reported as errors rather than ignored.
pub fn parse_command(args: &[String]) -> Result<Command> {
    match args.get(1).map(String::as_str) {
        None | Some("serve") => Ok(Command::Serve),
        Some("status") => Ok(Command::Status),
        Some("backups") => Ok(Command::Backups),
        Some("validate") => {
            let file = args
                .get(2)
                .context("validate needs a file argument: validate <file.csv>")?;
            Ok(Command::Validate(file.clone()))
        }
        Some("help") | Some("--help") | Some("-h") => Ok(Command::Help),
        Some(other) => anyhow::bail!("unknown command '{}'; run with 'help' for usage", other),
    }
}

pub fn run_command(command: Command, cfg: &Config) -> Result<()> {
    let engine = IngestionEngine::new(cfg);
    match command {
        Command::Serve => Ok(()),
        Command::Help => {
            print_ingestion_usage();
            Ok(())
        }
        Command::Status => print_status(&engine),
        Command::Backups => print_backups(&engine),
        Command::Validate(file) => validate_file(&engine, Path::new(&file)),
    }
}

fn print_status(engine: &IngestionEngine) -> Result<()> {
    let status = engine.status();
    println!("Active dataset: {}", status.path.display());
    println!("Environment:    {:?}", status.environment);
    if status.exists {
        if let Some(rows) = status.rows {
            println!("Rows:           {}", rows);
        }
        if let Some(columns) = status.columns {
            println!("Columns:        {}", columns);
        }
        if let Some(kb) = status.size_kb() {
            println!("Size:           {:.1} KB", kb);
        }
        if let Some(modified) = status.modified_at {
            println!("Last modified:  {}", modified.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        if !status.column_names.is_empty() {
            println!("Column names:   {}", status.column_names.join(", "));
        }
    }
    if let Some(err) = &status.read_error {
        println!("Read error:     {}", err);
    }
    println!("Backups:        {} in {}", status.backup_count, status.backup_dir.display());
    Ok(())
}

fn print_backups(engine: &IngestionEngine) -> Result<()> {
    let records = engine.backups().list_recent(None)?;
    if records.is_empty() {
        println!("No backups in {}", engine.backups().dir().display());
        return Ok(());
    }
    for record in &records {
        println!(
            "{}  {:>10} bytes  {}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.size_bytes,
            record.name
        );
    }
    Ok(())
}

/// Decodes and validates a local file without replacing the active dataset.
fn validate_file(engine: &IngestionEngine, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let outcome = engine.check(&filename, &bytes);
    if let Some(encoding) = outcome.encoding {
        println!("Encoding: {}", encoding);
    }
    if let (Some(rows), Some(columns)) = (outcome.rows, outcome.columns) {
        println!("Shape:    {} rows x {} columns", rows, columns);
    }
    println!("Result:   {}", outcome.message);
    for line in &outcome.diagnostics {
        println!("  - {}", line);
    }
    if !outcome.success {
        anyhow::bail!("{} failed validation", path.display());
    }
    Ok(())
}

pub fn print_ingestion_usage() {
    println!("Dataset ingestion service");
    println!();
    println!("USAGE:");
    println!("    dataset-ingestion [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("    serve              Start the HTTP/GraphQL server (default)");
    println!("    status             Show the active dataset and backup store");
    println!("    validate <file>    Check a CSV file against the configured schema");
    println!("    backups            List backups, newest first");
    println!("    help               Print this message");
}
