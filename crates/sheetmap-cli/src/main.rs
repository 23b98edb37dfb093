use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::json;
use sheetmap_core::{
    extract_placeholders, validate_syntax, MappingConfig, MappingError, MappingManager,
    PlaceholderResolver, ResolutionContext, ResolveError,
};
use sheetmap_model::{DisambiguationResponse, InMemoryWorkbook, MappingId, MappingKind, SheetAccessor};
use sheetmap_storage::MappingStorage;

/// Exit status when a header is ambiguous and no `--pick` settled it.
const EXIT_DISAMBIGUATION: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "sheetmap",
    about = "Resolve header placeholders in spreadsheet formulas and maintain stored mappings"
)]
struct Cli {
    /// SQLite database holding column and cell mappings.
    #[arg(long, env = "SHEETMAP_DATABASE_PATH", default_value = "data/sheetmap.db", global = true)]
    db: PathBuf,

    /// JSON file overriding the mapping tunables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON workbook snapshot to read headers and labels from.
    #[arg(long, global = true)]
    workbook: Option<PathBuf>,

    /// Raise log verbosity (`-v` info, `-vv` debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the placeholders of a formula and run the strict syntax check.
    Parse(ParseArgs),
    /// Resolve a formula against the workbook.
    Resolve(ResolveArgs),
    /// Score placeholders against live headers without storing anything.
    Preview(PreviewArgs),
    /// Re-validate every stored mapping of the workbook.
    Audit,
    /// Print stored mappings.
    List(SheetFilter),
    /// Delete one stored mapping.
    Delete(DeleteArgs),
    /// Delete stored mappings of the workbook, optionally for one sheet.
    Clear(SheetFilter),
}

#[derive(Debug, Args)]
struct ParseArgs {
    #[arg(long)]
    formula: String,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    #[arg(long)]
    formula: String,
    #[arg(long)]
    sheet: String,
    /// 1-based row that header placeholders point at.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    row: u32,
    /// Emit `$COL$ROW` for header placeholders.
    #[arg(long)]
    absolute: bool,
    /// Answer a disambiguation up front: `HEADER=INDEX` into the candidate list.
    #[arg(long = "pick", value_name = "HEADER=INDEX", value_parser = parse_pick)]
    picks: Vec<(String, usize)>,
}

#[derive(Debug, Args)]
struct PreviewArgs {
    #[arg(long)]
    formula: String,
    #[arg(long)]
    sheet: String,
}

#[derive(Debug, Args)]
struct SheetFilter {
    #[arg(long)]
    sheet: Option<String>,
}

#[derive(Debug, Args)]
struct DeleteArgs {
    #[arg(long)]
    id: MappingId,
    /// `column` or `cell`.
    #[arg(long)]
    kind: MappingKind,
}

fn parse_pick(raw: &str) -> Result<(String, usize), String> {
    let (header, index) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected HEADER=INDEX, got `{raw}`"))?;
    let index = index
        .trim()
        .parse()
        .map_err(|_| format!("`{index}` is not a candidate index"))?;
    Ok((header.trim().to_string(), index))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default));
    builder.target(env_logger::Target::Stderr).init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // Parsing needs neither the workbook nor the database.
    if let Command::Parse(args) = &cli.command {
        return parse(args);
    }

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => MappingConfig::default(),
    };
    let workbook_path = cli
        .workbook
        .as_deref()
        .ok_or_else(|| anyhow!("--workbook is required for this command"))?;
    let workbook = Arc::new(load_workbook(workbook_path)?);
    let spreadsheet_id = workbook.id().to_string();
    let storage = MappingStorage::open_path(&cli.db)
        .with_context(|| format!("failed to open mapping database {}", cli.db.display()))?;
    log::info!("using {} for spreadsheet {spreadsheet_id}", cli.db.display());

    let manager = MappingManager::new(workbook, storage, config);
    match cli.command {
        Command::Parse(args) => parse(&args),
        Command::Audit => {
            print_json(&manager.audit_mappings(&spreadsheet_id).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Resolve(args) => resolve(PlaceholderResolver::new(manager), &spreadsheet_id, args).await,
        Command::Preview(args) => {
            let preview = PlaceholderResolver::new(manager)
                .preview_mappings(&args.formula, &spreadsheet_id, &args.sheet)
                .await;
            print_json(&preview)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::List(filter) => {
            let sheet = filter.sheet.as_deref();
            print_json(&json!({
                "columns": manager.list_column_mappings(&spreadsheet_id, sheet)?,
                "cells": manager.list_cell_mappings(&spreadsheet_id, sheet)?,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Delete(args) => {
            if !manager.delete_mapping(args.id, args.kind)? {
                bail!("no {} mapping with id {}", args.kind, args.id);
            }
            print_json(&json!({ "deleted": args.id, "kind": args.kind }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Clear(filter) => {
            let removed = manager.clear_mappings(&spreadsheet_id, filter.sheet.as_deref())?;
            print_json(&json!({ "removed": removed }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn parse(args: &ParseArgs) -> Result<ExitCode> {
    print_json(&json!({
        "placeholders": extract_placeholders(&args.formula),
        "syntax": validate_syntax(&args.formula),
    }))?;
    Ok(ExitCode::SUCCESS)
}

/// Resolve, answering disambiguation requests from `--pick` until none is left or one
/// has no matching pick. Each pick is spent at most once.
async fn resolve<A: SheetAccessor>(
    resolver: PlaceholderResolver<A>,
    spreadsheet_id: &str,
    args: ResolveArgs,
) -> Result<ExitCode> {
    let mut context = ResolutionContext::new(args.sheet, args.row);
    if args.absolute {
        context = context.absolute();
    }
    let mut picks: HashMap<String, usize> = args.picks.into_iter().collect();

    loop {
        let err = match resolver.resolve_all(&args.formula, spreadsheet_id, &context).await {
            Ok(resolved) => {
                for warning in &resolved.warnings {
                    log::warn!("{warning}");
                }
                print_json(&resolved)?;
                return Ok(ExitCode::SUCCESS);
            }
            Err(err) => err,
        };

        let request = match err {
            ResolveError::Mapping(MappingError::DisambiguationRequired(request)) => request,
            other => return Err(other.into()),
        };
        let Some(index) = picks.remove(&request.header_text) else {
            print_json(&json!({ "disambiguation_required": request }))?;
            return Ok(ExitCode::from(EXIT_DISAMBIGUATION));
        };

        let mapping = resolver
            .manager()
            .store_disambiguation(&DisambiguationResponse {
                request_id: request.request_id,
                selected_column_index: index,
                user_label: None,
            })
            .await?;
        log::info!(
            "pinned '{}' to column {} in sheet '{}'",
            mapping.header_text,
            mapping.column_letter,
            mapping.sheet_name
        );
    }
}

fn load_config(path: &Path) -> Result<MappingConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    MappingConfig::from_json_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn load_workbook(path: &Path) -> Result<InMemoryWorkbook> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    InMemoryWorkbook::from_json_str(&text).with_context(|| format!("invalid workbook {}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
