use anyhow::Result;
use clap::{Parser, Subcommand};
use fragpatch::backup::render_diff;
use fragpatch::config::EngineConfig;
use fragpatch::engine::{MutationEngine, MutationRequest, UpdateOptions};
use fragpatch::error::EngineError;
use fragpatch::logging::{default_log_path, init_logging};
use fragpatch::strategy::UpdateMode;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "fragpatch")]
#[command(about = "Edit fragments of structured documents safely, with history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Write logs to a file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Append logs to the default audit log under the user config directory
    #[arg(long, global = true, conflicts_with = "log_file")]
    log: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace text located by a content hint
    Update {
        /// Document to edit
        file: PathBuf,
        /// Text expected to exist in the document
        old: String,
        /// Replacement text
        new: String,
        /// Match case-insensitively
        #[arg(long)]
        ignore_case: bool,
        /// Treat the old text as a regex pattern
        #[arg(long)]
        regex: bool,
        /// Replace matching text anywhere, including protected template spans
        #[arg(long)]
        raw: bool,
        /// Report without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Replace content addressed by a structural selector
    Selector {
        file: PathBuf,
        /// CSS-like selector, directive (@include), expression ({{ $x }}),
        /// component tag (x-alert), or named block (section:header)
        selector: String,
        new: String,
        /// How to interpret the new value: text, html, or replace
        #[arg(long, default_value = "text")]
        mode: String,
        #[arg(long)]
        dry_run: bool,
    },

    /// Set or remove an attribute on selected nodes
    Attr {
        file: PathBuf,
        selector: String,
        /// Attribute name
        name: String,
        /// New value; omit together with --remove to delete the attribute
        value: Option<String>,
        /// Remove the attribute instead of setting it
        #[arg(long)]
        remove: bool,
        #[arg(long)]
        dry_run: bool,
    },

    /// Replace one line, 1-indexed
    Line {
        file: PathBuf,
        line: usize,
        new: String,
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply a JSON file of requests to one document, all-or-nothing
    Batch {
        file: PathBuf,
        /// JSON array of mutation requests
        requests: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what an update would change, without writing
    Preview {
        file: PathBuf,
        old: String,
        new: String,
    },

    /// List backups for a document, most recent first
    History {
        file: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Diff a backup against the document's current content
    Diff {
        file: PathBuf,
        /// Backup id from `history`
        backup: Uuid,
        /// Diff against another backup instead of the current content
        #[arg(long)]
        against: Option<Uuid>,
    },

    /// Roll a document back to a backup
    Restore {
        file: PathBuf,
        backup: Uuid,
    },

    /// Check a document's structure with its format strategy
    Validate {
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_file = if cli.log {
        default_log_path().ok()
    } else {
        cli.log_file.clone()
    };
    if let Err(e) = init_logging(cli.debug, cli.quiet, log_file) {
        eprintln!("logging setup failed: {}", e);
    }

    match run(cli) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {:#}", e);
            let code = e
                .downcast_ref::<EngineError>()
                .map(|engine_err| if engine_err.is_policy_rejection() { 2 } else { 1 })
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::load(cli.dir.as_deref())?;
    let engine = MutationEngine::new(&config)?;

    match cli.command {
        Commands::Update {
            file,
            old,
            new,
            ignore_case,
            regex,
            raw,
            dry_run,
        } => {
            let opts = UpdateOptions {
                case_sensitive: !ignore_case,
                regex,
                raw,
                dry_run,
                ..Default::default()
            };
            let result = engine.update_content(&file, &old, &new, &opts)?;
            report_result(&file, result.changed, dry_run, result.backup_id);
        }

        Commands::Selector {
            file,
            selector,
            new,
            mode,
            dry_run,
        } => {
            let opts = UpdateOptions {
                update_mode: parse_update_mode(&mode)?,
                dry_run,
                ..Default::default()
            };
            let result = engine.update_by_selector(&file, &selector, &new, &opts)?;
            report_result(&file, result.changed, dry_run, result.backup_id);
        }

        Commands::Attr {
            file,
            selector,
            name,
            value,
            remove,
            dry_run,
        } => {
            if value.is_none() && !remove {
                anyhow::bail!("provide a value, or pass --remove to delete the attribute");
            }
            let opts = UpdateOptions {
                dry_run,
                ..Default::default()
            };
            let value = if remove { None } else { value };
            let result = engine.update_attribute(&file, &selector, &name, value.as_deref(), &opts)?;
            report_result(&file, result.changed, dry_run, result.backup_id);
        }

        Commands::Line {
            file,
            line,
            new,
            dry_run,
        } => {
            let opts = UpdateOptions {
                dry_run,
                ..Default::default()
            };
            let result = engine.update_by_line(&file, line, &new, &opts)?;
            report_result(&file, result.changed, dry_run, result.backup_id);
        }

        Commands::Batch {
            file,
            requests,
            dry_run,
        } => {
            let contents = std::fs::read_to_string(&requests)?;
            let parsed: Vec<MutationRequest> = serde_json::from_str(&contents)?;
            let opts = UpdateOptions {
                dry_run,
                ..Default::default()
            };
            let report = engine.batch_update(&file, &parsed, &opts)?;
            println!(
                "{} of {} requests updated {}",
                report.updated_count(),
                report.items.len(),
                file.display()
            );
            for item in &report.items {
                println!("  [{}] {:?}", item.index, item.outcome);
            }
        }

        Commands::Preview { file, old, new } => {
            let preview = engine.preview(&file, &old, &new, &UpdateOptions::default())?;
            if preview.changed {
                print!("{}", render_diff(&preview.changes));
            } else {
                println!("(no changes)");
            }
        }

        Commands::History { file, json } => {
            let records = engine.history(&file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("(no backups)");
            } else {
                for record in records {
                    println!("{}  {}  {} bytes", record.id, record.created_at, record.size);
                }
            }
        }

        Commands::Diff {
            file,
            backup,
            against,
        } => {
            let changes = match against {
                Some(other) => engine.diff_backups(backup, other)?,
                None => engine.diff(&file, backup)?,
            };
            let rendered = render_diff(&changes);
            if rendered.is_empty() {
                println!("(no changes)");
            } else {
                print!("{}", rendered);
            }
        }

        Commands::Restore { file, backup } => {
            let result = engine.restore(&file, backup)?;
            if result.changed {
                println!("restored {} from {}", file.display(), backup);
            } else {
                println!("{} already matches {}", file.display(), backup);
            }
        }

        Commands::Validate { file } => {
            let report = engine.validate_document(&file)?;
            for warning in &report.warnings {
                println!("warning: {}", warning);
            }
            if report.valid {
                println!("✓ {} is structurally valid", file.display());
            } else {
                for error in &report.errors {
                    eprintln!("✗ {}", error);
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn parse_update_mode(mode: &str) -> Result<UpdateMode> {
    match mode {
        "text" => Ok(UpdateMode::Text),
        "html" => Ok(UpdateMode::Html),
        "replace" => Ok(UpdateMode::Replace),
        other => anyhow::bail!("unknown update mode '{}' (expected text, html, or replace)", other),
    }
}

fn report_result(file: &std::path::Path, changed: bool, dry_run: bool, backup: Option<Uuid>) {
    let prefix = if dry_run { "would update" } else { "updated" };
    if changed {
        match backup {
            Some(id) => println!("{} {} (backup {})", prefix, file.display(), id),
            None => println!("{} {}", prefix, file.display()),
        }
    } else {
        println!("no changes to {}", file.display());
    }
}
