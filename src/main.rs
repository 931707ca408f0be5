//! kverify CLI - verify indexer output against goal files

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use kverify::config::{self, KverifyConfig};
use kverify::storage::{EntryStream, FactStore};
use kverify::ui::{self, Icons};
use kverify::{Error, Fact, RuleFormat, VerificationSession};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "kverify")]
#[command(version)]
#[command(about = "Verify code-graph facts against goals written in a small logic language")]
#[command(long_about = r#"
kverify loads facts (from a delimited Entry stream or a fact store), parses
goal files, and checks that every goal can be satisfied by the facts.

Example usage:
  indexer foo.cc | kverify verify foo.cc
  kverify import --store facts.db --input entries.bin
  kverify verify --store facts.db rules.txt
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./kverify.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Detect,
    Plain,
    Inline,
}

impl From<FormatArg> for RuleFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Detect => RuleFormat::Detect,
            FormatArg::Plain => RuleFormat::Plain,
            FormatArg::Inline => RuleFormat::Inline,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check rule files against a set of facts
    Verify {
        /// Rule files (plain goal lists or sources with //- rules)
        rule_files: Vec<PathBuf>,

        /// Read facts from this fact store instead of a stream
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Read the delimited Entry stream from this file instead of stdin
        #[arg(short, long, conflicts_with = "store")]
        input: Option<PathBuf>,

        /// Ignore duplicate facts
        #[arg(long)]
        ignore_dups: bool,

        /// How to read rule files. `detect` reads files with `//-` lines or a
        /// source extension as inline, and `.rules`, `.txt` or extensionless
        /// files as plain goal lists.
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Print each fact as it is loaded
        #[arg(long)]
        show_protos: bool,

        /// Print the goals parsed from the rule files
        #[arg(long)]
        show_goals: bool,

        /// Dump the fact graph in DOT format
        #[arg(long)]
        graphviz: bool,

        /// Dump all facts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy a delimited Entry stream into a fact store
    Import {
        /// Fact store to write (created if missing)
        #[arg(short, long)]
        store: PathBuf,

        /// Stream to read (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show statistics about a fact store
    Stats {
        /// Fact store to inspect
        #[arg(short, long)]
        store: PathBuf,
    },

    /// Write a default kverify.toml
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries dumps.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();

    match cli.command {
        Commands::Verify {
            rule_files,
            store,
            input,
            ignore_dups,
            format,
            show_protos,
            show_goals,
            graphviz,
            json,
        } => {
            if rule_files.is_empty() && !graphviz && !json {
                ui::error("No rule files specified");
                return Ok(ExitCode::FAILURE);
            }

            let mut session = VerificationSession::new();
            if ignore_dups || config.ignore_dups.unwrap_or(false) {
                session.ignore_duplicate_facts();
            }

            let format = format
                .map(RuleFormat::from)
                .or(config.rule_format)
                .unwrap_or_default();
            for path in &rule_files {
                if let Err(err) = session.load_rule_file(path, format) {
                    ui::error(&err.to_string());
                    return Ok(ExitCode::FAILURE);
                }
            }

            let show = |index: usize, fact: &Fact| {
                if show_protos {
                    println!("{index}: {fact}");
                }
            };
            let store = store.or_else(|| config.store_path());
            let loaded: anyhow::Result<_> = match (&store, &input) {
                (Some(store), _) => open_existing_store(store)
                    .and_then(|store| session.load_store(&store, show).map_err(Into::into)),
                (None, Some(input)) => std::fs::File::open(input)
                    .with_context(|| format!("could not open {}", input.display()))
                    .and_then(|file| session.load_stream(file, show).map_err(Into::into)),
                (None, None) => session.load_stream(io::stdin().lock(), show).map_err(Into::into),
            };
            match loaded {
                Ok(stats) => debug!(%stats, "Facts loaded"),
                Err(err) => {
                    ui::error(&format!("{err:#}"));
                    return Ok(ExitCode::FAILURE);
                }
            }

            let mut stdout = io::stdout().lock();
            if show_goals {
                session.show_goals(&mut stdout)?;
            }
            if graphviz {
                session.dump_as_dot(&mut stdout)?;
            }
            if json {
                session.dump_as_json(&mut stdout)?;
            }

            if !session.verify_all_goals() {
                ui::error("Could not verify all goals. The furthest we reached was:");
                if let Some((group, goal)) = session.goal_at(session.highest_goal_reached()) {
                    let span = session.arena().get(goal).span();
                    let location = format!("{}:{}:", group.name, span);
                    ui::goal_line(&location, &session.arena().display(goal).to_string());
                }
                return Ok(ExitCode::FAILURE);
            }

            session.show_inspections(&mut stdout)?;
            drop(stdout);
            if !kverify::output::is_quiet() && !graphviz && !json {
                ui::success(&format!(
                    "Verified {} goals from {} rule files against {} facts",
                    session.goal_count(),
                    rule_files.len(),
                    session.database().len()
                ));
            }
        }

        Commands::Import { store, input } => {
            let mut fact_store = FactStore::open(&store)?;
            let reader: Box<dyn Read> = match &input {
                Some(path) => Box::new(
                    std::fs::File::open(path).with_context(|| format!("could not open {}", path.display()))?,
                ),
                None => Box::new(io::stdin().lock()),
            };

            ui::header(&format!("Importing facts into {}", store.display()));
            fact_store.begin_transaction()?;
            let (imported, skipped) = match import_stream(&fact_store, reader) {
                Ok(counts) => counts,
                Err(err) => {
                    fact_store.rollback()?;
                    return Err(err);
                }
            };
            fact_store.commit()?;

            ui::summary_row("Imported:", &imported.to_string());
            ui::summary_row("Skipped:", &skipped.to_string());
            ui::summary_row("Entries in store:", &fact_store.count_entries()?.to_string());
            ui::success("Import complete");
        }

        Commands::Stats { store } => {
            let fact_store = open_existing_store(&store)?;
            let stats = fact_store.stats()?;

            ui::status(Icons::DATABASE, "Store", &store.display().to_string());
            ui::section("Store Statistics");
            println!(
                "{}",
                ui::table::stats_table(&[
                    ("Entries", stats.entries),
                    ("Edges", stats.edges),
                    ("Node facts", stats.node_facts),
                    ("Bad keys", stats.bad_keys),
                ])
            );
            if stats.bad_keys > 0 {
                ui::warn(&format!("{} entries have malformed keys and will be skipped", stats.bad_keys));
            }
        }

        Commands::Init { force } => {
            let path = cli.config.unwrap_or_else(config::default_config_path);
            config::write_config(&path, &KverifyConfig::default(), force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Fact stores are never created implicitly when reading
fn open_existing_store(path: &Path) -> anyhow::Result<FactStore> {
    if !path.exists() {
        anyhow::bail!("fact store {} does not exist", path.display());
    }
    Ok(FactStore::open(path)?)
}

/// Copy every decodable record into `store`. Returns (imported, skipped).
fn import_stream(store: &FactStore, reader: impl Read) -> anyhow::Result<(usize, usize)> {
    let mut imported = 0;
    let mut skipped = 0;
    for (index, record) in EntryStream::from_reader(reader)? {
        let fact = match record {
            Ok(fact) => fact,
            Err(err) if err.is_recoverable() => {
                warn!(index, error = %err, "Skipping undecodable record");
                skipped += 1;
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        match store.put_fact(&fact) {
            Ok(()) => imported += 1,
            Err(Error::Key(err)) => {
                warn!(index, error = %err, "Skipping fact that cannot be keyed");
                skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok((imported, skipped))
}
