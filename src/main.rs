use std::collections::BTreeMap;

use aventine::{
    ConfigDb,
    DataDir,
    DocumentKey,
    Error,
    Lexicon,
    Providers,
    Result,
    SearchEngine,
    Settings,
    doc_index::Progress,
    mcp,
    pipeline::{self, IndexObserver, Indexer},
    search::{self, Language, Query, Scope},
    settings,
    status::IndexStatus,
};
use clap::Parser;
use kdam::{Bar, BarExt, tqdm};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("AVENTINE_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Index(args) => {
            let settings = load_settings(&data_dir)?;
            cmd_index(data_dir, &settings, &args)?;
        }
        Command::Search(args) => {
            let settings = load_settings(&data_dir)?;
            cmd_search(data_dir, &settings, &args)?;
        }
        Command::Status(args) => {
            cmd_status(&data_dir, args.json)?;
        }
        Command::Config { action } => {
            let config_db = ConfigDb::open(&data_dir.config_db())?;
            cmd_config(&config_db, action)?;
        }
        Command::ExportLemmatised(args) => {
            cmd_export(&data_dir, &args)?;
        }
        Command::Mcp => {
            let settings = load_settings(&data_dir)?;
            let engine = open_engine(data_dir, &settings)?;
            mcp::run_mcp(engine)?;
        }
        Command::Completions(args) => {
            args.generate();
        }
    }

    Ok(())
}

/// Read settings and release the database, so concurrent commands are not
/// locked out for the lifetime of a long-running server.
fn load_settings(data_dir: &DataDir) -> Result<Settings> {
    let config_db = ConfigDb::open(&data_dir.config_db())?;
    Settings::load(&config_db)
}

fn open_engine(
    data_dir: DataDir,
    settings: &Settings,
) -> Result<Option<SearchEngine>> {
    let providers = Providers::from_settings(settings)?;
    SearchEngine::open(data_dir, Lexicon::new(settings.key_scheme), providers)
}

// -- Index --

/// Renders indexing progress as a terminal progress bar.
#[derive(Default)]
struct ProgressBar {
    bar: Option<Bar>,
}

impl IndexObserver for ProgressBar {
    fn started(&mut self, key: &DocumentKey, progress: &Progress) {
        self.bar = Some(tqdm!(
            total = progress.total_chunks,
            initial = progress.next_chunk(),
            desc = key.to_string(),
            unit = "chunk"
        ));
    }

    fn chunk_done(&mut self, _chunk: usize, progress: &Progress) {
        if let Some(bar) = self.bar.as_mut() {
            bar.set_postfix(format!("lemmata={}", progress.distinct_lemmata));
            if let Err(e) = bar.update(1) {
                tracing::debug!("progress bar update failed: {e}");
            }
        }
    }

    fn finished(&mut self, _key: &DocumentKey, _progress: &Progress) {
        if let Some(mut bar) = self.bar.take() {
            if let Err(e) = bar.refresh() {
                tracing::debug!("progress bar refresh failed: {e}");
            }
            eprintln!();
        }
    }
}

fn cmd_index(
    data_dir: DataDir,
    settings: &Settings,
    args: &cli::IndexArgs,
) -> Result<()> {
    let key = DocumentKey::parse(&args.key)?;
    let providers = Providers::from_settings(settings)?;
    let indexer =
        Indexer::new(data_dir, Lexicon::new(settings.key_scheme), providers);

    let report = if args.no_progress {
        indexer.index_source(&key, &mut pipeline::Quiet)
    } else {
        indexer.index_source(&key, &mut ProgressBar::default())
    }
    .inspect_err(|e| {
        if e.is_fatal() {
            tracing::error!(
                "{key}: the index on disk is damaged; rerunning will not \
                 repair it"
            );
        }
    })?;

    if report.already_complete {
        println!("{key} is already indexed ({} chunks).", report.total_chunks);
    } else {
        println!(
            "Indexed {} of {} chunks of {key}: {} new lemmata.",
            report.processed_chunks, report.total_chunks, report.new_lemmata
        );
    }
    Ok(())
}

// -- Search --

fn cmd_search(
    data_dir: DataDir,
    settings: &Settings,
    args: &cli::SearchArgs,
) -> Result<()> {
    let language: Language = args.language.parse()?;
    let scope: Scope = args.scope.parse()?;

    let mut query = Query::new(args.query.clone(), language)
        .with_max_results(args.count)
        .with_scope(scope);
    if args.anywhere {
        query = query.with_documents([]);
    } else if !args.documents.is_empty() {
        let keys = args
            .documents
            .iter()
            .map(|key| DocumentKey::parse(key))
            .collect::<Result<Vec<_>>>()?;
        query = query.with_documents(keys);
    }

    let root = data_dir.root().to_path_buf();
    let Some(engine) = open_engine(data_dir, settings)? else {
        eprintln!(
            "No sources under {}. Acquire documents and index them first.",
            root.display()
        );
        return Ok(());
    };

    let hits = engine.search(&query)?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&search::json_report(&query, &hits))?
        );
    } else {
        search::format_human(&hits);
    }
    Ok(())
}

// -- Status --

fn cmd_status(data_dir: &DataDir, json: bool) -> Result<()> {
    let status = IndexStatus::collect(data_dir)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        status.print_human();
    }
    if status.is_corrupted() {
        tracing::warn!(
            "interrupted saves found; remove the .tmp files after checking \
             the bundles they belong to"
        );
    }
    Ok(())
}

// -- Config --

fn cmd_config(config_db: &ConfigDb, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Get { name } => {
            let value = config_db.get_setting(&name)?.ok_or_else(|| {
                Error::NotFound {
                    kind: "setting",
                    name: name.clone(),
                }
            })?;
            println!("{value}");
        }
        ConfigAction::Set { name, value } => {
            Settings::validate(&name, &value)?;
            config_db.set_setting(&name, &value)?;
            if std::env::var(settings::env_var_name(&name)).is_ok() {
                eprintln!(
                    "Note: {} is set and overrides this value.",
                    settings::env_var_name(&name)
                );
            }
        }
        ConfigAction::Unset { name } => {
            if !config_db.remove_setting(&name)? {
                eprintln!("Setting '{name}' was not set.");
            }
        }
        ConfigAction::List { json } => {
            let settings = config_db.list_settings()?;
            if json {
                let map: BTreeMap<String, String> = settings.into_iter().collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else if settings.is_empty() {
                println!("No settings stored.");
            } else {
                for (name, value) in settings {
                    println!("{name} = {value}");
                }
            }
        }
    }
    Ok(())
}

// -- Export --

fn cmd_export(data_dir: &DataDir, args: &cli::ExportArgs) -> Result<()> {
    let key = DocumentKey::parse(&args.key)?;
    let text = pipeline::lemmatised_text(data_dir, &key)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &text)?;
            eprintln!("Wrote {} lines to {}", text.lines().count(), path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
