use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;

use sensor_chart::app::App;
use sensor_chart::config::AppConfig;
use sensor_chart::store::JsonFileStore;
use sensor_chart::{FileCache, FileRecord, PutStatus, Upload, human_file_size};

/// Plot multi-sensor CSV logs in the terminal.
#[derive(Parser, Debug)]
#[command(name = "sensor-chart")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// CSV files to upload when the viewer starts
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Config file (defaults to ./sensor-chart.toml or ./config/sensor-chart.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// File cache location, overrides `store_path` from the config
    #[arg(long, short = 's', global = true)]
    store: Option<PathBuf>,

    /// Keep at most N cached files, evicting the oldest upload
    #[arg(long, global = true)]
    max_files: Option<usize>,

    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the cached files
    List,

    /// Parse CSV files into the cache without opening the viewer
    Import {
        /// CSV files to import
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Replace cached files that have the same name
        #[arg(long)]
        overwrite: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let (mut config, config_source) =
        AppConfig::load_or_default(cli.config.as_deref()).wrap_err("Failed to load config")?;
    if let Some(store) = &cli.store {
        config.store_path = store.clone();
    }
    if cli.max_files.is_some() {
        config.cache.max_files = cli.max_files;
    }

    init_logging(&config, cli.verbose)?;
    match &config_source {
        Some(path) => log::info!("Loaded config from {}", path.display()),
        None => log::info!("No config file found, using defaults"),
    }

    let store = JsonFileStore::new(&config.store_path);
    let cache = FileCache::load(Box::new(store), config.cache_policy());

    match cli.command {
        None => {
            let terminal = ratatui::init();
            let result = App::new(cache, cli.files).run(terminal);
            ratatui::restore();
            result
        }
        Some(Command::List) => {
            run_list(&cache);
            Ok(())
        }
        Some(Command::Import { files, overwrite }) => run_import(cache, &files, overwrite),
    }
}

/// Logs go to a file because the viewer owns the terminal. `RUST_LOG` wins over `-v`.
fn init_logging(config: &AppConfig, verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => config.log_level.as_str(),
        1 => "info",
        _ => "debug",
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .wrap_err_with(|| format!("Failed to open log file {}", config.log_file.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn run_list(cache: &FileCache) {
    if cache.is_empty() {
        println!("No cached files.");
        return;
    }
    for record in cache.records() {
        println!(
            "{}\t{}\tuploaded {}\tmodified {}\t{} sensors\t{} rows",
            record.name,
            human_file_size(record.size),
            record.uploaded_at.to_rfc3339(),
            record.last_modified_at.to_rfc3339(),
            record.parsed.sensor_list.len(),
            record.parsed.rows.len()
        );
    }
}

fn run_import(mut cache: FileCache, files: &[PathBuf], overwrite: bool) -> Result<()> {
    let mut failures = 0usize;
    for path in files {
        if let Err(e) = import_one(&mut cache, path, overwrite) {
            log::warn!("Import of {} failed: {e:#}", path.display());
            eprintln!("{}: {e:#}", path.display());
            failures += 1;
        }
    }
    if failures > 0 {
        color_eyre::eyre::bail!("{failures} of {} file(s) failed to import", files.len());
    }
    Ok(())
}

fn import_one(cache: &mut FileCache, path: &Path, overwrite: bool) -> Result<()> {
    let upload = Upload::from_path(path)?;
    let name = upload.name.clone();
    let status = cache.put(upload, |existing| {
        if !overwrite {
            eprintln!("{}", already_cached_message(existing));
        }
        overwrite
    })?;
    match status {
        PutStatus::Inserted => println!("{name}: imported"),
        PutStatus::OverwriteConfirmed => println!("{name}: replaced"),
        PutStatus::OverwriteDeclined => println!("{name}: skipped"),
    }
    Ok(())
}

fn already_cached_message(existing: &FileRecord) -> String {
    format!(
        "{}: already cached ({}, uploaded {}, modified {}); pass --overwrite to replace it",
        existing.name,
        human_file_size(existing.size),
        existing.uploaded_at.to_rfc3339(),
        existing.last_modified_at.to_rfc3339()
    )
}
