pub mod asset;
pub mod cache;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod frame;
pub mod io_utils;
pub mod normalize;
pub mod query;
pub mod reconcile;
pub mod store;
pub mod table;
pub mod tables;
pub mod upload;
pub mod values;

use std::{env, sync::OnceLock, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cache::{NoopCache, QueryCache, TtlCache},
    cli::{Cli, Commands, OptionLevel, OutputFormat},
    config::Config,
    query::{FilterSelection, READING_COLUMNS, Reading, ReadingsRepository, or_empty},
    store::{Database, SqliteConnectionFactory},
    upload::{UploadOptions, run_upload},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("equipment_monitor", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let result = dispatch(cli);
    if let Err(err) = &result {
        debug!("{err:?}");
    }
    result
}

fn dispatch(cli: Cli) -> Result<()> {
    let config = Config::resolve(cli.config.as_deref(), cli.database.as_deref())?;
    let db = open_database(&config);
    let cache = build_cache(&config);
    match cli.command {
        Commands::Upload(args) => handle_upload(&db, cache.as_ref(), &config, &args),
        Commands::Readings(args) => handle_readings(&db, cache.as_ref(), &config, &args),
        Commands::Options(args) => handle_options(&db, cache.as_ref(), &config, &args),
        Commands::Columns(args) => handle_columns(&db, &args),
        Commands::Status => handle_status(&db, cache.as_ref(), &config),
    }
}

fn open_database(config: &Config) -> Database {
    Database::new(SqliteConnectionFactory::new(
        &config.database.path,
        config.database.busy_timeout(),
    ))
}

fn build_cache(config: &Config) -> Box<dyn QueryCache> {
    match config.cache.ttl_secs {
        0 => Box::new(NoopCache),
        secs => Box::new(TtlCache::new(Duration::from_secs(secs))),
    }
}

fn handle_upload(
    db: &Database,
    cache: &dyn QueryCache,
    config: &Config,
    args: &cli::UploadArgs,
) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let options = UploadOptions {
        table: args.table,
        policy: args.policy.unwrap_or(config.upload.policy),
        delimiter: args.delimiter,
        encoding,
    };
    info!(
        "Uploading '{}' into {} ({:?} columns, delimiter {})",
        args.input.display(),
        options.table,
        options.policy,
        options
            .delimiter
            .map(printable_delimiter)
            .unwrap_or_else(|| "auto".to_string())
    );
    let now = chrono::Local::now().naive_local();
    let report = run_upload(db, cache, &args.input, &options, now)
        .inspect_err(|err| {
            if err.is_validation() {
                warn!("{} upload rejected; no rows were written", options.table);
            }
        })
        .with_context(|| format!("Uploading {:?} into {}", args.input, options.table))?;
    if !report.ignored_columns.is_empty() {
        println!("Ignored columns: {}", report.ignored_columns.join(", "));
    }
    if report.blank_keys_dropped + report.uncoercible_keys > 0 {
        info!(
            "Skipped {} row(s) without a usable key",
            report.blank_keys_dropped + report.uncoercible_keys
        );
    }
    println!("{}", report.summary());
    Ok(())
}

fn handle_readings(
    db: &Database,
    cache: &dyn QueryCache,
    config: &Config,
    args: &cli::ReadingsArgs,
) -> Result<()> {
    let selection = FilterSelection::new(
        args.equipment.clone(),
        args.component.clone(),
        args.point.clone(),
    )?;
    let repository = ReadingsRepository::new(db, cache, config.query.row_limit);
    let readings = or_empty(repository.load_readings(&selection, args.limit))?;
    info!("Loaded {} reading(s)", readings.len());
    write_readings(&readings, args.format)
}

fn write_readings(readings: &[Reading], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            let rows = readings.iter().map(Reading::cells).collect::<Vec<_>>();
            table::print_table(&READING_COLUMNS, &rows);
        }
        OutputFormat::Csv => {
            let mut writer = io_utils::open_stdout_csv_writer(io_utils::COMMA);
            writer.write_record(READING_COLUMNS)?;
            for reading in readings {
                writer.write_record(reading.cells())?;
            }
            writer.flush().context("Flushing CSV output")?;
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(readings)?);
        }
    }
    Ok(())
}

fn handle_options(
    db: &Database,
    cache: &dyn QueryCache,
    config: &Config,
    args: &cli::OptionsArgs,
) -> Result<()> {
    let repository = ReadingsRepository::new(db, cache, config.query.row_limit);
    let equipment = args.equipment.as_deref();
    let component = args.component.as_deref();
    let options = match (args.level, equipment, component) {
        (OptionLevel::Equipment, _, _) => or_empty(repository.equipment_options())?,
        (OptionLevel::Components, Some(equipment), _) => {
            or_empty(repository.component_options(equipment))?
        }
        (OptionLevel::Points, Some(equipment), Some(component)) => {
            or_empty(repository.point_options(equipment, component))?
        }
        (OptionLevel::Components, None, _) => bail!("Listing components requires --equipment"),
        (OptionLevel::Points, _, _) => {
            bail!("Listing points requires --equipment and --component")
        }
    };
    for option in &options {
        println!("{option}");
    }
    Ok(())
}

fn handle_columns(db: &Database, args: &cli::ColumnsArgs) -> Result<()> {
    let columns = db
        .table_columns(args.table)
        .with_context(|| format!("Describing {}", args.table))?;
    let key = args.table.unique_key();
    let rows = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            vec![
                (idx + 1).to_string(),
                column.name.clone(),
                column.declared_type.clone().unwrap_or_default(),
                if key == Some(column.name.as_str()) {
                    "unique".to_string()
                } else {
                    String::new()
                },
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&["#", "name", "type", "key"], &rows);
    Ok(())
}

fn handle_status(db: &Database, cache: &dyn QueryCache, config: &Config) -> Result<()> {
    db.ping()
        .with_context(|| format!("Checking database {}", db.describe()))?;
    println!("Database: {} (connected)", db.describe());

    let repository = ReadingsRepository::new(db, cache, config.query.row_limit);
    let readings = or_empty(repository.load_readings(&FilterSelection::all(), None))?;
    println!(
        "Readings: {} loaded (limit {})",
        readings.len(),
        config.query.row_limit
    );

    match &config.asset {
        Some(asset) => match asset::fetch_asset(asset) {
            Some(bytes) => println!("Asset: {} byte(s) from {}", bytes.len(), asset.url),
            None => {
                warn!("Asset at {} is unavailable", asset.url);
                println!("Asset: unavailable");
            }
        },
        None => println!("Asset: not configured"),
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
