use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{reconcile::SchemaPolicy, tables::Table};

#[derive(Debug, Parser)]
#[command(author, version, about = "Upload and browse equipment condition readings", long_about = None)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// SQLite database file (overrides config and EQUIPMENT_MONITOR_DB)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Append a CSV or spreadsheet upload to one of the monitored tables
    Upload(UploadArgs),
    /// Show readings joined with their alarm standard, newest first
    Readings(ReadingsArgs),
    /// List the choices available at one filter level
    Options(OptionsArgs),
    /// List the columns of a destination table
    Columns(ColumnsArgs),
    /// Check the database connection and the read path
    Status,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// File to upload (.csv, .xlsx, .xls, .ods)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination table
    #[arg(short = 't', long = "table", value_parser = parse_table)]
    pub table: Table,
    /// How to treat columns that differ from the table (defaults to config, then strict)
    #[arg(long, value_enum)]
    pub policy: Option<SchemaPolicy>,
    /// CSV delimiter character (detected from the header line when omitted)
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReadingsArgs {
    /// Equipment name to filter on
    #[arg(long)]
    pub equipment: Option<String>,
    /// Component to filter on (requires --equipment)
    #[arg(long)]
    pub component: Option<String>,
    /// Measurement point to filter on (requires --component)
    #[arg(long)]
    pub point: Option<String>,
    /// Maximum number of readings to show; without --equipment it cannot exceed query.row_limit
    #[arg(long)]
    pub limit: Option<usize>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct OptionsArgs {
    /// Filter level to list
    #[arg(value_enum)]
    pub level: OptionLevel,
    /// Equipment scope for components and points
    #[arg(long)]
    pub equipment: Option<String>,
    /// Component scope for points
    #[arg(long)]
    pub component: Option<String>,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// Table to describe
    #[arg(short = 't', long = "table", value_parser = parse_table)]
    pub table: Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OptionLevel {
    Equipment,
    Components,
    Points,
}

pub fn parse_table(value: &str) -> Result<Table, String> {
    value.parse::<Table>().map_err(|err| err.to_string())
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
