#[cfg(test)]
mod tests;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;
use crate::styles::cli_styles;

/// Root CLI for taskex.
#[derive(Parser, Debug)]
#[command(name = "taskex")]
#[command(about = "Export task records from a browser-rendered tracker")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: toon (default), json, ndjson, or text
	#[arg(short = 'f', long, global = true, value_enum, default_value = "toon")]
	pub format: OutputFormat,

	/// Config file (defaults to $XDG_CONFIG_HOME/taskex/config.json when present)
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Export records for a date range using the saved session.
	Export(ExportArgs),
	/// Log in interactively and save the session snapshot.
	Login(LoginArgs),
	/// Inspect or remove the saved session.
	Session(SessionArgs),
	/// Parse a previously saved export file.
	Parse(ParseArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ExportArgs {
	/// First day of the range (YYYY-MM-DD, YYYY/MM/DD or YYYYMMDD); defaults to today
	#[arg(long, value_name = "DATE")]
	pub start: Option<String>,

	/// Last day of the range; defaults to today
	#[arg(long, value_name = "DATE")]
	pub end: Option<String>,

	/// Show the browser window
	#[arg(long)]
	pub headed: bool,

	/// Directory the raw export is written to
	#[arg(short, long, value_name = "DIR")]
	pub output_dir: Option<PathBuf>,

	/// Override the application origin
	#[arg(long, value_name = "URL")]
	pub base_url: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
	/// Seconds to wait before saving the session automatically
	#[arg(short, long = "timeout", default_value = "300", value_name = "SECONDS")]
	pub timeout_secs: u64,

	/// Override the application origin
	#[arg(long, value_name = "URL")]
	pub base_url: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
	#[command(subcommand)]
	pub action: SessionAction,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
	/// Show whether the saved session is usable and when it expires.
	Status,
	/// Delete the saved session.
	Clear,
}

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
	/// Export file to parse
	#[arg(value_name = "FILE")]
	pub file: PathBuf,

	/// Require header names to match the record columns
	#[arg(long)]
	pub strict: bool,
}
