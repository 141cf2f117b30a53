//! Command implementations.

pub mod export;
pub mod login;
pub mod parse;
pub mod session;

use crate::cli::{Cli, Commands, SessionAction};
use crate::config;
use crate::error::Result;
use crate::output::OutputFormat;

pub async fn dispatch(cli: Cli, format: OutputFormat) -> Result<()> {
	let config = config::load(cli.config.as_deref())?;

	match cli.command {
		Commands::Export(args) => export::run(&args, config, format).await,
		Commands::Login(args) => login::run(&args, config, format).await,
		Commands::Session(args) => match args.action {
			SessionAction::Status => session::status(&config, format),
			SessionAction::Clear => session::clear(&config, format),
		},
		Commands::Parse(args) => parse::run(&args, &config, format).await,
	}
}
