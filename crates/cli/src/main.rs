use clap::Parser;
use taskex_cli::cli::Cli;
use taskex_cli::error::CliError;
use taskex_cli::output::{self, OutputFormat, ResultBuilder};
use taskex_cli::{commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;

	if let Err(err) = commands::dispatch(cli, format).await {
		if !err.is_output_already_printed() {
			handle_error(err, format);
		}
		std::process::exit(1);
	}
}

fn handle_error(err: CliError, format: OutputFormat) {
	let cmd_error = err.to_command_error();

	output::print_error_stderr(&cmd_error);

	if format != OutputFormat::Text {
		let result: output::CommandResult<()> = ResultBuilder::new(err.command().unwrap_or("unknown")).command_error(cmd_error).build();
		output::print_result(&result, format);
	}
}
