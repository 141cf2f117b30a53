use std::path::PathBuf;

use serde::Serialize;
use taskex::{CsvRecordParser, ExportConfig, RecordSchema, summarize};
use taskex_protocol::{TaskRecord, TaskSummary};

use crate::cli::ParseArgs;
use crate::error::{CliError, Result};
use crate::output::{self, OutputFormat, ResultBuilder};

const COMMAND: &str = "parse";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseData {
	pub file: PathBuf,
	pub records: Vec<TaskRecord>,
	pub summary: TaskSummary,
}

/// Parses a saved export offline, e.g. a raw file kept after a failed run.
pub async fn run(args: &ParseArgs, config: &ExportConfig, format: OutputFormat) -> Result<()> {
	let text = tokio::fs::read_to_string(&args.file).await?;
	let schema = RecordSchema {
		strict: args.strict || config.strict_header,
	};
	let records = CsvRecordParser::new(schema).parse(&text).map_err(CliError::in_command(COMMAND))?;
	let summary = summarize(&records);

	let result = ResultBuilder::new(COMMAND)
		.data(ParseData {
			file: args.file.clone(),
			records,
			summary,
		})
		.build();
	output::print_result(&result, format);
	Ok(())
}
