use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use taskex::{CapabilityDriver, ChromiumDriver, ExportConfig, ExportOrchestrator, ExportOutcome, ExportRequest, SessionStore};
use taskex_protocol::{TaskRecord, TaskSummary};
use tracing::{info, warn};

use crate::cli::ExportArgs;
use crate::error::{CliError, Result};
use crate::output::{self, CommandResult, DiagnosticLevel, ErrorCode, OutputFormat, ResultBuilder};

const COMMAND: &str = "export";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
	pub start: String,
	pub end: String,
	pub records: Vec<TaskRecord>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub summary: Option<TaskSummary>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub raw_payload_path: Option<PathBuf>,
}

/// Applies command-line overrides on top of the loaded config.
pub fn apply_overrides(config: &mut ExportConfig, args: &ExportArgs) {
	if args.headed {
		config.headless = false;
	}
	if let Some(dir) = &args.output_dir {
		config.output_dir = dir.clone();
	}
	if let Some(url) = &args.base_url {
		config.base_url = url.clone();
	}
}

pub async fn run(args: &ExportArgs, mut config: ExportConfig, format: OutputFormat) -> Result<()> {
	let started = Instant::now();
	apply_overrides(&mut config, args);
	let request = ExportRequest::parse(args.start.as_deref(), args.end.as_deref()).map_err(CliError::in_command(COMMAND))?;

	// Checked up front so a missing login never costs a browser launch.
	let session = SessionStore::from_config(&config);
	if !session.is_valid() {
		return Err(CliError::SessionInvalid {
			path: session.path().to_path_buf(),
		});
	}

	let driver = Arc::new(ChromiumDriver::launch(&config).await.map_err(|e| CliError::BrowserLaunch(e.to_string()))?);
	info!(target = "taskex.cli", range = %request, url = %config.export_url(), "running export");

	let outcome = ExportOrchestrator::new(config, driver.clone()).run(&request).await;
	if let Err(e) = driver.close().await {
		warn!(target = "taskex.cli", error = %e, "failed to close browser");
	}

	let ok = outcome.success;
	let result = outcome_result(&request, outcome, started);
	output::print_result(&result, format);
	if ok { Ok(()) } else { Err(CliError::OutputAlreadyPrinted) }
}

/// Maps an outcome onto the envelope: records as data on success, the
/// classified failure as the error otherwise. Warnings become diagnostics.
pub fn outcome_result(request: &ExportRequest, outcome: ExportOutcome, started: Instant) -> CommandResult<ExportData> {
	let mut builder = ResultBuilder::new(COMMAND).started_at(started).artifacts(outcome.artifacts);
	for warning in &outcome.warnings {
		builder = builder.diagnostic_with_source(DiagnosticLevel::Warning, &warning.detail, warning.reason.as_str());
	}

	match outcome.failure {
		None => builder
			.data(ExportData {
				start: request.start.to_string(),
				end: request.end.to_string(),
				records: outcome.records,
				summary: outcome.summary,
				raw_payload_path: outcome.raw_payload_path,
			})
			.build(),
		Some(failure) => {
			let mut message = failure.detail;
			if failure.reason.needs_login() {
				message.push_str(" (run `taskex login`)");
			}
			builder
				.error_with_details(
					ErrorCode::from(failure.reason),
					message,
					serde_json::json!({
						"reason": failure.reason,
						"rawPayloadPath": outcome.raw_payload_path,
					}),
				)
				.build()
		}
	}
}
