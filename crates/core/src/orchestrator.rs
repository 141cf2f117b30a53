//! End-to-end export run.
//!
//! ```text
//! Idle -> SessionCheck -> Authenticated -> Navigating -> InputtingDates
//!      -> Triggering -> Capturing -> Parsing -> Done
//!                    \-> NeedsLogin            (any step) -> Failed
//! ```
//!
//! Each step runs once. The first blocking failure ends the run with a
//! classified [`FailureReason`]; there are no internal retries. [`run`] always
//! returns an [`ExportOutcome`].
//!
//! [`run`]: ExportOrchestrator::run

use std::sync::Arc;

use taskex_protocol::{Artifact, ExportOutcome, ExportWarning, FailureReason};
use tracing::{debug, info, warn};

use crate::artifacts::{collect_failure_artifacts, save_raw_payload};
use crate::capture::{CaptureError, CaptureRace};
use crate::config::ExportConfig;
use crate::csv::{CsvRecordParser, RecordSchema, summarize};
use crate::date_input::{DateRangeInputEngine, FieldOutcome};
use crate::driver::CapabilityDriver;
use crate::readiness::ReadinessWaiter;
use crate::request::ExportRequest;
use crate::session::SessionStore;
use crate::trigger::ExportTrigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
	Idle,
	SessionCheck,
	Authenticated,
	NeedsLogin,
	Navigating,
	InputtingDates,
	Triggering,
	Capturing,
	Parsing,
	Done,
	Failed,
}

impl ExportState {
	pub fn is_terminal(&self) -> bool {
		matches!(self, ExportState::Done | ExportState::Failed | ExportState::NeedsLogin)
	}
}

pub struct ExportOrchestrator {
	config: ExportConfig,
	driver: Arc<dyn CapabilityDriver>,
	session: SessionStore,
	readiness: ReadinessWaiter,
	engine: DateRangeInputEngine,
	trigger: ExportTrigger,
	race: CaptureRace,
	parser: CsvRecordParser,
	history: Vec<ExportState>,
}

impl ExportOrchestrator {
	pub fn new(config: ExportConfig, driver: Arc<dyn CapabilityDriver>) -> Self {
		Self {
			session: SessionStore::from_config(&config),
			readiness: ReadinessWaiter::from_config(&config),
			engine: DateRangeInputEngine::new(config.timeouts.verify()),
			trigger: ExportTrigger::from_config(&config),
			race: CaptureRace::from_config(&config),
			parser: CsvRecordParser::new(RecordSchema {
				strict: config.strict_header,
			}),
			history: vec![ExportState::Idle],
			config,
			driver,
		}
	}

	/// Replaces the capture race, e.g. with a custom channel list.
	pub fn with_capture_race(mut self, race: CaptureRace) -> Self {
		self.race = race;
		self
	}

	pub fn with_input_engine(mut self, engine: DateRangeInputEngine) -> Self {
		self.engine = engine;
		self
	}

	pub fn state(&self) -> ExportState {
		self.history.last().copied().unwrap_or(ExportState::Idle)
	}

	/// Every state entered so far, starting with `Idle`.
	pub fn history(&self) -> &[ExportState] {
		&self.history
	}

	pub fn session(&self) -> &SessionStore {
		&self.session
	}

	fn enter(&mut self, state: ExportState) {
		debug!(target = "taskex", from = ?self.state(), to = ?state, "state transition");
		self.history.push(state);
	}

	pub async fn run(&mut self, request: &ExportRequest) -> ExportOutcome {
		info!(target = "taskex", range = %request, "export started");
		let driver = self.driver.clone();

		self.enter(ExportState::SessionCheck);
		let Some(record) = self.session.load() else {
			self.enter(ExportState::NeedsLogin);
			return self.fail(
				FailureReason::SessionInvalid,
				format!("no valid session snapshot at {}; run an interactive login", self.session.path().display()),
			);
		};
		if let Err(e) = driver.restore_snapshot(&record.snapshot).await {
			return self.fail(FailureReason::NavigationFailed, format!("could not restore session: {e}"));
		}
		self.enter(ExportState::Authenticated);

		self.enter(ExportState::Navigating);
		let url = self.config.export_url();
		if let Err(e) = driver.navigate(&url, self.config.timeouts.navigation()).await {
			return self.fail_with_artifacts(FailureReason::NavigationFailed, e.to_string()).await;
		}
		self.readiness.wait(driver.as_ref()).await;
		if let Some(marker) = self.config.selectors.login_marker.clone() {
			if matches!(driver.count(&marker).await, Ok(n) if n > 0) {
				warn!(target = "taskex", %url, "login page shown despite a valid snapshot");
				if let Err(e) = self.session.clear() {
					warn!(target = "taskex", error = %e, "failed to clear rejected session");
				}
				return self.fail(FailureReason::SessionInvalid, format!("{url} redirected to the login page; session cleared"));
			}
		}

		self.enter(ExportState::InputtingDates);
		let warnings = self.fill_dates(request).await;

		self.enter(ExportState::Triggering);
		let trigger = &self.trigger;
		let captured = self.race.capture(driver.clone(), trigger.invoke(driver.as_ref())).await;
		let payload = match captured {
			Ok((method, payload)) => {
				debug!(target = "taskex", %method, channel = %payload.channel, "capture complete");
				self.enter(ExportState::Capturing);
				payload
			}
			Err(CaptureError::Trigger(e)) => {
				return self
					.fail_with_artifacts(FailureReason::ExportControlUnavailable, e.to_string())
					.await
					.with_warnings(warnings);
			}
			Err(e @ CaptureError::Timeout { .. }) => {
				self.enter(ExportState::Capturing);
				return self.fail_with_artifacts(FailureReason::CaptureTimeout, e.to_string()).await.with_warnings(warnings);
			}
		};

		self.enter(ExportState::Parsing);
		let saved: Option<Artifact> = match save_raw_payload(&self.config.output_dir, &payload).await {
			Ok(artifact) => Some(artifact),
			Err(e) => {
				warn!(target = "taskex", dir = %self.config.output_dir.display(), error = %e, "failed to save raw export");
				None
			}
		};
		let raw_path = saved.as_ref().map(|a| a.path.clone());

		match self.parser.parse(&payload.text) {
			Ok(records) => {
				let summary = summarize(&records);
				self.enter(ExportState::Done);
				info!(
					target = "taskex",
					records = summary.total,
					completed = summary.completed,
					minutes = summary.total_duration_minutes,
					"export finished"
				);
				ExportOutcome::succeeded(records, summary, raw_path)
					.with_warnings(warnings)
					.with_artifacts(saved.into_iter().collect())
			}
			Err(e) => self
				.fail_with_artifacts(FailureReason::ParseFailure, e.to_string())
				.await
				.with_raw_payload_path(raw_path)
				.with_artifacts(saved.into_iter().collect())
				.with_warnings(warnings),
		}
	}

	async fn fill_dates(&self, request: &ExportRequest) -> Vec<ExportWarning> {
		let selectors = &self.config.selectors;
		let driver = self.driver.as_ref();
		if let Err(e) = driver.wait_for_selector(&selectors.start_date, self.config.timeouts.element()).await {
			debug!(target = "taskex", selector = %selectors.start_date, error = %e, "start date field not found");
		}

		let (start, end) = request.formatted(&self.config.date_format);
		let range = self
			.engine
			.fill_range(driver, &selectors.start_date, &selectors.end_date, &start, &end)
			.await;

		[range.start, range.end].into_iter().filter(|f| !f.verified()).map(unverified_warning).collect()
	}

	fn fail(&mut self, reason: FailureReason, detail: String) -> ExportOutcome {
		self.enter(ExportState::Failed);
		warn!(target = "taskex", %reason, %detail, "export failed");
		ExportOutcome::failed(reason, detail)
	}

	async fn fail_with_artifacts(&mut self, reason: FailureReason, detail: String) -> ExportOutcome {
		let artifacts = collect_failure_artifacts(self.driver.as_ref(), &self.config.artifacts_dir, "export").await;
		self.fail(reason, detail).with_artifacts(artifacts)
	}
}

fn unverified_warning(field: FieldOutcome) -> ExportWarning {
	ExportWarning {
		reason: FailureReason::DateInputUnverified,
		detail: format!(
			"{} did not read back {} after {} attempts (last read: {})",
			field.selector,
			field.target,
			field.attempts,
			field.last_read.as_deref().unwrap_or("<none>")
		),
	}
}
