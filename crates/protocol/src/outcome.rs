//! Terminal result of an export run and its failure taxonomy.
//!
//! An [`ExportOutcome`] is always exactly one of:
//!
//! ```json
//! { "success": true, "records": [...], "summary": {...}, "rawPayloadPath": "out/export-20250601-101500.csv" }
//! ```
//!
//! ```json
//! { "success": false, "records": [], "failure": { "reason": "CaptureTimeout", "detail": "..." } }
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::task::{TaskRecord, TaskSummary};

/// Classified reason an export run stopped or degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
	/// No usable session snapshot, or the remote showed the login page. Needs interactive login.
	SessionInvalid,
	/// Navigation to the export page failed at the network/driver level.
	NavigationFailed,
	/// A date field never read back the requested value. Reported as a warning only.
	DateInputUnverified,
	/// The export control could not be located, made actionable, or invoked.
	ExportControlUnavailable,
	/// No capture channel produced data within the budget.
	CaptureTimeout,
	/// The captured payload could not be parsed into records.
	ParseFailure,
}

impl FailureReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			FailureReason::SessionInvalid => "SessionInvalid",
			FailureReason::NavigationFailed => "NavigationFailed",
			FailureReason::DateInputUnverified => "DateInputUnverified",
			FailureReason::ExportControlUnavailable => "ExportControlUnavailable",
			FailureReason::CaptureTimeout => "CaptureTimeout",
			FailureReason::ParseFailure => "ParseFailure",
		}
	}

	/// Whether the condition stops the run. Only unverified date input is non-fatal.
	pub fn is_fatal(&self) -> bool {
		!matches!(self, FailureReason::DateInputUnverified)
	}

	/// Whether an interactive login would plausibly fix the failure.
	pub fn needs_login(&self) -> bool {
		matches!(self, FailureReason::SessionInvalid)
	}
}

impl std::fmt::Display for FailureReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A fatal failure with a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFailure {
	pub reason: FailureReason,
	pub detail: String,
}

/// A non-fatal condition observed during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportWarning {
	pub reason: FailureReason,
	pub detail: String,
}

/// Kind of diagnostic file left on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
	Screenshot,
	Html,
	Payload,
}

/// A file produced during the run, kept for diagnosis or as the raw export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
	#[serde(rename = "type")]
	pub artifact_type: ArtifactType,
	pub path: PathBuf,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcome {
	pub success: bool,
	#[serde(default)]
	pub records: Vec<TaskRecord>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub summary: Option<TaskSummary>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub raw_payload_path: Option<PathBuf>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failure: Option<ExportFailure>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub warnings: Vec<ExportWarning>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub artifacts: Vec<Artifact>,
}

impl ExportOutcome {
	pub fn succeeded(records: Vec<TaskRecord>, summary: TaskSummary, raw_payload_path: Option<PathBuf>) -> Self {
		Self {
			success: true,
			records,
			summary: Some(summary),
			raw_payload_path,
			failure: None,
			warnings: Vec::new(),
			artifacts: Vec::new(),
		}
	}

	pub fn failed(reason: FailureReason, detail: impl Into<String>) -> Self {
		Self {
			success: false,
			records: Vec::new(),
			summary: None,
			raw_payload_path: None,
			failure: Some(ExportFailure {
				reason,
				detail: detail.into(),
			}),
			warnings: Vec::new(),
			artifacts: Vec::new(),
		}
	}

	pub fn failure_reason(&self) -> Option<FailureReason> {
		self.failure.as_ref().map(|f| f.reason)
	}

	pub fn with_warnings(mut self, warnings: Vec<ExportWarning>) -> Self {
		self.warnings = warnings;
		self
	}

	pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
		self.artifacts.extend(artifacts);
		self
	}

	pub fn with_raw_payload_path(mut self, path: Option<PathBuf>) -> Self {
		self.raw_payload_path = path;
		self
	}
}
