//! Task records parsed from an export and their summary.

use serde::{Deserialize, Serialize};

/// Lifecycle state inferred from which timestamps a row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
	Pending,
	InProgress,
	Completed,
}

impl TaskStatus {
	/// End timestamp wins; a start timestamp alone means the task is running.
	pub fn infer(start_time: Option<&str>, end_time: Option<&str>) -> Self {
		match (start_time, end_time) {
			(_, Some(_)) => TaskStatus::Completed,
			(Some(_), None) => TaskStatus::InProgress,
			(None, None) => TaskStatus::Pending,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			TaskStatus::Pending => "pending",
			TaskStatus::InProgress => "in_progress",
			TaskStatus::Completed => "completed",
		}
	}
}

impl std::fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One exported task row.
///
/// Timestamps are kept as the remote system rendered them; durations are whole minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
	pub id: String,
	pub title: String,
	pub status: TaskStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub start_time: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub end_time: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub estimated_duration: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub actual_duration: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub category: Option<String>,
}

/// Counts per status plus total actual duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
	pub total: usize,
	pub completed: usize,
	pub in_progress: usize,
	pub pending: usize,
	pub total_duration_minutes: u64,
}

impl TaskSummary {
	/// Folds one record into the running totals.
	pub fn add(&mut self, record: &TaskRecord) {
		self.total += 1;
		match record.status {
			TaskStatus::Completed => self.completed += 1,
			TaskStatus::InProgress => self.in_progress += 1,
			TaskStatus::Pending => self.pending += 1,
		}
		self.total_duration_minutes += u64::from(record.actual_duration.unwrap_or(0));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_inference_prefers_end_timestamp() {
		assert_eq!(TaskStatus::infer(Some("09:00"), Some("10:00")), TaskStatus::Completed);
		assert_eq!(TaskStatus::infer(None, Some("10:00")), TaskStatus::Completed);
		assert_eq!(TaskStatus::infer(Some("09:00"), None), TaskStatus::InProgress);
		assert_eq!(TaskStatus::infer(None, None), TaskStatus::Pending);
	}

	#[test]
	fn status_serializes_snake_case() {
		assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"in_progress\"");
		assert_eq!(TaskStatus::Completed.to_string(), "completed");
	}

	#[test]
	fn summary_add_counts_missing_duration_as_zero() {
		let mut summary = TaskSummary::default();
		let mut record = TaskRecord {
			id: "1".into(),
			title: "write report".into(),
			status: TaskStatus::Completed,
			start_time: Some("09:00".into()),
			end_time: Some("10:30".into()),
			estimated_duration: Some(60),
			actual_duration: Some(90),
			category: None,
		};
		summary.add(&record);

		record.status = TaskStatus::Pending;
		record.actual_duration = None;
		summary.add(&record);

		assert_eq!(summary.total, 2);
		assert_eq!(summary.completed, 1);
		assert_eq!(summary.pending, 1);
		assert_eq!(summary.total_duration_minutes, 90);
	}
}
