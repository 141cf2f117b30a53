//! Date range requested for an export.

use chrono::{Local, NaiveDate};

use crate::error::{Error, Result};

const ACCEPTED_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Inclusive calendar-date range. `start <= end` is left to the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportRequest {
	pub start: NaiveDate,
	pub end: NaiveDate,
}

impl ExportRequest {
	pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
		Self { start, end }
	}

	/// Parses optional caller input; a missing date means today (local time).
	pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
		Self::parse_with_today(start, end, Local::now().date_naive())
	}

	pub fn parse_with_today(start: Option<&str>, end: Option<&str>, today: NaiveDate) -> Result<Self> {
		let start = match start {
			Some(s) => parse_date(s)?,
			None => today,
		};
		let end = match end {
			Some(s) => parse_date(s)?,
			None => today,
		};
		Ok(Self { start, end })
	}

	/// `YYYYMMDD`.
	pub fn start_compact(&self) -> String {
		self.start.format("%Y%m%d").to_string()
	}

	/// `YYYYMMDD`.
	pub fn end_compact(&self) -> String {
		self.end.format("%Y%m%d").to_string()
	}

	/// Both dates rendered with a chrono format string, for typing into the widget.
	pub fn formatted(&self, format: &str) -> (String, String) {
		(self.start.format(format).to_string(), self.end.format(format).to_string())
	}
}

impl std::fmt::Display for ExportRequest {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}..{}", self.start_compact(), self.end_compact())
	}
}

/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY.MM.DD` and `YYYYMMDD`.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
	let trimmed = input.trim();
	let invalid = || Error::InvalidDate { input: input.to_string() };

	if trimmed.len() == 8 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
		return NaiveDate::parse_from_str(trimmed, "%Y%m%d").map_err(|_| invalid());
	}
	// chrono accepts unpadded fields; require the canonical 10-char shape.
	if trimmed.len() != 10 {
		return Err(invalid());
	}
	ACCEPTED_FORMATS
		.iter()
		.find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
		.ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn date(y: i32, m: u32, d: u32) -> NaiveDate {
		NaiveDate::from_ymd_opt(y, m, d).unwrap()
	}

	#[test]
	fn same_day_range_normalizes_to_compact_form() {
		let request = ExportRequest::parse(Some("2025-06-01"), Some("2025-06-01")).unwrap();
		assert_eq!(request.start_compact(), "20250601");
		assert_eq!(request.end_compact(), "20250601");
	}

	#[test]
	fn accepts_all_separator_styles() {
		for input in ["2025-06-01", "2025/06/01", "2025.06.01", "20250601", " 2025-06-01 "] {
			assert_eq!(parse_date(input).unwrap(), date(2025, 6, 1), "{input}");
		}
	}

	#[test]
	fn rejects_malformed_and_impossible_dates() {
		for input in ["2025-02-30", "2025-13-01", "2025-6-1", "06/01/2025", "", "yesterday", "2025060"] {
			assert!(matches!(parse_date(input), Err(Error::InvalidDate { .. })), "{input}");
		}
	}

	#[test]
	fn missing_dates_default_to_today() {
		let today = date(2025, 7, 4);
		let request = ExportRequest::parse_with_today(None, Some("2025-07-10"), today).unwrap();
		assert_eq!(request.start, today);
		assert_eq!(request.end, date(2025, 7, 10));

		let request = ExportRequest::parse_with_today(None, None, today).unwrap();
		assert_eq!(request.to_string(), "20250704..20250704");
	}

	#[test]
	fn start_after_end_is_not_rejected() {
		let request = ExportRequest::parse(Some("2025-06-30"), Some("2025-06-01")).unwrap();
		assert!(request.start > request.end);
	}

	#[test]
	fn formatted_uses_widget_format() {
		let request = ExportRequest::new(date(2025, 6, 1), date(2025, 6, 30));
		assert_eq!(request.formatted("%Y/%m/%d"), ("2025/06/01".to_string(), "2025/06/30".to_string()));
	}

	#[test]
	fn default_widget_format_is_compact() {
		let request = ExportRequest::new(date(2025, 6, 1), date(2025, 6, 1));
		let (start, end) = request.formatted(&crate::config::ExportConfig::default().date_format);
		assert_eq!(start, "20250601");
		assert_eq!(end, "20250601");
		assert_eq!((start, end), (request.start_compact(), request.end_compact()));
	}
}
