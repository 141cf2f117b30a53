//! CSV export parsing.
//!
//! The export is a small comma-separated table with a header row. Columns are
//! mapped by position through [`RecordSchema`]; the header is validated once
//! up front so a reshuffled export fails loudly instead of being misread.

use taskex_protocol::{TaskRecord, TaskStatus, TaskSummary};
use tracing::debug;

use crate::error::{Error, Result};

/// Positional columns of the export.
pub const COLUMNS: [&str; 7] = [
	"id",
	"title",
	"start_time",
	"end_time",
	"estimated_duration",
	"actual_duration",
	"category",
];

/// Leading columns every export must carry.
const REQUIRED: usize = 2;

/// Header names accepted per column when validating strictly (normalized form).
const ALIASES: [&[&str]; 7] = [
	&["id", "task id", "taskid", "no", "number", "#"],
	&["title", "task", "name", "task name", "subject"],
	&["start time", "start", "started", "started at", "begin"],
	&["end time", "end", "finished", "finished at", "completed at"],
	&["estimated duration", "estimate", "estimated", "planned duration", "estimated minutes"],
	&["actual duration", "duration", "actual", "time spent", "spent", "actual minutes"],
	&["category", "type", "tag", "project"],
];

/// Fixed column layout, validated once per payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSchema {
	/// Also check header names against known aliases.
	pub strict: bool,
}

impl RecordSchema {
	pub fn strict() -> Self {
		Self { strict: true }
	}

	pub fn validate_header(&self, header: &[String]) -> Result<()> {
		if header.len() < REQUIRED {
			return Err(Error::SchemaMismatch {
				expected: REQUIRED,
				found: header.len(),
				columns: COLUMNS[..REQUIRED].join(", "),
			});
		}
		if self.strict {
			for (index, name) in header.iter().enumerate().take(COLUMNS.len()) {
				let normalized = normalize_header(name);
				if !ALIASES[index].contains(&normalized.as_str()) {
					return Err(Error::HeaderMismatch {
						index,
						expected: COLUMNS[index],
						found: name.clone(),
					});
				}
			}
		}
		Ok(())
	}

	/// Builds a record from one row; `None` when the title is empty.
	pub fn map_row(&self, row: &[String]) -> Option<TaskRecord> {
		let field = |i: usize| row.get(i).map(|s| s.trim()).filter(|s| !s.is_empty());

		let title = field(1)?.to_string();
		let start_time = field(2).map(str::to_string);
		let end_time = field(3).map(str::to_string);
		Some(TaskRecord {
			id: field(0).unwrap_or_default().to_string(),
			title,
			status: TaskStatus::infer(start_time.as_deref(), end_time.as_deref()),
			start_time,
			end_time,
			estimated_duration: field(4).and_then(parse_duration),
			actual_duration: field(5).and_then(parse_duration),
			category: field(6).map(str::to_string),
		})
	}
}

fn normalize_header(name: &str) -> String {
	name.trim()
		.to_lowercase()
		.replace(['_', '-'], " ")
		.split_whitespace()
		.collect::<Vec<_>>()
		.join(" ")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvRecordParser {
	schema: RecordSchema,
}

impl CsvRecordParser {
	pub fn new(schema: RecordSchema) -> Self {
		Self { schema }
	}

	/// Parses an export into records in source row order. Pure.
	pub fn parse(&self, raw: &str) -> Result<Vec<TaskRecord>> {
		let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
		let mut rows = split_rows(text).into_iter().filter(|row| !is_blank(row));

		let header = rows.next().ok_or(Error::EmptyPayload)?;
		self.schema.validate_header(&header)?;

		let mut total = 0;
		let records: Vec<TaskRecord> = rows
			.inspect(|_| total += 1)
			.filter_map(|row| self.schema.map_row(&row))
			.collect();
		debug!(
			target = "taskex",
			rows = total,
			records = records.len(),
			dropped = total - records.len(),
			"parsed export"
		);
		Ok(records)
	}
}

/// Reduces records to per-status counts and total actual minutes.
pub fn summarize(records: &[TaskRecord]) -> TaskSummary {
	records.iter().fold(TaskSummary::default(), |mut summary, record| {
		summary.add(record);
		summary
	})
}

fn is_blank(row: &[String]) -> bool {
	row.iter().all(|f| f.trim().is_empty())
}

/// Splits text into rows of fields, honoring double-quoted fields that contain
/// commas, line breaks or doubled quotes.
fn split_rows(text: &str) -> Vec<Vec<String>> {
	let mut rows = Vec::new();
	let mut row = Vec::new();
	let mut field = String::new();
	let mut in_quotes = false;
	let mut chars = text.chars().peekable();

	while let Some(c) = chars.next() {
		match (c, in_quotes) {
			('"', true) => {
				if chars.peek() == Some(&'"') {
					chars.next();
					field.push('"');
				} else {
					in_quotes = false;
				}
			}
			('"', false) if field.is_empty() => in_quotes = true,
			(',', false) => row.push(std::mem::take(&mut field)),
			('\r', false) => {
				if chars.peek() == Some(&'\n') {
					chars.next();
				}
				row.push(std::mem::take(&mut field));
				rows.push(std::mem::take(&mut row));
			}
			('\n', false) => {
				row.push(std::mem::take(&mut field));
				rows.push(std::mem::take(&mut row));
			}
			_ => field.push(c),
		}
	}
	if !field.is_empty() || !row.is_empty() {
		row.push(field);
		rows.push(row);
	}
	rows
}

/// Whole minutes from `90`, `1:30`, `1h30m`, `2h`, `45m` or `45 min`.
pub fn parse_duration(input: &str) -> Option<u32> {
	let s: String = input.trim().to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
	if s.is_empty() {
		return None;
	}
	if s.bytes().all(|b| b.is_ascii_digit()) {
		return s.parse().ok();
	}
	if let Some((h, m)) = s.split_once(':') {
		let hours: u32 = h.parse().ok()?;
		let minutes: u32 = m.parse().ok()?;
		if minutes >= 60 {
			return None;
		}
		return hours.checked_mul(60)?.checked_add(minutes);
	}

	let mut total = 0u32;
	let mut rest = s.as_str();
	let mut matched = false;
	if let Some((h, tail)) = rest.split_once('h') {
		total += h.parse::<u32>().ok()?.checked_mul(60)?;
		rest = tail;
		matched = true;
	}
	let rest = rest.strip_suffix("min").or_else(|| rest.strip_suffix('m')).map(|m| (m, true)).unwrap_or((rest, false));
	match rest {
		("", _) if matched => Some(total),
		(m, true) => total.checked_add(m.parse().ok()?),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const EXPORT: &str = "id,title,start_time,end_time,estimated_duration,actual_duration,category\n\
		1,Write report,2025-06-01 09:00,2025-06-01 10:30,60,90,docs\n\
		2,Review PR,2025-06-01 11:00,,30,,code\n\
		3,Plan sprint,,,45,,\n";

	fn parser() -> CsvRecordParser {
		CsvRecordParser::default()
	}

	#[test]
	fn bom_is_stripped_and_header_skipped() {
		let records = parser().parse("\u{feff}a,b\n1,x").unwrap();
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].id, "1");
		assert_eq!(records[0].title, "x");
		assert_eq!(records[0].status, TaskStatus::Pending);
	}

	#[test]
	fn maps_columns_and_infers_status() {
		let records = parser().parse(EXPORT).unwrap();
		assert_eq!(records.len(), 3);

		assert_eq!(records[0].status, TaskStatus::Completed);
		assert_eq!(records[0].actual_duration, Some(90));
		assert_eq!(records[0].category.as_deref(), Some("docs"));

		assert_eq!(records[1].status, TaskStatus::InProgress);
		assert_eq!(records[1].end_time, None);
		assert_eq!(records[2].status, TaskStatus::Pending);
		assert_eq!(records[2].category, None);
	}

	#[test]
	fn parse_is_idempotent() {
		assert_eq!(parser().parse(EXPORT).unwrap(), parser().parse(EXPORT).unwrap());
	}

	#[test]
	fn summary_total_matches_record_count() {
		let records = parser().parse(EXPORT).unwrap();
		let summary = summarize(&records);
		assert_eq!(summary.total, records.len());
		assert_eq!(summary.completed, 1);
		assert_eq!(summary.in_progress, 1);
		assert_eq!(summary.pending, 1);
		assert_eq!(summary.total_duration_minutes, 90);
	}

	#[test]
	fn empty_title_row_is_dropped() {
		let raw = "id,title\n1,first\n2,\n3,third\n";
		let records = parser().parse(raw).unwrap();
		assert_eq!(records.len(), 2);
		assert_eq!(records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["1", "3"]);

		let raw = "id,title\n1,first\n2,   \n";
		assert_eq!(parser().parse(raw).unwrap().len(), 1);
	}

	#[test]
	fn quoted_fields_keep_commas_quotes_and_newlines() {
		let raw = "id,title,start_time,end_time,estimated_duration,actual_duration,category\r\n\
			7,\"Fix \"\"login\"\", again\",,,,,\"ops,infra\"\r\n\
			8,\"multi\nline\",,,,,\r\n";
		let records = parser().parse(raw).unwrap();
		assert_eq!(records.len(), 2);
		assert_eq!(records[0].title, "Fix \"login\", again");
		assert_eq!(records[0].category.as_deref(), Some("ops,infra"));
		assert_eq!(records[1].title, "multi\nline");
	}

	#[test]
	fn oversized_duration_is_dropped_not_fatal() {
		let raw = "id,title,start_time,end_time,estimated_duration,actual_duration,category\n\
			1,Huge,,,99999999:00,99999999:00,\n";
		let records = parser().parse(raw).unwrap();
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].estimated_duration, None);
		assert_eq!(records[0].actual_duration, None);
	}

	#[test]
	fn blank_lines_are_ignored() {
		let raw = "\n\nid,title\n\n1,a\n\n";
		assert_eq!(parser().parse(raw).unwrap().len(), 1);
	}

	#[test]
	fn empty_payload_fails() {
		assert!(matches!(parser().parse(""), Err(Error::EmptyPayload)));
		assert!(matches!(parser().parse("\u{feff}\n  \n"), Err(Error::EmptyPayload)));
	}

	#[test]
	fn header_only_yields_no_records() {
		assert!(parser().parse("id,title\n").unwrap().is_empty());
	}

	#[test]
	fn too_few_columns_is_schema_mismatch() {
		let err = parser().parse("<html><body>Session expired</body></html>\n").unwrap_err();
		assert!(matches!(err, Error::SchemaMismatch { expected: 2, found: 1, .. }));
	}

	#[test]
	fn strict_schema_checks_header_names() {
		let strict = CsvRecordParser::new(RecordSchema::strict());
		assert!(strict.parse("ID,Task Name,Start-Time,Finished,Estimate,Time Spent,Project\n1,a,,,,,\n").is_ok());

		let err = strict.parse("title,id\na,1\n").unwrap_err();
		assert!(matches!(err, Error::HeaderMismatch { index: 0, expected: "id", .. }));
		assert!(parser().parse("title,id\na,1\n").is_ok());
	}

	#[test]
	fn duration_forms() {
		assert_eq!(parse_duration("90"), Some(90));
		assert_eq!(parse_duration("1:30"), Some(90));
		assert_eq!(parse_duration("1h30m"), Some(90));
		assert_eq!(parse_duration("1h 30m"), Some(90));
		assert_eq!(parse_duration("2h"), Some(120));
		assert_eq!(parse_duration("45m"), Some(45));
		assert_eq!(parse_duration("45 min"), Some(45));
		assert_eq!(parse_duration("1:75"), None);
		assert_eq!(parse_duration("99999999:00"), None);
		assert_eq!(parse_duration("99999999h"), None);
		assert_eq!(parse_duration("soon"), None);
		assert_eq!(parse_duration(""), None);
	}
}
