use std::path::PathBuf;

use taskex_protocol::ArtifactType;

use super::*;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Sample {
	records: usize,
}

#[test]
fn result_builder_success() {
	let result: CommandResult<Sample> = ResultBuilder::new("export").data(Sample { records: 3 }).build();

	assert!(result.ok);
	assert_eq!(result.command, "export");
	assert!(result.data.is_some());
	assert!(result.error.is_none());
	assert_eq!(result.schema_version, Some(SCHEMA_VERSION));
}

#[test]
fn result_builder_error() {
	let result: CommandResult<Sample> = ResultBuilder::new("export").error(ErrorCode::CaptureTimeout, "nothing captured").build();

	assert!(!result.ok);
	assert!(result.data.is_none());
	assert_eq!(result.error.as_ref().unwrap().code, ErrorCode::CaptureTimeout);
}

#[test]
fn error_code_display() {
	assert_eq!(ErrorCode::SessionInvalid.to_string(), "SESSION_INVALID");
	assert_eq!(ErrorCode::ExportControlUnavailable.to_string(), "EXPORT_CONTROL_UNAVAILABLE");
}

#[test]
fn error_code_serializes_like_display() {
	let json = serde_json::to_string(&ErrorCode::ParseFailure).unwrap();
	assert_eq!(json, format!("\"{}\"", ErrorCode::ParseFailure));
}

#[test]
fn failure_reasons_map_to_codes() {
	assert_eq!(ErrorCode::from(FailureReason::SessionInvalid), ErrorCode::SessionInvalid);
	assert_eq!(ErrorCode::from(FailureReason::NavigationFailed), ErrorCode::NavigationFailed);
	assert_eq!(ErrorCode::from(FailureReason::CaptureTimeout), ErrorCode::CaptureTimeout);
	assert_eq!(ErrorCode::from(FailureReason::ParseFailure), ErrorCode::ParseFailure);
}

#[test]
fn output_format_parse() {
	assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
	assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
	assert!("yaml".parse::<OutputFormat>().is_err());
}

#[test]
fn serialize_envelope_with_artifacts() {
	let result: CommandResult<Sample> = ResultBuilder::new("export")
		.data(Sample { records: 2 })
		.artifacts(vec![Artifact {
			artifact_type: ArtifactType::Payload,
			path: PathBuf::from("exports/export-20250601-101500.csv"),
			size_bytes: Some(42),
		}])
		.diagnostic_with_source(DiagnosticLevel::Warning, "start date not verified", "date-input")
		.build();

	let json = serde_json::to_value(&result).unwrap();
	assert_eq!(json["ok"], true);
	assert_eq!(json["schemaVersion"], 1);
	assert_eq!(json["data"]["records"], 2);
	assert_eq!(json["artifacts"][0]["type"], "payload");
	assert_eq!(json["diagnostics"][0]["source"], "date-input");
	assert!(json["timings"]["durationMs"].is_u64());
	assert!(json.get("error").is_none());
}
