use std::path::PathBuf;

use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	/// The command already printed its own envelope; exit non-zero without more output.
	#[error("")]
	OutputAlreadyPrinted,

	#[error("browser launch failed: {0}")]
	BrowserLaunch(String),

	#[error("no usable session at {path}; run `taskex login` first")]
	SessionInvalid { path: PathBuf },

	#[error("{command}: {source}")]
	Command {
		command: &'static str,
		#[source]
		source: taskex::Error,
	},

	#[error(transparent)]
	Core(#[from] taskex::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl CliError {
	pub fn is_output_already_printed(&self) -> bool {
		matches!(self, CliError::OutputAlreadyPrinted)
	}

	/// Tags a library error with the command it came from.
	pub fn in_command(command: &'static str) -> impl FnOnce(taskex::Error) -> CliError {
		move |source| CliError::Command { command, source }
	}

	pub fn command(&self) -> Option<&'static str> {
		match self {
			CliError::Command { command, .. } => Some(*command),
			CliError::SessionInvalid { .. } => Some("export"),
			_ => None,
		}
	}

	pub fn to_command_error(&self) -> CommandError {
		let (code, message, details) = match self {
			CliError::OutputAlreadyPrinted => (ErrorCode::InternalError, String::new(), None),
			CliError::BrowserLaunch(msg) => (ErrorCode::BrowserLaunchFailed, msg.clone(), None),
			CliError::SessionInvalid { path } => (
				ErrorCode::SessionInvalid,
				self.to_string(),
				Some(serde_json::json!({ "sessionFile": path })),
			),
			CliError::Command { source, .. } | CliError::Core(source) => classify(source),
			CliError::Io(err) => (ErrorCode::IoError, err.to_string(), None),
			CliError::Json(err) => (ErrorCode::InternalError, format!("JSON error: {err}"), None),
		};

		CommandError { code, message, details }
	}
}

fn classify(err: &taskex::Error) -> (ErrorCode, String, Option<serde_json::Value>) {
	use taskex::Error;

	match err {
		Error::InvalidDate { input } => (
			ErrorCode::InvalidInput,
			err.to_string(),
			Some(serde_json::json!({ "input": input })),
		),
		Error::Config { path, .. } => (
			ErrorCode::ConfigError,
			err.to_string(),
			Some(serde_json::json!({ "path": path })),
		),
		Error::SchemaMismatch { .. } | Error::HeaderMismatch { .. } | Error::EmptyPayload => (ErrorCode::ParseFailure, err.to_string(), None),
		Error::Navigation { url, .. } => (
			ErrorCode::NavigationFailed,
			err.to_string(),
			Some(serde_json::json!({ "url": url })),
		),
		Error::Io(_) => (ErrorCode::IoError, err.to_string(), None),
		_ => (ErrorCode::InternalError, err.to_string(), None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalid_date_is_invalid_input() {
		let err = CliError::Core(taskex::Error::InvalidDate { input: "June 1".into() });
		let cmd = err.to_command_error();
		assert_eq!(cmd.code, ErrorCode::InvalidInput);
		assert_eq!(cmd.details.unwrap()["input"], "June 1");
	}

	#[test]
	fn parse_errors_keep_command_name() {
		let err = CliError::in_command("parse")(taskex::Error::EmptyPayload);
		assert_eq!(err.command(), Some("parse"));
		assert_eq!(err.to_command_error().code, ErrorCode::ParseFailure);
	}

	#[test]
	fn missing_session_points_at_login() {
		let err = CliError::SessionInvalid {
			path: PathBuf::from("/tmp/session.json"),
		};
		let cmd = err.to_command_error();
		assert_eq!(cmd.code, ErrorCode::SessionInvalid);
		assert!(cmd.message.contains("taskex login"));
	}
}
