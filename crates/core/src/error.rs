use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("driver error: {0}")]
	Driver(String),

	#[error("element not found: {selector}")]
	ElementNotFound { selector: String },

	#[error("timeout after {ms}ms waiting for: {condition}")]
	Timeout { ms: u64, condition: String },

	#[error("navigation failed: {url}: {message}")]
	Navigation { url: String, message: String },

	#[error("invalid date '{input}': expected YYYY-MM-DD, YYYY/MM/DD or YYYYMMDD")]
	InvalidDate { input: String },

	#[error("schema mismatch: expected at least {expected} columns ({columns}), found {found}")]
	SchemaMismatch { expected: usize, found: usize, columns: String },

	#[error("unexpected header column {index}: expected {expected}, found '{found}'")]
	HeaderMismatch { index: usize, expected: &'static str, found: String },

	#[error("export payload is empty")]
	EmptyPayload,

	#[error("config error in {path}: {message}")]
	Config { path: PathBuf, message: String },

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[cfg(feature = "chromium")]
	#[error(transparent)]
	Browser(#[from] chromiumoxide::error::CdpError),
}

impl Error {
	pub fn timeout(duration: std::time::Duration, condition: impl Into<String>) -> Self {
		Error::Timeout {
			ms: duration.as_millis() as u64,
			condition: condition.into(),
		}
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout { .. })
	}
}
