//! Pipeline configuration.
//!
//! Everything the pipeline needs is carried by one [`ExportConfig`] value, built
//! once (JSON file + caller overrides) and handed to each component constructor.
//! Every field has a default so a partial file is enough:
//!
//! ```json
//! {
//!   "baseUrl": "https://tasks.example.com",
//!   "exportPath": "/reports/tasks",
//!   "selectors": { "exportButton": "button.export-csv" },
//!   "timeouts": { "captureMs": 45000 }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
	/// Origin of the remote application.
	pub base_url: String,
	/// Path of the interactive login page, relative to `base_url`.
	pub login_path: String,
	/// Path of the page hosting the date-range form and export control.
	pub export_path: String,
	/// Where the authenticated storage snapshot lives.
	pub session_file: PathBuf,
	/// Snapshot lifetime in seconds.
	pub session_ttl_secs: u64,
	/// Directory the browser saves downloads into (also scanned by the poll channel).
	pub download_dir: PathBuf,
	/// Directory raw exports are persisted to.
	pub output_dir: PathBuf,
	/// Directory for failure screenshots and HTML.
	pub artifacts_dir: PathBuf,
	pub headless: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub chrome_executable: Option<PathBuf>,
	/// Require header names to match the record schema, not just the column count.
	pub strict_header: bool,
	/// chrono format used when writing dates into the range widget. Defaults to `YYYYMMDD`.
	pub date_format: String,
	pub selectors: Selectors,
	pub timeouts: Timeouts,
	pub capture: CaptureSettings,
}

impl Default for ExportConfig {
	fn default() -> Self {
		Self {
			base_url: "http://localhost:8080".to_string(),
			login_path: "/login".to_string(),
			export_path: "/tasks".to_string(),
			session_file: PathBuf::from(".taskex/session.json"),
			session_ttl_secs: 24 * 60 * 60,
			download_dir: PathBuf::from(".taskex/downloads"),
			output_dir: PathBuf::from("exports"),
			artifacts_dir: PathBuf::from(".taskex/artifacts"),
			headless: true,
			chrome_executable: None,
			strict_header: false,
			date_format: "%Y%m%d".to_string(),
			selectors: Selectors::default(),
			timeouts: Timeouts::default(),
			capture: CaptureSettings::default(),
		}
	}
}

/// CSS selectors for the handful of elements the pipeline touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Selectors {
	pub start_date: String,
	pub end_date: String,
	pub export_button: String,
	/// Transient placeholders (spinners, skeletons) shown while the SPA renders.
	pub loading_markers: Vec<String>,
	/// Popovers that can sit on top of the export control (e.g. an open date picker).
	pub overlays: Vec<String>,
	/// Element only present on the login page; seeing it means the session was rejected.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub login_marker: Option<String>,
}

impl Default for Selectors {
	fn default() -> Self {
		Self {
			start_date: "input[placeholder='Start date']".to_string(),
			end_date: "input[placeholder='End date']".to_string(),
			export_button: "button.export".to_string(),
			loading_markers: vec![".loading".to_string(), ".el-loading-mask".to_string(), ".skeleton".to_string()],
			overlays: vec![".el-picker-panel".to_string(), ".el-popover".to_string()],
			login_marker: Some("input[type='password']".to_string()),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeouts {
	pub navigation_ms: u64,
	pub element_ms: u64,
	/// Shared budget for all loading markers to disappear.
	pub loading_ms: u64,
	/// Fixed delay after markers clear, absorbing late client-side re-renders.
	pub settle_ms: u64,
	/// Pause between writing a date field and reading it back.
	pub verify_ms: u64,
	pub export_ready_ms: u64,
	/// Per-channel capture budget.
	pub capture_ms: u64,
	pub poll_interval_ms: u64,
}

impl Default for Timeouts {
	fn default() -> Self {
		Self {
			navigation_ms: 30_000,
			element_ms: 10_000,
			loading_ms: 15_000,
			settle_ms: 1_500,
			verify_ms: 100,
			export_ready_ms: 10_000,
			capture_ms: 30_000,
			poll_interval_ms: 500,
		}
	}
}

impl Timeouts {
	pub fn navigation(&self) -> Duration {
		Duration::from_millis(self.navigation_ms)
	}

	pub fn element(&self) -> Duration {
		Duration::from_millis(self.element_ms)
	}

	pub fn loading(&self) -> Duration {
		Duration::from_millis(self.loading_ms)
	}

	pub fn settle(&self) -> Duration {
		Duration::from_millis(self.settle_ms)
	}

	pub fn verify(&self) -> Duration {
		Duration::from_millis(self.verify_ms)
	}

	pub fn export_ready(&self) -> Duration {
		Duration::from_millis(self.export_ready_ms)
	}

	pub fn capture(&self) -> Duration {
		Duration::from_millis(self.capture_ms)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms.max(10))
	}
}

/// Which capture channels run and what they match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
	pub network: bool,
	pub download: bool,
	pub directory_poll: bool,
	/// Case-insensitive substrings of export-like response URLs.
	pub url_patterns: Vec<String>,
	/// Case-insensitive content-type substrings treated as CSV.
	pub content_types: Vec<String>,
}

impl Default for CaptureSettings {
	fn default() -> Self {
		Self {
			network: true,
			download: true,
			directory_poll: true,
			url_patterns: vec!["export".to_string(), "download".to_string(), ".csv".to_string()],
			content_types: vec!["text/csv".to_string(), "application/csv".to_string(), "application/vnd.ms-excel".to_string()],
		}
	}
}

impl ExportConfig {
	/// Loads a config file; missing keys fall back to defaults.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
			path: path.to_path_buf(),
			message: e.to_string(),
		})?;
		let config: Self = serde_json::from_str(&content).map_err(|e| Error::Config {
			path: path.to_path_buf(),
			message: e.to_string(),
		})?;
		config.validate().map_err(|message| Error::Config {
			path: path.to_path_buf(),
			message,
		})?;
		Ok(config)
	}

	/// Loads `path` when it exists, otherwise returns defaults.
	pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
		match path {
			Some(p) if p.exists() => Self::load(p),
			_ => Ok(Self::default()),
		}
	}

	pub fn validate(&self) -> std::result::Result<(), String> {
		if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
			return Err(format!("baseUrl must be an http(s) URL, got '{}'", self.base_url));
		}
		if self.session_ttl_secs == 0 {
			return Err("sessionTtlSecs must be greater than zero".to_string());
		}
		if !(self.capture.network || self.capture.download || self.capture.directory_poll) {
			return Err("at least one capture channel must be enabled".to_string());
		}
		Ok(())
	}

	pub fn session_ttl(&self) -> Duration {
		Duration::from_secs(self.session_ttl_secs)
	}

	pub fn export_url(&self) -> String {
		join_url(&self.base_url, &self.export_path)
	}

	pub fn login_url(&self) -> String {
		join_url(&self.base_url, &self.login_path)
	}
}

fn join_url(base: &str, path: &str) -> String {
	if path.starts_with("http://") || path.starts_with("https://") {
		return path.to_string();
	}
	let mut joined = base.trim_end_matches('/').to_string();
	joined.push('/');
	joined.push_str(path.trim_start_matches('/'));
	joined
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_file_falls_back_to_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(
			&path,
			r##"{"baseUrl":"https://tasks.example.com","timeouts":{"captureMs":45000},"selectors":{"exportButton":"#csv"}}"##,
		)
		.unwrap();

		let config = ExportConfig::load(&path).unwrap();
		assert_eq!(config.timeouts.capture(), Duration::from_secs(45));
		assert_eq!(config.timeouts.settle_ms, Timeouts::default().settle_ms);
		assert_eq!(config.selectors.export_button, "#csv");
		assert_eq!(config.selectors.start_date, Selectors::default().start_date);
		assert_eq!(config.session_ttl(), Duration::from_secs(86_400));
		assert_eq!(config.date_format, "%Y%m%d");
	}

	#[test]
	fn invalid_base_url_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{"baseUrl":"tasks.example.com"}"#).unwrap();

		let err = ExportConfig::load(&path).unwrap_err();
		assert!(matches!(err, Error::Config { .. }));
	}

	#[test]
	fn missing_file_uses_defaults() {
		let config = ExportConfig::load_or_default(Some(Path::new("/nonexistent/taskex.json"))).unwrap();
		assert_eq!(config, ExportConfig::default());
	}

	#[test]
	fn urls_join_without_double_slashes() {
		let config = ExportConfig {
			base_url: "https://tasks.example.com/".into(),
			export_path: "/reports/tasks".into(),
			..ExportConfig::default()
		};
		assert_eq!(config.export_url(), "https://tasks.example.com/reports/tasks");
		assert_eq!(config.login_url(), "https://tasks.example.com/login");
	}

	#[test]
	fn all_channels_disabled_is_invalid() {
		let mut config = ExportConfig::default();
		config.capture.network = false;
		config.capture.download = false;
		config.capture.directory_poll = false;
		assert!(config.validate().is_err());
	}
}
