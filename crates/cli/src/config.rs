//! Config file resolution.
//!
//! `--config` wins; otherwise `<config dir>/taskex/config.json` is used when it
//! exists (`$XDG_CONFIG_HOME` on Linux); otherwise built-in defaults.

use std::path::{Path, PathBuf};

use taskex::ExportConfig;
use tracing::debug;

use crate::error::Result;

pub const CONFIG_FILE: &str = "config.json";

/// Default config location, whether or not it exists.
pub fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("taskex").join(CONFIG_FILE))
}

/// Loads the effective config. An explicit path must exist.
pub fn load(explicit: Option<&Path>) -> Result<ExportConfig> {
	load_from(explicit, default_config_path().as_deref())
}

pub fn load_from(explicit: Option<&Path>, fallback: Option<&Path>) -> Result<ExportConfig> {
	if let Some(path) = explicit {
		debug!(target = "taskex.cli", path = %path.display(), "loading config");
		return Ok(ExportConfig::load(path)?);
	}
	if let Some(path) = fallback.filter(|p| p.exists()) {
		debug!(target = "taskex.cli", path = %path.display(), "loading default config");
		return Ok(ExportConfig::load(path)?);
	}
	debug!(target = "taskex.cli", "no config file, using defaults");
	Ok(ExportConfig::default())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::CliError;

	#[test]
	fn explicit_path_must_exist() {
		let dir = tempfile::tempdir().unwrap();
		let err = load_from(Some(&dir.path().join("missing.json")), None).unwrap_err();
		assert!(matches!(err, CliError::Core(taskex::Error::Config { .. })));
	}

	#[test]
	fn missing_fallback_uses_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let config = load_from(None, Some(&dir.path().join("config.json"))).unwrap();
		assert_eq!(config, ExportConfig::default());
	}

	#[test]
	fn fallback_file_is_loaded() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{"baseUrl":"https://tasks.example.com","timeouts":{"captureMs":5000}}"#).unwrap();

		let config = load_from(None, Some(&path)).unwrap();
		assert_eq!(config.base_url, "https://tasks.example.com");
		assert_eq!(config.timeouts.capture_ms, 5000);
		assert_eq!(config.timeouts.element_ms, ExportConfig::default().timeouts.element_ms);
	}

	#[test]
	fn explicit_path_beats_fallback() {
		let dir = tempfile::tempdir().unwrap();
		let explicit = dir.path().join("explicit.json");
		let fallback = dir.path().join("fallback.json");
		std::fs::write(&explicit, r#"{"exportPath":"/reports"}"#).unwrap();
		std::fs::write(&fallback, r#"{"exportPath":"/other"}"#).unwrap();

		let config = load_from(Some(&explicit), Some(&fallback)).unwrap();
		assert_eq!(config.export_path, "/reports");
	}
}
