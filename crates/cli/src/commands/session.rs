use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::Serialize;
use taskex::{ExportConfig, SessionStore};
use tracing::info;

use crate::error::Result;
use crate::output::{self, OutputFormat, ResultBuilder};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
	pub session_file: PathBuf,
	pub exists: bool,
	pub valid: bool,
	pub ttl_secs: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub saved_at: Option<DateTime<Local>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<DateTime<Local>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cookies: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCleared {
	pub session_file: PathBuf,
	pub removed: bool,
}

pub fn inspect(store: &SessionStore, now: SystemTime) -> SessionStatus {
	let saved_at = store.created_at();
	let record = store.load_at(now);
	SessionStatus {
		session_file: store.path().to_path_buf(),
		exists: saved_at.is_some(),
		valid: record.is_some(),
		ttl_secs: store.ttl().as_secs(),
		saved_at: saved_at.map(DateTime::from),
		expires_at: saved_at.map(|t| DateTime::from(t + store.ttl())),
		cookies: record.map(|r| r.snapshot.cookies.len()),
	}
}

pub fn status(config: &ExportConfig, format: OutputFormat) -> Result<()> {
	let store = SessionStore::from_config(config);
	let result = ResultBuilder::new("session.status").data(inspect(&store, SystemTime::now())).build();
	output::print_result(&result, format);
	Ok(())
}

pub fn clear(config: &ExportConfig, format: OutputFormat) -> Result<()> {
	let store = SessionStore::from_config(config);
	let existed = store.path().exists();
	store.clear()?;
	info!(target = "taskex.cli", path = %store.path().display(), removed = existed, "session cleared");

	let result = ResultBuilder::new("session.clear")
		.data(SessionCleared {
			session_file: store.path().to_path_buf(),
			removed: existed,
		})
		.build();
	output::print_result(&result, format);
	Ok(())
}
