//! Browser capability consumed by the pipeline.
//!
//! Elements are addressed by CSS selector on every call (locator style), so no
//! handle outlives a re-render of the page.

#[cfg(feature = "chromium")]
pub mod chromium;

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_json::Value;
use taskex_protocol::StorageSnapshot;

use crate::config::CaptureSettings;
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickOptions {
	/// Skip actionability checks and dispatch the click regardless of overlays.
	pub force: bool,
}

impl ClickOptions {
	pub fn forced() -> Self {
		Self { force: true }
	}
}

/// Predicate over observed network responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseFilter {
	pub url_patterns: Vec<String>,
	pub content_types: Vec<String>,
}

impl ResponseFilter {
	pub fn from_settings(settings: &CaptureSettings) -> Self {
		Self {
			url_patterns: settings.url_patterns.iter().map(|p| p.to_ascii_lowercase()).collect(),
			content_types: settings.content_types.iter().map(|c| c.to_ascii_lowercase()).collect(),
		}
	}

	/// Matches an export-like URL or a CSV content type.
	pub fn matches(&self, url: &str, content_type: Option<&str>) -> bool {
		let url = url.to_ascii_lowercase();
		if self.url_patterns.iter().any(|p| url.contains(p.as_str())) {
			return true;
		}
		match content_type {
			Some(ct) => {
				let ct = ct.to_ascii_lowercase();
				self.content_types.iter().any(|c| ct.contains(c.as_str()))
			}
			None => false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
	pub url: String,
	pub status: u16,
	pub content_type: Option<String>,
	pub body: Vec<u8>,
}

/// A download the browser reported as complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
	pub path: PathBuf,
	pub suggested_filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
	pub path: PathBuf,
	pub modified: SystemTime,
	pub len: u64,
}

/// Armed observer: resolves once with the first matching event.
pub type Watcher<T> = BoxFuture<'static, Result<T>>;

/// Armed observer yielding every matching event in arrival order.
pub type EventStream<T> = BoxStream<'static, Result<T>>;

/// Everything the pipeline needs from a browser.
///
/// `watch_*` methods arm an observer and return immediately; the returned
/// future is independent of `&self` so it can be spawned and left running.
#[async_trait]
pub trait CapabilityDriver: Send + Sync {
	async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

	async fn current_url(&self) -> Result<String>;

	/// Waits until at least one element matches.
	async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

	/// Waits until no element matches.
	async fn wait_for_absence(&self, selector: &str, timeout: Duration) -> Result<()>;

	async fn count(&self, selector: &str) -> Result<usize>;

	/// Native value assignment, bypassing keyboard emulation.
	async fn set_value(&self, selector: &str, value: &str) -> Result<()>;

	async fn focus(&self, selector: &str) -> Result<()>;

	async fn select_all(&self, selector: &str) -> Result<()>;

	async fn clear(&self, selector: &str) -> Result<()>;

	/// Types into the element with keyboard emulation.
	async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

	/// Presses a key on the focused element (or the page).
	async fn press_key(&self, key: &str) -> Result<()>;

	async fn read_value(&self, selector: &str) -> Result<String>;

	async fn click(&self, selector: &str, options: ClickOptions) -> Result<()>;

	/// Visible, enabled and not covered by another element.
	async fn is_actionable(&self, selector: &str) -> Result<bool>;

	/// Calls `script` (a function declaration) with `args` and returns its JSON result.
	async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value>;

	/// Streams every response that matches `filter`, body included. A response
	/// whose body cannot be read is yielded as an error and the stream goes on.
	async fn watch_responses(&self, filter: ResponseFilter) -> Result<EventStream<CapturedResponse>>;

	/// Routes downloads into `dir` and watches for the first completed one.
	async fn watch_downloads(&self, dir: &Path) -> Result<Watcher<DownloadedFile>>;

	async fn list_directory(&self, dir: &Path) -> Result<Vec<DirEntryInfo>> {
		list_directory(dir).await
	}

	/// Full-page PNG.
	async fn screenshot(&self) -> Result<Vec<u8>>;

	async fn page_html(&self) -> Result<String>;

	async fn storage_snapshot(&self) -> Result<StorageSnapshot>;

	async fn restore_snapshot(&self, snapshot: &StorageSnapshot) -> Result<()>;

	async fn close(&self) -> Result<()>;
}

/// Regular files directly under `dir`. A missing directory lists as empty.
pub async fn list_directory(dir: &Path) -> Result<Vec<DirEntryInfo>> {
	let mut entries = Vec::new();
	let mut read_dir = match tokio::fs::read_dir(dir).await {
		Ok(rd) => rd,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
		Err(e) => return Err(e.into()),
	};
	while let Some(entry) = read_dir.next_entry().await? {
		let meta = entry.metadata().await?;
		if !meta.is_file() {
			continue;
		}
		entries.push(DirEntryInfo {
			path: entry.path(),
			modified: meta.modified()?,
			len: meta.len(),
		});
	}
	entries.sort_by_key(|e| e.modified);
	Ok(entries)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn filter_matches_url_or_content_type() {
		let filter = ResponseFilter::from_settings(&CaptureSettings::default());
		assert!(filter.matches("https://app.example.com/api/Tasks/Export?from=1", None));
		assert!(filter.matches("https://app.example.com/api/blob/42", Some("text/csv; charset=utf-8")));
		assert!(!filter.matches("https://app.example.com/api/tasks", Some("application/json")));
		assert!(!filter.matches("https://app.example.com/api/tasks", None));
	}

	#[tokio::test]
	async fn list_directory_skips_subdirectories() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("a.csv"), "id,title\n").unwrap();
		std::fs::create_dir(dir.path().join("nested")).unwrap();

		let entries = list_directory(dir.path()).await.unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].path.file_name().unwrap(), "a.csv");
		assert_eq!(entries[0].len, 9);
	}

	#[tokio::test]
	async fn list_directory_missing_is_empty() {
		let dir = tempfile::tempdir().unwrap();
		let entries = list_directory(&dir.path().join("missing")).await.unwrap();
		assert!(entries.is_empty());
	}
}
