//! The three capture channels.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use futures::future::BoxFuture;
use tracing::{debug, trace};

use super::{ChannelKind, RawPayload};
use crate::driver::{CapabilityDriver, CapturedResponse, DirEntryInfo, ResponseFilter};
use crate::error::{Error, Result};

/// Extensions browsers use for in-flight downloads.
const PARTIAL_EXTENSIONS: [&str; 3] = ["crdownload", "part", "tmp"];

/// An independent observer of the export's output.
///
/// `arm` registers the observer and must return before the export is
/// triggered; the returned future resolves with the payload.
#[async_trait]
pub trait CaptureChannel: Send + Sync {
	fn kind(&self) -> ChannelKind;

	async fn arm(&self, driver: Arc<dyn CapabilityDriver>, started: SystemTime) -> Result<BoxFuture<'static, Result<RawPayload>>>;
}

/// First network response with an export-like URL or CSV content type whose
/// body is a successful, non-empty table. Rejected responses are skipped and
/// the channel keeps watching.
pub struct NetworkResponseChannel {
	filter: ResponseFilter,
}

impl NetworkResponseChannel {
	pub fn new(filter: ResponseFilter) -> Self {
		Self { filter }
	}
}

#[async_trait]
impl CaptureChannel for NetworkResponseChannel {
	fn kind(&self) -> ChannelKind {
		ChannelKind::NetworkResponse
	}

	async fn arm(&self, driver: Arc<dyn CapabilityDriver>, _started: SystemTime) -> Result<BoxFuture<'static, Result<RawPayload>>> {
		let mut responses = driver.watch_responses(self.filter.clone()).await?;
		Ok(async move {
			let mut rejected = 0usize;
			while let Some(response) = responses.next().await {
				match response.and_then(payload_from_response) {
					Ok(payload) => return Ok(payload),
					Err(e) => {
						rejected += 1;
						debug!(target = "taskex", error = %e, "export response rejected");
					}
				}
			}
			Err(Error::Driver(format!("response stream closed after {rejected} rejected responses")))
		}
		.boxed())
	}
}

fn payload_from_response(response: CapturedResponse) -> Result<RawPayload> {
	if !(200..300).contains(&response.status) {
		return Err(Error::Driver(format!("export response {} returned status {}", response.url, response.status)));
	}
	if response.body.is_empty() {
		return Err(Error::Driver(format!("export response {} has an empty body", response.url)));
	}
	let text = String::from_utf8_lossy(&response.body).into_owned();
	if !looks_tabular(&text) {
		return Err(Error::Driver(format!("export response {} is not tabular", response.url)));
	}
	Ok(RawPayload {
		text,
		channel: ChannelKind::NetworkResponse,
		suggested_filename: filename_from_url(&response.url),
		source_path: None,
	})
}

/// Last path segment when it looks like a file name.
fn filename_from_url(url: &str) -> Option<String> {
	let path = url.split(['?', '#']).next()?;
	let name = path.rsplit('/').next()?;
	name.contains('.').then(|| name.to_string())
}

/// Completed browser download, read back from disk.
pub struct DownloadEventChannel {
	dir: PathBuf,
}

impl DownloadEventChannel {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}
}

#[async_trait]
impl CaptureChannel for DownloadEventChannel {
	fn kind(&self) -> ChannelKind {
		ChannelKind::DownloadEvent
	}

	async fn arm(&self, driver: Arc<dyn CapabilityDriver>, _started: SystemTime) -> Result<BoxFuture<'static, Result<RawPayload>>> {
		let watcher = driver.watch_downloads(&self.dir).await?;
		Ok(async move {
			let download = watcher.await?;
			let bytes = tokio::fs::read(&download.path).await?;
			Ok(RawPayload {
				text: String::from_utf8_lossy(&bytes).into_owned(),
				channel: ChannelKind::DownloadEvent,
				suggested_filename: download.suggested_filename,
				source_path: Some(download.path),
			})
		}
		.boxed())
	}
}

/// Scans the download directory for a finished, comma-delimited file newer
/// than the race start.
pub struct DirectoryPollChannel {
	dir: PathBuf,
	interval: Duration,
}

impl DirectoryPollChannel {
	pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
		Self {
			dir: dir.into(),
			interval,
		}
	}
}

#[async_trait]
impl CaptureChannel for DirectoryPollChannel {
	fn kind(&self) -> ChannelKind {
		ChannelKind::DirectoryPoll
	}

	async fn arm(&self, driver: Arc<dyn CapabilityDriver>, started: SystemTime) -> Result<BoxFuture<'static, Result<RawPayload>>> {
		let dir = self.dir.clone();
		let interval = self.interval;
		Ok(async move {
			// (path, len) pairs already judged non-tabular.
			let mut rejected: HashSet<(PathBuf, u64)> = HashSet::new();
			loop {
				match driver.list_directory(&dir).await {
					Ok(entries) => {
						for entry in entries.iter().filter(|e| is_candidate(e, started)) {
							if rejected.contains(&(entry.path.clone(), entry.len)) {
								continue;
							}
							match read_if_tabular(&entry.path).await {
								Some(text) => {
									return Ok(RawPayload {
										text,
										channel: ChannelKind::DirectoryPoll,
										suggested_filename: entry.path.file_name().map(|n| n.to_string_lossy().into_owned()),
										source_path: Some(entry.path.clone()),
									});
								}
								None => {
									trace!(target = "taskex", path = %entry.path.display(), "not tabular yet");
									rejected.insert((entry.path.clone(), entry.len));
								}
							}
						}
					}
					Err(e) => debug!(target = "taskex", dir = %dir.display(), error = %e, "directory scan failed"),
				}
				tokio::time::sleep(interval).await;
			}
		}
		.boxed())
	}
}

fn is_candidate(entry: &DirEntryInfo, started: SystemTime) -> bool {
	entry.len > 0 && entry.modified >= started && !is_partial(&entry.path)
}

fn is_partial(path: &Path) -> bool {
	path.extension()
		.and_then(|e| e.to_str())
		.is_some_and(|ext| PARTIAL_EXTENSIONS.iter().any(|p| ext.eq_ignore_ascii_case(p)))
}

async fn read_if_tabular(path: &Path) -> Option<String> {
	let bytes = tokio::fs::read(path).await.ok()?;
	let text = String::from_utf8_lossy(&bytes).into_owned();
	looks_tabular(&text).then_some(text)
}

/// The first line carries at least one comma and does not open a JSON or
/// markup document.
pub fn looks_tabular(text: &str) -> bool {
	let text = text.strip_prefix('\u{feff}').unwrap_or(text).trim_start();
	text.lines()
		.next()
		.is_some_and(|line| line.contains(',') && !line.starts_with(['{', '[', '<']))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::MockDriver;

	#[test]
	fn partial_downloads_are_skipped() {
		assert!(is_partial(Path::new("/tmp/export.csv.crdownload")));
		assert!(is_partial(Path::new("/tmp/export.PART")));
		assert!(is_partial(Path::new("/tmp/export.tmp")));
		assert!(!is_partial(Path::new("/tmp/export.csv")));
		assert!(!is_partial(Path::new("/tmp/export")));
	}

	#[test]
	fn tabular_means_comma_on_first_line() {
		assert!(looks_tabular("id,title\n1,a"));
		assert!(looks_tabular("\u{feff}id,title\n1,a"));
		assert!(!looks_tabular("<html>\n<body>a,b</body>"));
		assert!(!looks_tabular("{\"state\":\"queued\",\"progress\":10}"));
		assert!(!looks_tabular("<p>a,b</p>"));
		assert!(!looks_tabular(""));
	}

	#[test]
	fn file_name_comes_from_url_path() {
		assert_eq!(filename_from_url("https://x/api/tasks-20250601.csv?token=a"), Some("tasks-20250601.csv".into()));
		assert_eq!(filename_from_url("https://x/api/export"), None);
	}

	#[test]
	fn error_status_is_not_a_payload() {
		let response = CapturedResponse {
			url: "https://x/export".into(),
			status: 500,
			content_type: Some("text/csv".into()),
			body: b"id,title".to_vec(),
		};
		assert!(payload_from_response(response).is_err());
	}

	fn network_channel() -> NetworkResponseChannel {
		NetworkResponseChannel::new(ResponseFilter::from_settings(&crate::config::CaptureSettings::default()))
	}

	fn response(url: &str, status: u16, content_type: &str, body: &str) -> CapturedResponse {
		CapturedResponse {
			url: url.into(),
			status,
			content_type: Some(content_type.into()),
			body: body.as_bytes().to_vec(),
		}
	}

	#[tokio::test]
	async fn json_status_poll_does_not_win() {
		let mock = Arc::new(MockDriver::new());
		mock.push_response(
			response("https://app/api/export/status", 200, "application/json", r#"{"state":"queued"}"#),
			Duration::from_millis(10),
		);
		mock.push_response_csv("https://app/api/export/tasks.csv", "id,title\n1,real\n", Duration::from_millis(60));

		let watcher = network_channel().arm(mock, SystemTime::now()).await.unwrap();
		let payload = tokio::time::timeout(Duration::from_secs(2), watcher).await.unwrap().unwrap();
		assert!(payload.text.contains("real"));
		assert_eq!(payload.suggested_filename.as_deref(), Some("tasks.csv"));
	}

	#[tokio::test]
	async fn failed_or_empty_response_keeps_channel_watching() {
		let mock = Arc::new(MockDriver::new());
		mock.push_response(response("https://app/api/export", 500, "text/csv", "id,title\n"), Duration::from_millis(10));
		mock.push_response(response("https://app/api/export", 200, "text/csv", ""), Duration::from_millis(20));
		mock.push_response_csv("https://app/api/export", "id,title\n1,retry\n", Duration::from_millis(40));

		let watcher = network_channel().arm(mock, SystemTime::now()).await.unwrap();
		let payload = tokio::time::timeout(Duration::from_secs(2), watcher).await.unwrap().unwrap();
		assert_eq!(payload.channel, ChannelKind::NetworkResponse);
		assert!(payload.text.contains("retry"));
	}

	#[tokio::test]
	async fn rejected_responses_alone_never_resolve() {
		let mock = Arc::new(MockDriver::new());
		mock.push_response(
			response("https://app/api/export/status", 200, "application/json", r#"{"state":"done"}"#),
			Duration::ZERO,
		);

		let watcher = network_channel().arm(mock, SystemTime::now()).await.unwrap();
		assert!(tokio::time::timeout(Duration::from_millis(80), watcher).await.is_err());
	}

	#[tokio::test]
	async fn poll_ignores_stale_and_partial_files() {
		let tmp = tempfile::tempdir().unwrap();
		let stale = tmp.path().join("old.csv");
		std::fs::write(&stale, "id,title\n9,stale\n").unwrap();
		std::fs::File::options()
			.write(true)
			.open(&stale)
			.unwrap()
			.set_modified(SystemTime::now() - Duration::from_secs(3600))
			.unwrap();
		std::fs::write(tmp.path().join("new.csv.crdownload"), "id,title\n1,partial\n").unwrap();
		std::fs::write(tmp.path().join("notes.txt"), "not a table\n").unwrap();

		let started = SystemTime::now() - Duration::from_secs(60);
		let driver: Arc<dyn CapabilityDriver> = Arc::new(MockDriver::new());
		let channel = DirectoryPollChannel::new(tmp.path(), Duration::from_millis(10));
		let watcher = channel.arm(driver, started).await.unwrap();

		let dir = tmp.path().to_path_buf();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(40)).await;
			std::fs::write(dir.join("tasks.csv"), "id,title\n1,fresh\n").unwrap();
		});

		let payload = tokio::time::timeout(Duration::from_secs(2), watcher).await.unwrap().unwrap();
		assert_eq!(payload.channel, ChannelKind::DirectoryPoll);
		assert_eq!(payload.suggested_filename.as_deref(), Some("tasks.csv"));
		assert!(payload.text.contains("fresh"));
	}
}
