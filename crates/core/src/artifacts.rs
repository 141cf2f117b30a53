//! Files left on disk by a run: the raw export and failure diagnostics.
//!
//! Diagnostic capture is best effort. A failure while collecting is logged and
//! swallowed so the failure that triggered collection stays the one reported.

use std::path::{Path, PathBuf};

use chrono::Local;
use taskex_protocol::{Artifact, ArtifactType};
use tracing::{debug, warn};

use crate::capture::RawPayload;
use crate::driver::CapabilityDriver;
use crate::error::Result;

fn timestamp() -> String {
	Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Screenshot plus page HTML, named `<label>-<timestamp>-failure.{png,html}`.
pub async fn collect_failure_artifacts(driver: &dyn CapabilityDriver, dir: &Path, label: &str) -> Vec<Artifact> {
	let mut collected = Vec::new();

	if let Err(e) = tokio::fs::create_dir_all(dir).await {
		warn!(target = "taskex", dir = %dir.display(), error = %e, "failed to create artifacts directory");
		return collected;
	}

	let stem = format!("{label}-{}-failure", timestamp());

	let screenshot_path = dir.join(format!("{stem}.png"));
	match driver.screenshot().await {
		Ok(bytes) => {
			if let Some(artifact) = write_artifact(&screenshot_path, &bytes, ArtifactType::Screenshot).await {
				collected.push(artifact);
			}
		}
		Err(e) => warn!(target = "taskex", error = %e, "failed to capture screenshot"),
	}

	let html_path = dir.join(format!("{stem}.html"));
	match driver.page_html().await {
		Ok(html) => {
			if let Some(artifact) = write_artifact(&html_path, html.as_bytes(), ArtifactType::Html).await {
				collected.push(artifact);
			}
		}
		Err(e) => warn!(target = "taskex", error = %e, "failed to capture page HTML"),
	}

	debug!(target = "taskex", count = collected.len(), dir = %dir.display(), "collected failure artifacts");
	collected
}

async fn write_artifact(path: &Path, bytes: &[u8], artifact_type: ArtifactType) -> Option<Artifact> {
	match tokio::fs::write(path, bytes).await {
		Ok(()) => Some(Artifact {
			artifact_type,
			path: path.to_path_buf(),
			size_bytes: Some(bytes.len() as u64),
		}),
		Err(e) => {
			warn!(target = "taskex", path = %path.display(), error = %e, "failed to write artifact");
			None
		}
	}
}

/// Persists captured text as `export-<YYYYmmdd-HHMMSS>.<ext>`; the extension
/// follows the suggested file name and defaults to `csv`.
pub async fn save_raw_payload(dir: &Path, payload: &RawPayload) -> Result<Artifact> {
	tokio::fs::create_dir_all(dir).await?;

	let ext = payload
		.suggested_filename
		.as_deref()
		.and_then(|name| Path::new(name).extension())
		.and_then(|e| e.to_str())
		.filter(|e| !e.is_empty() && e.len() <= 8)
		.unwrap_or("csv")
		.to_ascii_lowercase();
	let stem = format!("export-{}", timestamp());

	let path = unique_path(dir, &stem, &ext).await;
	tokio::fs::write(&path, payload.text.as_bytes()).await?;
	debug!(target = "taskex", path = %path.display(), channel = %payload.channel, "saved raw export");

	Ok(Artifact {
		artifact_type: ArtifactType::Payload,
		path,
		size_bytes: Some(payload.text.len() as u64),
	})
}

async fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
	let mut path = dir.join(format!("{stem}.{ext}"));
	let mut n = 1;
	while tokio::fs::try_exists(&path).await.unwrap_or(false) {
		path = dir.join(format!("{stem}-{n}.{ext}"));
		n += 1;
	}
	path
}
