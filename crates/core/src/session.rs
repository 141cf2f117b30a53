//! Persisted authenticated-session snapshot with a time-to-live.
//!
//! The snapshot file's last-modified time is its creation timestamp: a record
//! is valid iff `now - modified < ttl`. A record exactly `ttl` old is invalid.
//! Read or parse problems make a record invalid; they never fail the caller.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use taskex_protocol::StorageSnapshot;
use tracing::{debug, warn};

use crate::config::ExportConfig;
use crate::error::Result;

/// A loaded snapshot and when it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
	pub snapshot: StorageSnapshot,
	pub created_at: SystemTime,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
	path: PathBuf,
	ttl: Duration,
}

impl SessionStore {
	pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
		Self { path: path.into(), ttl }
	}

	pub fn from_config(config: &ExportConfig) -> Self {
		Self::new(&config.session_file, config.session_ttl())
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	pub fn is_valid(&self) -> bool {
		self.is_valid_at(SystemTime::now())
	}

	/// Within TTL at `now` and parseable.
	pub fn is_valid_at(&self, now: SystemTime) -> bool {
		self.load_at(now).is_some()
	}

	/// Last-modified time of the snapshot file, if it exists.
	pub fn created_at(&self) -> Option<SystemTime> {
		match fs::metadata(&self.path).and_then(|m| m.modified()) {
			Ok(modified) => Some(modified),
			Err(e) => {
				debug!(target = "taskex", path = %self.path.display(), error = %e, "no session snapshot");
				None
			}
		}
	}

	pub fn age(&self) -> Option<Duration> {
		self.created_at().map(|created| SystemTime::now().duration_since(created).unwrap_or_default())
	}

	pub fn load(&self) -> Option<SessionRecord> {
		self.load_at(SystemTime::now())
	}

	/// Returns the record when it exists, parses and is within TTL at `now`.
	pub fn load_at(&self, now: SystemTime) -> Option<SessionRecord> {
		let created_at = self.created_at()?;
		if !Self::within_ttl(created_at, now, self.ttl) {
			debug!(target = "taskex", path = %self.path.display(), "session snapshot expired");
			return None;
		}
		match StorageSnapshot::from_file(&self.path) {
			Ok(snapshot) => Some(SessionRecord { snapshot, created_at }),
			Err(e) => {
				warn!(target = "taskex", path = %self.path.display(), error = %e, "unreadable session snapshot");
				None
			}
		}
	}

	/// Atomically replaces the snapshot (sibling temp file, then rename).
	pub fn save(&self, snapshot: &StorageSnapshot) -> Result<()> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent)?;
		}
		let tmp = self.temp_path();
		fs::write(&tmp, snapshot.to_json()?)?;
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
		}
		if let Err(e) = fs::rename(&tmp, &self.path) {
			let _ = fs::remove_file(&tmp);
			return Err(e.into());
		}
		debug!(
			target = "taskex",
			path = %self.path.display(),
			cookies = snapshot.cookies.len(),
			origins = snapshot.origins.len(),
			"saved session snapshot"
		);
		Ok(())
	}

	/// Deletes the snapshot. Absent is fine.
	pub fn clear(&self) -> Result<()> {
		match fs::remove_file(&self.path) {
			Ok(()) => {
				debug!(target = "taskex", path = %self.path.display(), "cleared session snapshot");
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	fn within_ttl(created: SystemTime, now: SystemTime, ttl: Duration) -> bool {
		// A timestamp in the future (clock skew) counts as fresh.
		let age = now.duration_since(created).unwrap_or_default();
		age < ttl
	}

	fn temp_path(&self) -> PathBuf {
		let name = self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "session".to_string());
		self.path.with_file_name(format!(".{name}.tmp"))
	}
}
