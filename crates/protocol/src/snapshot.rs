//! Authenticated browser state persisted between runs.
//!
//! The on-disk format is the usual storage-state JSON shape:
//!
//! ```json
//! { "cookies": [ { "name": "sid", "value": "...", "domain": ".example.com" } ],
//!   "origins": [ { "origin": "https://app.example.com", "localStorage": [] } ] }
//! ```
//!
//! The snapshot is opaque to the pipeline: it is captured from the driver after
//! an interactive login and handed back to the driver before an automated run.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// SameSite cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSite {
	#[serde(rename = "None")]
	None,
	#[default]
	#[serde(rename = "Lax")]
	Lax,
	#[serde(rename = "Strict")]
	Strict,
}

/// A browser cookie as captured from the authenticated context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,
	pub value: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	/// Unix timestamp in seconds. `-1` or absent means session cookie.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expires: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub http_only: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub secure: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub same_site: Option<SameSite>,
}

impl Cookie {
	pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: Some(domain.into()),
			path: None,
			expires: None,
			http_only: None,
			secure: None,
			same_site: None,
		}
	}

	/// Returns true if the cookie carries a concrete expiry that lies before `now_secs`.
	pub fn is_expired_at(&self, now_secs: f64) -> bool {
		matches!(self.expires, Some(ts) if ts >= 0.0 && ts < now_secs)
	}
}

/// One localStorage key/value pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalStorageEntry {
	pub name: String,
	pub value: String,
}

/// localStorage contents for one origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
	pub origin: String,
	#[serde(default)]
	pub local_storage: Vec<LocalStorageEntry>,
}

/// Cookies plus per-origin storage for an authenticated browser context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSnapshot {
	#[serde(default)]
	pub cookies: Vec<Cookie>,
	#[serde(default)]
	pub origins: Vec<OriginState>,
}

impl StorageSnapshot {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_cookies(cookies: Vec<Cookie>) -> Self {
		Self { cookies, origins: Vec::new() }
	}

	pub fn is_empty(&self) -> bool {
		self.cookies.is_empty() && self.origins.is_empty()
	}

	/// Loads a snapshot from a JSON file.
	pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
		let content = std::fs::read_to_string(path)?;
		Self::from_json(&content)
	}

	pub fn from_json(content: &str) -> std::io::Result<Self> {
		serde_json::from_str(content).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
	}

	pub fn to_json(&self) -> std::io::Result<String> {
		serde_json::to_string_pretty(self).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
	}
}
