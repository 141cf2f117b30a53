//! Scripted [`CapabilityDriver`] for tests.
//!
//! [`MockDriver`] keeps an in-memory model of the few page elements the
//! pipeline touches and records every call for later assertion.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use taskex::testing::{MockAction, MockDriver, MockField};
//!
//! let driver = Arc::new(MockDriver::new());
//! driver.add_field("#start", MockField::default());
//! driver.add_control("button.export");
//! driver.push_response_csv("https://app/export.csv", "id,title\n1,a\n", Duration::from_millis(50));
//!
//! // run the pipeline ...
//! assert!(driver.actions().contains(&MockAction::Click { selector: "button.export".into(), force: false }));
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt, stream};
use serde_json::Value;
use taskex_protocol::StorageSnapshot;
use tokio::time::Instant;

use crate::date_input::SCRIPTED_VALUE_JS;
use crate::driver::{CapabilityDriver, CapturedResponse, ClickOptions, DownloadedFile, EventStream, ResponseFilter, Watcher};
use crate::error::{Error, Result};
use crate::trigger::SCRIPT_CLICK_JS;

/// How a mocked input reacts to each write technique.
#[derive(Debug, Clone, Default)]
pub struct MockField {
	pub value: String,
	/// `set_value` succeeds but the widget discards the assignment.
	pub ignore_set_value: bool,
	/// Keystrokes are swallowed.
	pub ignore_typing: bool,
	/// `select_all` fails, so typing appends to the existing value.
	pub reject_select_all: bool,
	/// Script-level mutation errors.
	pub reject_script: bool,
	/// Read back with `-` replaced by this separator, like a widget that reformats input.
	pub display_separator: Option<char>,
	pub(crate) selected: bool,
}

impl MockField {
	pub fn with_value(value: &str) -> Self {
		Self {
			value: value.to_string(),
			..Self::default()
		}
	}

	/// A widget that only reacts to scripted DOM mutation.
	pub fn script_only() -> Self {
		Self {
			ignore_set_value: true,
			ignore_typing: true,
			..Self::default()
		}
	}

	/// A widget no technique can change.
	pub fn read_only(value: &str) -> Self {
		Self {
			value: value.to_string(),
			ignore_set_value: true,
			ignore_typing: true,
			reject_script: true,
			..Self::default()
		}
	}

	fn displayed(&self) -> String {
		match self.display_separator {
			Some(sep) => self.value.replace('-', &sep.to_string()),
			None => self.value.clone(),
		}
	}
}

/// How a mocked clickable control reacts.
#[derive(Debug, Clone)]
pub struct MockControl {
	/// Instant from which the control is visible and enabled; `None` means never.
	pub actionable_at: Option<Instant>,
	pub reject_click: bool,
	pub reject_forced: bool,
	pub reject_script: bool,
}

impl Default for MockControl {
	fn default() -> Self {
		Self {
			actionable_at: Some(Instant::now()),
			reject_click: false,
			reject_forced: false,
			reject_script: false,
		}
	}
}

/// Action recorded by [`MockDriver`] for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAction {
	Goto { url: String },
	SetValue { selector: String, value: String },
	Focus { selector: String },
	SelectAll { selector: String },
	Clear { selector: String },
	Type { selector: String, text: String },
	PressKey { key: String },
	Click { selector: String, force: bool },
	ScriptClick { selector: String },
	ScriptSetValue { selector: String, value: String },
	Evaluate { script: String },
	WatchResponses,
	WatchDownloads { dir: PathBuf },
	Screenshot,
	PageHtml,
	RestoreSnapshot,
	Close,
}

struct ScheduledResponse {
	response: CapturedResponse,
	delay: Duration,
}

struct ScheduledDownload {
	filename: String,
	content: Vec<u8>,
	delay: Duration,
}

struct MockState {
	url: String,
	html: String,
	screenshot: Vec<u8>,
	fail_artifacts: bool,
	navigation_error: Option<String>,
	counts: HashMap<String, usize>,
	disappear_at: HashMap<String, Instant>,
	overlays: Vec<String>,
	escape_dismisses: Vec<String>,
	fields: HashMap<String, MockField>,
	controls: HashMap<String, MockControl>,
	responses: Vec<ScheduledResponse>,
	downloads: Vec<ScheduledDownload>,
	snapshot: StorageSnapshot,
	restored: Option<StorageSnapshot>,
	actions: Vec<MockAction>,
}

/// In-memory browser double.
pub struct MockDriver {
	state: Mutex<MockState>,
}

impl Default for MockDriver {
	fn default() -> Self {
		Self::new()
	}
}

impl MockDriver {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(MockState {
				url: "about:blank".to_string(),
				html: "<html><body></body></html>".to_string(),
				screenshot: vec![0x89, 0x50, 0x4E, 0x47],
				fail_artifacts: false,
				navigation_error: None,
				counts: HashMap::new(),
				disappear_at: HashMap::new(),
				overlays: Vec::new(),
				escape_dismisses: Vec::new(),
				fields: HashMap::new(),
				controls: HashMap::new(),
				responses: Vec::new(),
				downloads: Vec::new(),
				snapshot: StorageSnapshot::default(),
				restored: None,
				actions: Vec::new(),
			}),
		}
	}

	/// Makes every `navigate` call fail with `message`.
	pub fn fail_navigation(&self, message: &str) {
		self.state.lock().unwrap().navigation_error = Some(message.to_string());
	}

	pub fn set_html(&self, html: &str) {
		self.state.lock().unwrap().html = html.to_string();
	}

	/// Makes `screenshot` and `page_html` fail.
	pub fn fail_artifacts(&self) {
		self.state.lock().unwrap().fail_artifacts = true;
	}

	pub fn set_count(&self, selector: &str, count: usize) {
		let mut state = self.state.lock().unwrap();
		state.counts.insert(selector.to_string(), count);
		state.disappear_at.remove(selector);
	}

	/// Shows `selector` now and removes it after `after`.
	pub fn show_for(&self, selector: &str, after: Duration) {
		let mut state = self.state.lock().unwrap();
		state.counts.insert(selector.to_string(), 1);
		state.disappear_at.insert(selector.to_string(), Instant::now() + after);
	}

	/// Shows an overlay; when `escape_dismisses` is set, pressing Escape removes it.
	pub fn add_overlay(&self, selector: &str, escape_dismisses: bool) {
		let mut state = self.state.lock().unwrap();
		state.counts.insert(selector.to_string(), 1);
		state.overlays.push(selector.to_string());
		if escape_dismisses {
			state.escape_dismisses.push(selector.to_string());
		}
	}

	pub fn add_field(&self, selector: &str, field: MockField) {
		let mut state = self.state.lock().unwrap();
		state.counts.insert(selector.to_string(), 1);
		state.fields.insert(selector.to_string(), field);
	}

	pub fn field_value(&self, selector: &str) -> Option<String> {
		self.state.lock().unwrap().fields.get(selector).map(|f| f.value.clone())
	}

	pub fn add_control(&self, selector: &str) {
		self.add_control_with(selector, MockControl::default());
	}

	pub fn add_control_with(&self, selector: &str, control: MockControl) {
		let mut state = self.state.lock().unwrap();
		state.counts.insert(selector.to_string(), 1);
		state.controls.insert(selector.to_string(), control);
	}

	/// Schedules a network response `delay` after `watch_responses` is armed.
	pub fn push_response(&self, response: CapturedResponse, delay: Duration) {
		self.state.lock().unwrap().responses.push(ScheduledResponse { response, delay });
	}

	pub fn push_response_csv(&self, url: &str, body: &str, delay: Duration) {
		self.push_response(
			CapturedResponse {
				url: url.to_string(),
				status: 200,
				content_type: Some("text/csv".to_string()),
				body: body.as_bytes().to_vec(),
			},
			delay,
		);
	}

	/// Schedules a completed download written into the watched directory.
	pub fn push_download(&self, filename: &str, content: &str, delay: Duration) {
		self.state.lock().unwrap().downloads.push(ScheduledDownload {
			filename: filename.to_string(),
			content: content.as_bytes().to_vec(),
			delay,
		});
	}

	pub fn set_snapshot(&self, snapshot: StorageSnapshot) {
		self.state.lock().unwrap().snapshot = snapshot;
	}

	pub fn restored_snapshot(&self) -> Option<StorageSnapshot> {
		self.state.lock().unwrap().restored.clone()
	}

	pub fn actions(&self) -> Vec<MockAction> {
		self.state.lock().unwrap().actions.clone()
	}

	pub fn clear_actions(&self) {
		self.state.lock().unwrap().actions.clear();
	}

	fn record(&self, action: MockAction) {
		self.state.lock().unwrap().actions.push(action);
	}

	fn current_count(state: &MockState, selector: &str) -> usize {
		if let Some(at) = state.disappear_at.get(selector) {
			if Instant::now() >= *at {
				return 0;
			}
		}
		state.counts.get(selector).copied().unwrap_or(0)
	}

	fn overlay_present(state: &MockState) -> bool {
		state.overlays.iter().any(|s| Self::current_count(state, s) > 0)
	}

	fn with_field<T>(&self, selector: &str, f: impl FnOnce(&mut MockField) -> Result<T>) -> Result<T> {
		let mut state = self.state.lock().unwrap();
		match state.fields.get_mut(selector) {
			Some(field) => f(field),
			None => Err(Error::ElementNotFound {
				selector: selector.to_string(),
			}),
		}
	}
}

#[async_trait]
impl CapabilityDriver for MockDriver {
	async fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
		self.record(MockAction::Goto { url: url.to_string() });
		let mut state = self.state.lock().unwrap();
		if let Some(message) = state.navigation_error.clone() {
			return Err(Error::Navigation {
				url: url.to_string(),
				message,
			});
		}
		state.url = url.to_string();
		Ok(())
	}

	async fn current_url(&self) -> Result<String> {
		Ok(self.state.lock().unwrap().url.clone())
	}

	async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
		let present = Self::current_count(&self.state.lock().unwrap(), selector) > 0;
		if present {
			return Ok(());
		}
		tokio::time::sleep(timeout).await;
		Err(Error::timeout(timeout, format!("selector {selector}")))
	}

	async fn wait_for_absence(&self, selector: &str, timeout: Duration) -> Result<()> {
		let disappears = {
			let state = self.state.lock().unwrap();
			if Self::current_count(&state, selector) == 0 {
				return Ok(());
			}
			state.disappear_at.get(selector).copied()
		};
		match disappears {
			Some(at) if at <= Instant::now() + timeout => {
				tokio::time::sleep_until(at).await;
				Ok(())
			}
			_ => {
				tokio::time::sleep(timeout).await;
				Err(Error::timeout(timeout, format!("absence of {selector}")))
			}
		}
	}

	async fn count(&self, selector: &str) -> Result<usize> {
		Ok(Self::current_count(&self.state.lock().unwrap(), selector))
	}

	async fn set_value(&self, selector: &str, value: &str) -> Result<()> {
		self.record(MockAction::SetValue {
			selector: selector.to_string(),
			value: value.to_string(),
		});
		self.with_field(selector, |field| {
			if !field.ignore_set_value {
				field.value = value.to_string();
			}
			Ok(())
		})
	}

	async fn focus(&self, selector: &str) -> Result<()> {
		self.record(MockAction::Focus {
			selector: selector.to_string(),
		});
		self.with_field(selector, |_| Ok(()))
	}

	async fn select_all(&self, selector: &str) -> Result<()> {
		self.record(MockAction::SelectAll {
			selector: selector.to_string(),
		});
		self.with_field(selector, |field| {
			if field.reject_select_all {
				return Err(Error::Driver("selection not supported".to_string()));
			}
			field.selected = true;
			Ok(())
		})
	}

	async fn clear(&self, selector: &str) -> Result<()> {
		self.record(MockAction::Clear {
			selector: selector.to_string(),
		});
		self.with_field(selector, |field| {
			if !field.ignore_typing {
				field.value.clear();
			}
			Ok(())
		})
	}

	async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
		self.record(MockAction::Type {
			selector: selector.to_string(),
			text: text.to_string(),
		});
		self.with_field(selector, |field| {
			if field.ignore_typing {
				return Ok(());
			}
			if field.selected {
				field.value.clear();
				field.selected = false;
			}
			field.value.push_str(text);
			Ok(())
		})
	}

	async fn press_key(&self, key: &str) -> Result<()> {
		self.record(MockAction::PressKey { key: key.to_string() });
		if key == "Escape" {
			let mut state = self.state.lock().unwrap();
			let dismissed = state.escape_dismisses.clone();
			for selector in dismissed {
				state.counts.insert(selector, 0);
			}
		}
		Ok(())
	}

	async fn read_value(&self, selector: &str) -> Result<String> {
		self.with_field(selector, |field| Ok(field.displayed()))
	}

	async fn click(&self, selector: &str, options: ClickOptions) -> Result<()> {
		self.record(MockAction::Click {
			selector: selector.to_string(),
			force: options.force,
		});
		let state = self.state.lock().unwrap();
		let control = state.controls.get(selector).ok_or_else(|| Error::ElementNotFound {
			selector: selector.to_string(),
		})?;
		if options.force {
			if control.reject_forced {
				return Err(Error::Driver("forced click rejected".to_string()));
			}
			return Ok(());
		}
		if control.reject_click {
			return Err(Error::Driver("element is disabled".to_string()));
		}
		if Self::overlay_present(&state) {
			return Err(Error::Driver("element is covered by another element".to_string()));
		}
		Ok(())
	}

	async fn is_actionable(&self, selector: &str) -> Result<bool> {
		let state = self.state.lock().unwrap();
		if Self::current_count(&state, selector) == 0 {
			return Ok(false);
		}
		let ready = match state.controls.get(selector) {
			Some(control) => control.actionable_at.is_some_and(|at| Instant::now() >= at),
			None => true,
		};
		Ok(ready && !Self::overlay_present(&state))
	}

	async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value> {
		let selector = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
		if script == SCRIPTED_VALUE_JS {
			let value = args.get(1).and_then(Value::as_str).unwrap_or_default().to_string();
			self.record(MockAction::ScriptSetValue {
				selector: selector.clone(),
				value: value.clone(),
			});
			return self.with_field(&selector, |field| {
				if field.reject_script {
					return Err(Error::Driver("script mutation rejected".to_string()));
				}
				field.value = value;
				Ok(Value::Bool(true))
			});
		}
		if script == SCRIPT_CLICK_JS {
			self.record(MockAction::ScriptClick {
				selector: selector.clone(),
			});
			let state = self.state.lock().unwrap();
			return match state.controls.get(&selector) {
				Some(control) if !control.reject_script => Ok(Value::Bool(true)),
				Some(_) => Err(Error::Driver("script click rejected".to_string())),
				None => Ok(Value::Bool(false)),
			};
		}
		self.record(MockAction::Evaluate {
			script: script.to_string(),
		});
		Ok(Value::Null)
	}

	async fn watch_responses(&self, filter: ResponseFilter) -> Result<EventStream<CapturedResponse>> {
		self.record(MockAction::WatchResponses);
		let mut scheduled: Vec<(CapturedResponse, Duration)> = {
			let state = self.state.lock().unwrap();
			state
				.responses
				.iter()
				.filter(|r| filter.matches(&r.response.url, r.response.content_type.as_deref()))
				.map(|r| (r.response.clone(), r.delay))
				.collect()
		};
		scheduled.sort_by_key(|(_, delay)| *delay);
		let armed = Instant::now();

		// A live page never closes its response stream.
		Ok(stream::iter(scheduled)
			.then(move |(response, delay)| async move {
				tokio::time::sleep_until(armed + delay).await;
				Ok(response)
			})
			.chain(stream::pending())
			.boxed())
	}

	async fn watch_downloads(&self, dir: &Path) -> Result<Watcher<DownloadedFile>> {
		self.record(MockAction::WatchDownloads { dir: dir.to_path_buf() });
		let next = {
			let state = self.state.lock().unwrap();
			state
				.downloads
				.iter()
				.min_by_key(|d| d.delay)
				.map(|d| (d.filename.clone(), d.content.clone(), d.delay))
		};
		let dir = dir.to_path_buf();
		Ok(async move {
			match next {
				Some((filename, content, delay)) => {
					tokio::time::sleep(delay).await;
					tokio::fs::create_dir_all(&dir).await?;
					let path = dir.join(&filename);
					tokio::fs::write(&path, content).await?;
					Ok(DownloadedFile {
						path,
						suggested_filename: Some(filename),
					})
				}
				None => futures::future::pending().await,
			}
		}
		.boxed())
	}

	async fn screenshot(&self) -> Result<Vec<u8>> {
		self.record(MockAction::Screenshot);
		let state = self.state.lock().unwrap();
		if state.fail_artifacts {
			return Err(Error::Driver("screenshot failed".to_string()));
		}
		Ok(state.screenshot.clone())
	}

	async fn page_html(&self) -> Result<String> {
		self.record(MockAction::PageHtml);
		let state = self.state.lock().unwrap();
		if state.fail_artifacts {
			return Err(Error::Driver("page content unavailable".to_string()));
		}
		Ok(state.html.clone())
	}

	async fn storage_snapshot(&self) -> Result<StorageSnapshot> {
		Ok(self.state.lock().unwrap().snapshot.clone())
	}

	async fn restore_snapshot(&self, snapshot: &StorageSnapshot) -> Result<()> {
		self.record(MockAction::RestoreSnapshot);
		self.state.lock().unwrap().restored = Some(snapshot.clone());
		Ok(())
	}

	async fn close(&self) -> Result<()> {
		self.record(MockAction::Close);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn typing_appends_unless_selected() {
		let driver = MockDriver::new();
		driver.add_field("#f", MockField::with_value("2024"));

		driver.type_text("#f", "01").await.unwrap();
		assert_eq!(driver.field_value("#f").unwrap(), "202401");

		driver.select_all("#f").await.unwrap();
		driver.type_text("#f", "2025-06-01").await.unwrap();
		assert_eq!(driver.field_value("#f").unwrap(), "2025-06-01");
	}

	#[tokio::test]
	async fn escape_dismisses_overlay_and_unblocks_click() {
		let driver = MockDriver::new();
		driver.add_control("#export");
		driver.add_overlay(".picker", true);

		assert!(!driver.is_actionable("#export").await.unwrap());
		assert!(driver.click("#export", ClickOptions::default()).await.is_err());

		driver.press_key("Escape").await.unwrap();
		assert!(driver.is_actionable("#export").await.unwrap());
		driver.click("#export", ClickOptions::default()).await.unwrap();
	}

	#[tokio::test]
	async fn marker_disappears_after_delay() {
		let driver = MockDriver::new();
		driver.show_for(".loading", Duration::from_millis(20));
		assert_eq!(driver.count(".loading").await.unwrap(), 1);

		driver.wait_for_absence(".loading", Duration::from_millis(500)).await.unwrap();
		assert_eq!(driver.count(".loading").await.unwrap(), 0);
	}

	#[tokio::test]
	async fn unmatched_responses_are_not_delivered() {
		let driver = MockDriver::new();
		driver.push_response(
			CapturedResponse {
				url: "https://app/api/user".into(),
				status: 200,
				content_type: Some("application/json".into()),
				body: b"{}".to_vec(),
			},
			Duration::ZERO,
		);
		let mut responses = driver
			.watch_responses(ResponseFilter::from_settings(&crate::config::CaptureSettings::default()))
			.await
			.unwrap();
		let result = tokio::time::timeout(Duration::from_millis(50), responses.next()).await;
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn matched_responses_arrive_in_delay_order() {
		let driver = MockDriver::new();
		driver.push_response_csv("https://app/export/late.csv", "id,title\n2,b\n", Duration::from_millis(40));
		driver.push_response_csv("https://app/export/early.csv", "id,title\n1,a\n", Duration::from_millis(10));
		let mut responses = driver
			.watch_responses(ResponseFilter::from_settings(&crate::config::CaptureSettings::default()))
			.await
			.unwrap();

		let first = responses.next().await.unwrap().unwrap();
		let second = responses.next().await.unwrap().unwrap();
		assert!(first.url.ends_with("early.csv"));
		assert!(second.url.ends_with("late.csv"));
	}
}
