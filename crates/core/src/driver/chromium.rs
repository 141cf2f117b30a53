//! Chromium backend over the DevTools protocol.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::browser::{
	DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin, SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
	self, CookieParam, CookieSameSite, EventLoadingFailed, EventLoadingFinished, EventResponseReceived, GetResponseBodyParams,
	SetCookiesParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::{FutureExt, StreamExt, stream};
use serde_json::Value;
use taskex_protocol::{Cookie, LocalStorageEntry, OriginState, SameSite, StorageSnapshot};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use super::{CapabilityDriver, CapturedResponse, ClickOptions, DownloadedFile, EventStream, ResponseFilter, Watcher};
use crate::config::ExportConfig;
use crate::error::{Error, Result};

const SELECTOR_POLL: Duration = Duration::from_millis(100);

const ACTIONABLE_JS: &str = "function() {
	if (!this.isConnected || this.disabled) return false;
	const style = getComputedStyle(this);
	if (style.visibility === 'hidden' || style.display === 'none' || style.pointerEvents === 'none') return false;
	const rect = this.getBoundingClientRect();
	if (rect.width === 0 || rect.height === 0) return false;
	const hit = document.elementFromPoint(rect.left + rect.width / 2, rect.top + rect.height / 2);
	return hit !== null && (hit === this || this.contains(hit));
}";

const SNAPSHOT_STORAGE_JS: &str = "() => ({
	origin: location.origin,
	entries: Object.keys(localStorage).map((name) => [name, localStorage.getItem(name)]),
})";

pub struct ChromiumDriver {
	browser: Mutex<Browser>,
	page: Page,
	handler_task: JoinHandle<()>,
}

impl Drop for ChromiumDriver {
	fn drop(&mut self) {
		self.handler_task.abort();
	}
}

impl ChromiumDriver {
	/// Launches a browser using `config.headless`.
	pub async fn launch(config: &ExportConfig) -> Result<Self> {
		Self::launch_with(config, config.headless).await
	}

	/// Launches a visible browser for interactive login.
	pub async fn launch_headed(config: &ExportConfig) -> Result<Self> {
		Self::launch_with(config, false).await
	}

	async fn launch_with(config: &ExportConfig, headless: bool) -> Result<Self> {
		let mut builder = BrowserConfig::builder()
			.viewport(None)
			.arg("--no-first-run")
			.arg("--no-default-browser-check")
			.arg("--disable-infobars");
		if !headless {
			builder = builder.with_head();
		}
		if let Some(path) = &config.chrome_executable {
			builder = builder.chrome_executable(path);
		}
		let browser_config = builder.build().map_err(|e| Error::Driver(format!("failed to configure browser: {e}")))?;

		let (browser, mut handler) = Browser::launch(browser_config).await?;
		let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });
		let page = browser.new_page("about:blank").await?;
		info!(target = "taskex", headless, "browser launched");

		Ok(Self {
			browser: Mutex::new(browser),
			page,
			handler_task,
		})
	}

	pub fn page(&self) -> &Page {
		&self.page
	}

	async fn element(&self, selector: &str) -> Result<Element> {
		self.page.find_element(selector).await.map_err(|_| Error::ElementNotFound {
			selector: selector.to_string(),
		})
	}

	async fn poll_count(&self, selector: &str, timeout: Duration, want_present: bool) -> Result<()> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			let present = self.count(selector).await? > 0;
			if present == want_present {
				return Ok(());
			}
			if tokio::time::Instant::now() >= deadline {
				let condition = if want_present { selector.to_string() } else { format!("{selector} to disappear") };
				return Err(Error::timeout(timeout, condition));
			}
			tokio::time::sleep(SELECTOR_POLL).await;
		}
	}

	async fn restore_local_storage(&self, origins: &[OriginState]) -> Result<()> {
		for origin in origins.iter().filter(|o| !o.local_storage.is_empty()) {
			let entries: Vec<(&str, &str)> = origin.local_storage.iter().map(|e| (e.name.as_str(), e.value.as_str())).collect();
			let source = format!(
				"(() => {{
					if (location.origin !== {origin} || sessionStorage.getItem('__taskex_restored')) return;
					for (const [k, v] of {entries}) localStorage.setItem(k, v);
					sessionStorage.setItem('__taskex_restored', '1');
				}})()",
				origin = serde_json::to_string(&origin.origin)?,
				entries = serde_json::to_string(&entries)?,
			);
			self.page.evaluate_on_new_document(source).await?;
			debug!(target = "taskex", origin = %origin.origin, keys = entries.len(), "localStorage restore scheduled");
		}
		Ok(())
	}
}

#[async_trait]
impl CapabilityDriver for ChromiumDriver {
	async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
		debug!(target = "taskex", %url, "navigating");
		match tokio::time::timeout(timeout, self.page.goto(url)).await {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(e)) => Err(Error::Navigation {
				url: url.to_string(),
				message: e.to_string(),
			}),
			Err(_) => Err(Error::Navigation {
				url: url.to_string(),
				message: format!("timed out after {}ms", timeout.as_millis()),
			}),
		}
	}

	async fn current_url(&self) -> Result<String> {
		Ok(self.page.url().await?.unwrap_or_default())
	}

	async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
		self.poll_count(selector, timeout, true).await
	}

	async fn wait_for_absence(&self, selector: &str, timeout: Duration) -> Result<()> {
		self.poll_count(selector, timeout, false).await
	}

	async fn count(&self, selector: &str) -> Result<usize> {
		Ok(self.page.find_elements(selector).await.map(|found| found.len()).unwrap_or(0))
	}

	async fn set_value(&self, selector: &str, value: &str) -> Result<()> {
		let element = self.element(selector).await?;
		let script = format!(
			"function() {{
				this.value = {};
				this.dispatchEvent(new Event('input', {{ bubbles: true }}));
				this.dispatchEvent(new Event('change', {{ bubbles: true }}));
			}}",
			serde_json::to_string(value)?
		);
		element.call_js_fn(script, false).await?;
		Ok(())
	}

	async fn focus(&self, selector: &str) -> Result<()> {
		self.element(selector).await?.focus().await?;
		Ok(())
	}

	async fn select_all(&self, selector: &str) -> Result<()> {
		let element = self.element(selector).await?;
		element.call_js_fn("function() { this.focus(); this.select(); }", false).await?;
		Ok(())
	}

	async fn clear(&self, selector: &str) -> Result<()> {
		let element = self.element(selector).await?;
		element
			.call_js_fn(
				"function() { this.value = ''; this.dispatchEvent(new Event('input', { bubbles: true })); }",
				false,
			)
			.await?;
		Ok(())
	}

	async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
		let element = self.element(selector).await?;
		element.focus().await?;
		element.type_str(text).await?;
		Ok(())
	}

	async fn press_key(&self, key: &str) -> Result<()> {
		// Key events go to the focused element of the tab.
		self.element("body").await?.press_key(key).await?;
		Ok(())
	}

	async fn read_value(&self, selector: &str) -> Result<String> {
		let value = self.element(selector).await?.property("value").await?;
		Ok(match value {
			Some(Value::String(s)) => s,
			Some(Value::Null) | None => String::new(),
			Some(other) => other.to_string(),
		})
	}

	async fn click(&self, selector: &str, options: ClickOptions) -> Result<()> {
		let element = self.element(selector).await?;
		if !options.force {
			element.scroll_into_view().await?;
			if !self.is_actionable(selector).await? {
				return Err(Error::Driver(format!("{selector} is covered or disabled")));
			}
		}
		element.click().await?;
		Ok(())
	}

	async fn is_actionable(&self, selector: &str) -> Result<bool> {
		let element = self.element(selector).await?;
		let returns = element.call_js_fn(ACTIONABLE_JS, false).await?;
		Ok(matches!(returns.result.value, Some(Value::Bool(true))))
	}

	async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value> {
		let args = args.iter().map(serde_json::to_string).collect::<std::result::Result<Vec<_>, _>>()?;
		let expression = format!("({script})({})", args.join(", "));
		let params = EvaluateParams::builder()
			.expression(expression)
			.await_promise(true)
			.return_by_value(true)
			.build()
			.map_err(Error::Driver)?;
		let result = self.page.evaluate_expression(params).await?;
		Ok(result.value().cloned().unwrap_or(Value::Null))
	}

	async fn watch_responses(&self, filter: ResponseFilter) -> Result<EventStream<CapturedResponse>> {
		let responses = self.page.event_listener::<EventResponseReceived>().await?;
		let finished = self.page.event_listener::<EventLoadingFinished>().await?;
		let failed = self.page.event_listener::<EventLoadingFailed>().await?;
		// Request id -> whether loading finished without error.
		let settled: HashMap<String, bool> = HashMap::new();
		let state = (responses, finished, failed, settled, self.page.clone(), filter);

		Ok(stream::unfold(state, |(mut responses, mut finished, mut failed, mut settled, page, filter)| async move {
			let event = loop {
				let event = responses.next().await?;
				if filter.matches(&event.response.url, Some(&event.response.mime_type)) {
					break event;
				}
				trace!(target = "taskex", url = %event.response.url, "response ignored");
			};

			let request_id = event.request_id.inner().clone();
			let loaded = loop {
				if let Some(ok) = settled.remove(&request_id) {
					break ok;
				}
				tokio::select! {
					Some(done) = finished.next() => {
						settled.insert(done.request_id.inner().clone(), true);
					}
					Some(fail) = failed.next() => {
						settled.insert(fail.request_id.inner().clone(), false);
					}
					else => break false,
				}
			};

			let item = if loaded {
				response_body(&page, &event).await
			} else {
				Err(Error::Driver(format!("response {} failed to load", event.response.url)))
			};
			Some((item, (responses, finished, failed, settled, page, filter)))
		})
		.boxed())
	}

	async fn watch_downloads(&self, dir: &Path) -> Result<Watcher<DownloadedFile>> {
		tokio::fs::create_dir_all(dir).await?;
		let dir = std::path::absolute(dir)?;

		let browser = self.browser.lock().await;
		let mut behavior = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::Allow);
		behavior.download_path = Some(dir.to_string_lossy().into_owned());
		behavior.events_enabled = Some(true);
		browser.execute(behavior).await?;
		let mut begins = browser.event_listener::<EventDownloadWillBegin>().await?;
		let mut progress = browser.event_listener::<EventDownloadProgress>().await?;
		drop(browser);

		Ok(async move {
			let mut names: HashMap<String, String> = HashMap::new();
			loop {
				tokio::select! {
					Some(event) = begins.next() => {
						debug!(target = "taskex", guid = %event.guid, file = %event.suggested_filename, "download started");
						names.insert(event.guid.clone(), event.suggested_filename.clone());
					}
					Some(event) = progress.next() => match event.state {
						DownloadProgressState::Completed => {
							let name = names.remove(&event.guid).unwrap_or_else(|| event.guid.clone());
							return Ok(DownloadedFile {
								path: dir.join(&name),
								suggested_filename: Some(name),
							});
						}
						DownloadProgressState::Canceled => {
							return Err(Error::Driver(format!("download {} was canceled", event.guid)));
						}
						DownloadProgressState::InProgress => {}
					},
					else => return Err(Error::Driver("download event stream closed".into())),
				}
			}
		}
		.boxed())
	}

	async fn screenshot(&self) -> Result<Vec<u8>> {
		Ok(self.page.screenshot(ScreenshotParams::builder().full_page(true).build()).await?)
	}

	async fn page_html(&self) -> Result<String> {
		Ok(self.page.content().await?)
	}

	async fn storage_snapshot(&self) -> Result<StorageSnapshot> {
		let cookies = self.page.get_cookies().await?.into_iter().map(cookie_from_cdp).collect();

		let storage = self.evaluate(SNAPSHOT_STORAGE_JS, Vec::new()).await?;
		let origin = storage.get("origin").and_then(Value::as_str).unwrap_or_default();
		let mut origins = Vec::new();
		if origin.starts_with("http") {
			let local_storage = storage
				.get("entries")
				.and_then(Value::as_array)
				.map(|entries| entries.iter().filter_map(storage_entry).collect())
				.unwrap_or_default();
			origins.push(OriginState {
				origin: origin.to_string(),
				local_storage,
			});
		}

		Ok(StorageSnapshot { cookies, origins })
	}

	async fn restore_snapshot(&self, snapshot: &StorageSnapshot) -> Result<()> {
		let fallback_url = snapshot.origins.first().map(|o| o.origin.clone());
		let cookies: Vec<CookieParam> = snapshot.cookies.iter().map(|c| cookie_to_cdp(c, fallback_url.as_deref())).collect();
		if !cookies.is_empty() {
			self.page.execute(SetCookiesParams::new(cookies)).await?;
		}
		self.restore_local_storage(&snapshot.origins).await?;
		debug!(
			target = "taskex",
			cookies = snapshot.cookies.len(),
			origins = snapshot.origins.len(),
			"session restored"
		);
		Ok(())
	}

	async fn close(&self) -> Result<()> {
		let mut browser = self.browser.lock().await;
		browser.close().await?;
		let _ = browser.wait().await;
		self.handler_task.abort();
		Ok(())
	}
}

fn storage_entry(entry: &Value) -> Option<LocalStorageEntry> {
	let pair = entry.as_array()?;
	Some(LocalStorageEntry {
		name: pair.first()?.as_str()?.to_string(),
		value: pair.get(1)?.as_str().unwrap_or_default().to_string(),
	})
}

async fn response_body(page: &Page, event: &EventResponseReceived) -> Result<CapturedResponse> {
	let body = page.execute(GetResponseBodyParams::new(event.request_id.clone())).await?.result;
	let bytes = if body.base64_encoded {
		base64::engine::general_purpose::STANDARD
			.decode(body.body.as_bytes())
			.map_err(|e| Error::Driver(format!("invalid base64 response body: {e}")))?
	} else {
		body.body.into_bytes()
	};

	Ok(CapturedResponse {
		url: event.response.url.clone(),
		status: u16::try_from(event.response.status).unwrap_or(0),
		content_type: Some(event.response.mime_type.clone()),
		body: bytes,
	})
}

fn cookie_from_cdp(cookie: network::Cookie) -> Cookie {
	Cookie {
		name: cookie.name,
		value: cookie.value,
		domain: Some(cookie.domain),
		path: Some(cookie.path),
		expires: (!cookie.session && cookie.expires >= 0.0).then_some(cookie.expires),
		http_only: Some(cookie.http_only),
		secure: Some(cookie.secure),
		same_site: cookie.same_site.map(|s| match s {
			CookieSameSite::Strict => SameSite::Strict,
			CookieSameSite::Lax => SameSite::Lax,
			CookieSameSite::None => SameSite::None,
		}),
	}
}

fn cookie_to_cdp(cookie: &Cookie, fallback_url: Option<&str>) -> CookieParam {
	let mut param = CookieParam::new(cookie.name.clone(), cookie.value.clone());
	param.domain = cookie.domain.clone();
	param.path = cookie.path.clone();
	param.secure = cookie.secure;
	param.http_only = cookie.http_only;
	param.expires = cookie.expires.filter(|ts| *ts >= 0.0).map(TimeSinceEpoch::new);
	param.same_site = cookie.same_site.map(|s| match s {
		SameSite::Strict => CookieSameSite::Strict,
		SameSite::Lax => CookieSameSite::Lax,
		SameSite::None => CookieSameSite::None,
	});
	if param.domain.is_none() {
		param.url = fallback_url.map(str::to_string);
	}
	param
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_cookies_lose_expiry_on_capture() {
		let mut cdp = network::Cookie::builder()
			.name("sid")
			.value("abc")
			.domain(".example.com")
			.path("/")
			.expires(-1.0)
			.size(6)
			.http_only(true)
			.secure(true)
			.session(true)
			.priority(network::CookiePriority::Medium)
			.source_scheme(network::CookieSourceScheme::Secure)
			.source_port(443)
			.build()
			.unwrap();
		cdp.same_site = Some(CookieSameSite::Lax);

		let cookie = cookie_from_cdp(cdp);
		assert_eq!(cookie.expires, None);
		assert_eq!(cookie.same_site, Some(SameSite::Lax));
		assert_eq!(cookie.domain.as_deref(), Some(".example.com"));
	}

	#[test]
	fn domainless_cookie_falls_back_to_origin_url() {
		let cookie = Cookie {
			domain: None,
			..Cookie::new("sid", "abc", "unused")
		};
		let param = cookie_to_cdp(&cookie, Some("https://app.example.com"));
		assert_eq!(param.url.as_deref(), Some("https://app.example.com"));

		let param = cookie_to_cdp(&Cookie::new("sid", "abc", "example.com"), Some("https://app.example.com"));
		assert_eq!(param.url, None);
	}
}
