//! Invokes the export control.
//!
//! Overlay policy: overlays are always dismissed (Escape) before the control is
//! checked for actionability, and the control must become actionable before
//! any click is attempted. Forced and script-level clicks are only used after
//! a normal click on an actionable control was rejected.

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ExportConfig;
use crate::driver::{CapabilityDriver, ClickOptions};
use crate::error::{Error, Result};

/// Clicks the element matched by the selector passed as the only argument.
pub const SCRIPT_CLICK_JS: &str = r#"(selector) => {
	const el = document.querySelector(selector);
	if (!el) return false;
	el.click();
	return true;
}"#;

const MAX_DISMISS_ATTEMPTS: usize = 3;

/// Which invocation the control accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMethod {
	Click,
	ForcedClick,
	ScriptClick,
}

impl TriggerMethod {
	pub fn as_str(&self) -> &'static str {
		match self {
			TriggerMethod::Click => "click",
			TriggerMethod::ForcedClick => "forced-click",
			TriggerMethod::ScriptClick => "script-click",
		}
	}
}

impl std::fmt::Display for TriggerMethod {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone)]
pub struct ExportTrigger {
	selector: String,
	overlays: Vec<String>,
	locate_timeout: Duration,
	ready_timeout: Duration,
	poll_interval: Duration,
}

impl ExportTrigger {
	pub fn new(selector: impl Into<String>, overlays: Vec<String>, locate_timeout: Duration, ready_timeout: Duration, poll_interval: Duration) -> Self {
		Self {
			selector: selector.into(),
			overlays,
			locate_timeout,
			ready_timeout,
			poll_interval,
		}
	}

	pub fn from_config(config: &ExportConfig) -> Self {
		Self::new(
			config.selectors.export_button.clone(),
			config.selectors.overlays.clone(),
			config.timeouts.element(),
			config.timeouts.export_ready(),
			config.timeouts.poll_interval(),
		)
	}

	pub fn selector(&self) -> &str {
		&self.selector
	}

	/// Locates, unblocks and invokes the control. Returns once the click is
	/// dispatched; the export itself is not awaited.
	pub async fn invoke(&self, driver: &dyn CapabilityDriver) -> Result<TriggerMethod> {
		driver
			.wait_for_selector(&self.selector, self.locate_timeout)
			.await
			.map_err(|_| Error::ElementNotFound {
				selector: self.selector.clone(),
			})?;

		self.dismiss_overlays(driver).await;
		self.wait_actionable(driver).await?;

		let mut rejections = Vec::new();
		match driver.click(&self.selector, ClickOptions::default()).await {
			Ok(()) => return Ok(self.invoked(TriggerMethod::Click)),
			Err(e) => {
				debug!(target = "taskex", selector = %self.selector, error = %e, "click rejected");
				rejections.push(format!("click: {e}"));
			}
		}
		match driver.click(&self.selector, ClickOptions::forced()).await {
			Ok(()) => return Ok(self.invoked(TriggerMethod::ForcedClick)),
			Err(e) => {
				debug!(target = "taskex", selector = %self.selector, error = %e, "forced click rejected");
				rejections.push(format!("forced click: {e}"));
			}
		}
		match driver.evaluate(SCRIPT_CLICK_JS, vec![json!(self.selector)]).await {
			Ok(v) if v.as_bool() == Some(true) => return Ok(self.invoked(TriggerMethod::ScriptClick)),
			Ok(_) => rejections.push("script click: element not found".to_string()),
			Err(e) => rejections.push(format!("script click: {e}")),
		}

		warn!(target = "taskex", selector = %self.selector, "export control rejected every invocation");
		Err(Error::Driver(format!("export control {} not invocable ({})", self.selector, rejections.join("; "))))
	}

	/// Presses Escape while any configured overlay is visible. Returns presses made.
	pub async fn dismiss_overlays(&self, driver: &dyn CapabilityDriver) -> usize {
		let mut presses = 0;
		for _ in 0..MAX_DISMISS_ATTEMPTS {
			if !self.overlay_visible(driver).await {
				break;
			}
			if let Err(e) = driver.press_key("Escape").await {
				debug!(target = "taskex", error = %e, "escape failed");
				break;
			}
			presses += 1;
			tokio::time::sleep(self.poll_interval).await;
		}
		if presses > 0 {
			debug!(target = "taskex", presses, "dismissed overlays");
		}
		presses
	}

	async fn overlay_visible(&self, driver: &dyn CapabilityDriver) -> bool {
		for overlay in &self.overlays {
			if matches!(driver.count(overlay).await, Ok(n) if n > 0) {
				return true;
			}
		}
		false
	}

	async fn wait_actionable(&self, driver: &dyn CapabilityDriver) -> Result<()> {
		let deadline = Instant::now() + self.ready_timeout;
		loop {
			match driver.is_actionable(&self.selector).await {
				Ok(true) => return Ok(()),
				Ok(false) => {}
				Err(e) => debug!(target = "taskex", selector = %self.selector, error = %e, "actionability check failed"),
			}
			if Instant::now() >= deadline {
				return Err(Error::timeout(self.ready_timeout, format!("{} to become actionable", self.selector)));
			}
			tokio::time::sleep(self.poll_interval).await;
		}
	}

	fn invoked(&self, method: TriggerMethod) -> TriggerMethod {
		info!(target = "taskex", selector = %self.selector, %method, "export triggered");
		method
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{MockAction, MockControl, MockDriver};

	fn trigger() -> ExportTrigger {
		ExportTrigger::new(
			"#export",
			vec![".picker".into()],
			Duration::from_millis(50),
			Duration::from_millis(200),
			Duration::from_millis(10),
		)
	}

	fn clicks(driver: &MockDriver) -> Vec<MockAction> {
		driver
			.actions()
			.into_iter()
			.filter(|a| matches!(a, MockAction::Click { .. } | MockAction::ScriptClick { .. }))
			.collect()
	}

	#[tokio::test]
	async fn plain_click_when_control_is_ready() {
		let driver = MockDriver::new();
		driver.add_control("#export");

		assert_eq!(trigger().invoke(&driver).await.unwrap(), TriggerMethod::Click);
		assert_eq!(clicks(&driver).len(), 1);
	}

	#[tokio::test]
	async fn open_picker_is_dismissed_before_clicking() {
		let driver = MockDriver::new();
		driver.add_control("#export");
		driver.add_overlay(".picker", true);

		assert_eq!(trigger().invoke(&driver).await.unwrap(), TriggerMethod::Click);
		let actions = driver.actions();
		let escape = actions.iter().position(|a| *a == MockAction::PressKey { key: "Escape".into() }).unwrap();
		let click = actions.iter().position(|a| matches!(a, MockAction::Click { .. })).unwrap();
		assert!(escape < click);
	}

	#[tokio::test]
	async fn waits_for_control_to_enable() {
		let driver = MockDriver::new();
		driver.add_control_with(
			"#export",
			MockControl {
				actionable_at: Some(Instant::now() + Duration::from_millis(50)),
				..MockControl::default()
			},
		);

		assert_eq!(trigger().invoke(&driver).await.unwrap(), TriggerMethod::Click);
	}

	#[tokio::test]
	async fn falls_back_to_forced_then_script_click() {
		let driver = MockDriver::new();
		driver.add_control_with(
			"#export",
			MockControl {
				reject_click: true,
				..MockControl::default()
			},
		);
		assert_eq!(trigger().invoke(&driver).await.unwrap(), TriggerMethod::ForcedClick);

		let driver = MockDriver::new();
		driver.add_control_with(
			"#export",
			MockControl {
				reject_click: true,
				reject_forced: true,
				..MockControl::default()
			},
		);
		assert_eq!(trigger().invoke(&driver).await.unwrap(), TriggerMethod::ScriptClick);
		assert_eq!(clicks(&driver).len(), 3);
	}

	#[tokio::test]
	async fn missing_control_is_not_found() {
		let driver = MockDriver::new();
		let err = trigger().invoke(&driver).await.unwrap_err();
		assert!(matches!(err, Error::ElementNotFound { .. }));
		assert!(clicks(&driver).is_empty());
	}

	#[tokio::test]
	async fn never_actionable_control_is_not_clicked() {
		let driver = MockDriver::new();
		driver.add_control_with(
			"#export",
			MockControl {
				actionable_at: None,
				..MockControl::default()
			},
		);

		let err = trigger().invoke(&driver).await.unwrap_err();
		assert!(err.is_timeout());
		assert!(clicks(&driver).is_empty());
	}

	#[tokio::test]
	async fn every_invocation_rejected() {
		let driver = MockDriver::new();
		driver.add_control_with(
			"#export",
			MockControl {
				reject_click: true,
				reject_forced: true,
				reject_script: true,
				..MockControl::default()
			},
		);

		let err = trigger().invoke(&driver).await.unwrap_err();
		assert!(matches!(err, Error::Driver(_)));
	}
}
