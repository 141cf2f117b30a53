//! Date-range input through a verified strategy chain.
//!
//! The remote date picker is a reactive third-party widget that does not
//! reliably sync its internal state with any single input technique. Each
//! [`DateFieldStrategy`] writes the field one way; the engine reads the field
//! back after every attempt and stops at the first strategy whose read-back
//! matches the target (ignoring `/`, `-`, `.` and whitespace).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::combinator::first_verified;
use crate::driver::CapabilityDriver;
use crate::error::Result;

/// Assigns `value` through the DOM and fires the events reactive frameworks listen for.
///
/// Called with `[selector, value]`.
pub const SCRIPTED_VALUE_JS: &str = r#"(selector, value) => {
	const el = document.querySelector(selector);
	if (!el) return false;
	const proto = Object.getPrototypeOf(el);
	const setter = Object.getOwnPropertyDescriptor(proto, 'value')?.set;
	if (setter) setter.call(el, value); else el.value = value;
	for (const type of ['input', 'change', 'blur']) {
		el.dispatchEvent(new Event(type, { bubbles: true }));
	}
	return true;
}"#;

/// One way of writing a field. Strategies hold no state between calls.
#[async_trait]
pub trait DateFieldStrategy: Send + Sync {
	fn name(&self) -> &'static str;

	async fn write(&self, driver: &dyn CapabilityDriver, selector: &str, value: &str) -> Result<()>;
}

/// The driver's native value assignment.
pub struct NativeSetValue;

#[async_trait]
impl DateFieldStrategy for NativeSetValue {
	fn name(&self) -> &'static str {
		"native-set-value"
	}

	async fn write(&self, driver: &dyn CapabilityDriver, selector: &str, value: &str) -> Result<()> {
		driver.set_value(selector, value).await
	}
}

/// Focus, select the existing text, type over it.
pub struct SelectAllAndType;

#[async_trait]
impl DateFieldStrategy for SelectAllAndType {
	fn name(&self) -> &'static str {
		"select-all-and-type"
	}

	async fn write(&self, driver: &dyn CapabilityDriver, selector: &str, value: &str) -> Result<()> {
		driver.focus(selector).await?;
		driver.select_all(selector).await?;
		driver.type_text(selector, value).await
	}
}

/// Focus, clear, type.
pub struct ClearAndType;

#[async_trait]
impl DateFieldStrategy for ClearAndType {
	fn name(&self) -> &'static str {
		"clear-and-type"
	}

	async fn write(&self, driver: &dyn CapabilityDriver, selector: &str, value: &str) -> Result<()> {
		driver.focus(selector).await?;
		driver.clear(selector).await?;
		driver.type_text(selector, value).await
	}
}

/// DOM value mutation plus synthetic `input`/`change`/`blur` events.
pub struct ScriptedMutation;

#[async_trait]
impl DateFieldStrategy for ScriptedMutation {
	fn name(&self) -> &'static str {
		"scripted-mutation"
	}

	async fn write(&self, driver: &dyn CapabilityDriver, selector: &str, value: &str) -> Result<()> {
		driver.evaluate(SCRIPTED_VALUE_JS, vec![json!(selector), json!(value)]).await?;
		Ok(())
	}
}

/// Result of setting one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
	pub selector: String,
	pub target: String,
	/// Name of the strategy whose read-back matched.
	pub verified_by: Option<&'static str>,
	pub attempts: usize,
	/// Last value read back, if any read succeeded.
	pub last_read: Option<String>,
}

impl FieldOutcome {
	pub fn verified(&self) -> bool {
		self.verified_by.is_some()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeOutcome {
	pub start: FieldOutcome,
	pub end: FieldOutcome,
}

impl RangeOutcome {
	pub fn start_ok(&self) -> bool {
		self.start.verified()
	}

	pub fn end_ok(&self) -> bool {
		self.end.verified()
	}
}

pub struct DateRangeInputEngine {
	strategies: Vec<Box<dyn DateFieldStrategy>>,
	/// Pause between a write and its read-back, for widgets that re-render asynchronously.
	verify_delay: Duration,
}

impl Default for DateRangeInputEngine {
	fn default() -> Self {
		Self::new(Duration::from_millis(100))
	}
}

impl DateRangeInputEngine {
	pub fn new(verify_delay: Duration) -> Self {
		Self::with_strategies(Self::default_strategies(), verify_delay)
	}

	pub fn with_strategies(strategies: Vec<Box<dyn DateFieldStrategy>>, verify_delay: Duration) -> Self {
		Self { strategies, verify_delay }
	}

	pub fn default_strategies() -> Vec<Box<dyn DateFieldStrategy>> {
		vec![
			Box::new(NativeSetValue),
			Box::new(SelectAllAndType),
			Box::new(ClearAndType),
			Box::new(ScriptedMutation),
		]
	}

	pub fn strategy_names(&self) -> Vec<&'static str> {
		self.strategies.iter().map(|s| s.name()).collect()
	}

	pub async fn set_field(&self, driver: &dyn CapabilityDriver, selector: &str, target: &str) -> bool {
		self.set_field_detailed(driver, selector, target).await.verified()
	}

	/// Tries strategies in order until one verifies. A failing write counts as
	/// an unverified attempt. When nothing verifies the field keeps whatever the
	/// last attempt produced.
	pub async fn set_field_detailed(&self, driver: &dyn CapabilityDriver, selector: &str, target: &str) -> FieldOutcome {
		let last_read = std::sync::Mutex::new(None);
		let verify_delay = self.verify_delay;

		let verification = first_verified(&self.strategies, |strategy| {
			let last_read = &last_read;
			async move {
				if let Err(e) = strategy.write(driver, selector, target).await {
					debug!(target = "taskex", selector, strategy = strategy.name(), error = %e, "date write failed");
					return false;
				}
				if !verify_delay.is_zero() {
					tokio::time::sleep(verify_delay).await;
				}
				match driver.read_value(selector).await {
					Ok(read) => {
						let matched = same_date_text(&read, target);
						debug!(target = "taskex", selector, strategy = strategy.name(), %read, matched, "date read-back");
						if let Ok(mut slot) = last_read.lock() {
							*slot = Some(read);
						}
						matched
					}
					Err(e) => {
						debug!(target = "taskex", selector, strategy = strategy.name(), error = %e, "date read-back failed");
						false
					}
				}
			}
		})
		.await;

		let verified_by = verification.winner.map(|i| self.strategies[i].name());
		match verified_by {
			Some(name) => info!(target = "taskex", selector, value = target, strategy = name, attempts = verification.attempts, "date field set"),
			None => warn!(target = "taskex", selector, value = target, attempts = verification.attempts, "date field unverified"),
		}
		FieldOutcome {
			selector: selector.to_string(),
			target: target.to_string(),
			verified_by,
			attempts: verification.attempts,
			last_read: last_read.into_inner().unwrap_or_default(),
		}
	}

	pub async fn fill_range(&self, driver: &dyn CapabilityDriver, start_field: &str, end_field: &str, start: &str, end: &str) -> RangeOutcome {
		let start = self.set_field_detailed(driver, start_field, start).await;
		let end = self.set_field_detailed(driver, end_field, end).await;
		RangeOutcome { start, end }
	}
}

/// Compares date text with separators and whitespace removed.
pub fn same_date_text(read: &str, target: &str) -> bool {
	fn strip(s: &str) -> String {
		s.chars().filter(|c| !matches!(c, '/' | '-' | '.') && !c.is_whitespace()).collect()
	}
	let target = strip(target);
	!target.is_empty() && strip(read) == target
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{MockAction, MockDriver, MockField};

	fn engine() -> DateRangeInputEngine {
		DateRangeInputEngine::new(Duration::ZERO)
	}

	#[test]
	fn comparison_ignores_separators() {
		assert!(same_date_text("2025/06/01", "2025-06-01"));
		assert!(same_date_text(" 2025.06.01 ", "20250601"));
		assert!(!same_date_text("2025-06-02", "2025-06-01"));
		assert!(!same_date_text("", ""));
	}

	#[tokio::test]
	async fn native_set_value_short_circuits_the_chain() {
		let driver = MockDriver::new();
		driver.add_field("#start", MockField::default());

		let outcome = engine().set_field_detailed(&driver, "#start", "2025-06-01").await;
		assert_eq!(outcome.verified_by, Some("native-set-value"));
		assert_eq!(outcome.attempts, 1);
		assert!(!driver.actions().iter().any(|a| matches!(a, MockAction::Focus { .. } | MockAction::ScriptSetValue { .. })));
	}

	#[tokio::test]
	async fn falls_through_to_script_mutation() {
		let driver = MockDriver::new();
		driver.add_field("#start", MockField::script_only());

		let outcome = engine().set_field_detailed(&driver, "#start", "2025-06-01").await;
		assert_eq!(outcome.verified_by, Some("scripted-mutation"));
		assert_eq!(outcome.attempts, 4);
		assert_eq!(driver.field_value("#start").unwrap(), "2025-06-01");
	}

	#[tokio::test]
	async fn clear_and_type_rescues_failed_selection() {
		let driver = MockDriver::new();
		driver.add_field(
			"#end",
			MockField {
				value: "2024-01-01".into(),
				ignore_set_value: true,
				reject_select_all: true,
				..MockField::default()
			},
		);

		let outcome = engine().set_field_detailed(&driver, "#end", "2025-06-30").await;
		assert_eq!(outcome.verified_by, Some("clear-and-type"));
		assert_eq!(outcome.attempts, 3);
		assert!(!driver.actions().iter().any(|a| matches!(a, MockAction::ScriptSetValue { .. })));
	}

	#[tokio::test]
	async fn reformatted_read_back_still_verifies() {
		let driver = MockDriver::new();
		driver.add_field(
			"#start",
			MockField {
				display_separator: Some('/'),
				..MockField::default()
			},
		);
		assert!(engine().set_field(&driver, "#start", "2025-06-01").await);
	}

	#[tokio::test]
	async fn unverified_field_runs_every_strategy() {
		let driver = MockDriver::new();
		driver.add_field("#start", MockField::read_only("2020-01-01"));

		let outcome = engine().set_field_detailed(&driver, "#start", "2025-06-01").await;
		assert!(!outcome.verified());
		assert_eq!(outcome.attempts, 4);
		assert_eq!(outcome.last_read.as_deref(), Some("2020-01-01"));
	}

	#[tokio::test]
	async fn fill_range_reports_each_field() {
		let driver = MockDriver::new();
		driver.add_field("#start", MockField::default());
		driver.add_field("#end", MockField::read_only(""));

		let outcome = engine().fill_range(&driver, "#start", "#end", "2025-06-01", "2025-06-30").await;
		assert!(outcome.start_ok());
		assert!(!outcome.end_ok());
	}

	#[tokio::test]
	async fn missing_field_is_unverified_not_fatal() {
		let driver = MockDriver::new();
		assert!(!engine().set_field(&driver, "#nowhere", "2025-06-01").await);
	}
}
