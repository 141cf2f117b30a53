//! SPA readiness heuristic.
//!
//! Client-rendered pages never reach a reliable "network idle" point, so the
//! page counts as ready once every transient loading marker is gone and a
//! fixed settle delay has passed.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::ExportConfig;
use crate::driver::CapabilityDriver;

/// What the waiter observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
	/// Markers still present when the shared budget ran out.
	pub lingering: Vec<String>,
	pub elapsed: Duration,
}

impl Readiness {
	pub fn markers_cleared(&self) -> bool {
		self.lingering.is_empty()
	}
}

#[derive(Debug, Clone)]
pub struct ReadinessWaiter {
	markers: Vec<String>,
	budget: Duration,
	settle: Duration,
}

impl ReadinessWaiter {
	pub fn new(markers: Vec<String>, budget: Duration, settle: Duration) -> Self {
		Self { markers, budget, settle }
	}

	pub fn from_config(config: &ExportConfig) -> Self {
		Self::new(
			config.selectors.loading_markers.clone(),
			config.timeouts.loading(),
			config.timeouts.settle(),
		)
	}

	/// Never fails; at worst returns after `budget + settle`.
	pub async fn wait(&self, driver: &dyn CapabilityDriver) -> Readiness {
		let started = Instant::now();
		let deadline = started + self.budget;
		let mut lingering = Vec::new();

		for marker in &self.markers {
			let remaining = deadline.saturating_duration_since(Instant::now());
			if let Err(e) = driver.wait_for_absence(marker, remaining).await {
				debug!(target = "taskex", marker = %marker, error = %e, "loading marker still present, continuing");
				lingering.push(marker.clone());
			}
		}

		tokio::time::sleep(self.settle).await;

		let readiness = Readiness {
			lingering,
			elapsed: started.elapsed(),
		};
		debug!(
			target = "taskex",
			cleared = readiness.markers_cleared(),
			elapsed_ms = readiness.elapsed.as_millis() as u64,
			"page settled"
		);
		readiness
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::MockDriver;

	#[tokio::test]
	async fn absent_markers_only_cost_the_settle_delay() {
		let driver = MockDriver::new();
		let waiter = ReadinessWaiter::new(vec![".loading".into()], Duration::from_secs(5), Duration::from_millis(20));

		let readiness = waiter.wait(&driver).await;
		assert!(readiness.markers_cleared());
		assert!(readiness.elapsed >= Duration::from_millis(20));
		assert!(readiness.elapsed < Duration::from_secs(1));
	}

	#[tokio::test]
	async fn waits_for_marker_to_disappear() {
		let driver = MockDriver::new();
		driver.show_for(".skeleton", Duration::from_millis(60));
		let waiter = ReadinessWaiter::new(vec![".skeleton".into()], Duration::from_secs(2), Duration::ZERO);

		let readiness = waiter.wait(&driver).await;
		assert!(readiness.markers_cleared());
		assert!(readiness.elapsed >= Duration::from_millis(50));
	}

	#[tokio::test]
	async fn stuck_markers_share_one_budget() {
		let driver = MockDriver::new();
		driver.set_count(".spinner", 1);
		driver.set_count(".mask", 1);
		let waiter = ReadinessWaiter::new(vec![".spinner".into(), ".mask".into()], Duration::from_millis(80), Duration::ZERO);

		let readiness = waiter.wait(&driver).await;
		assert_eq!(readiness.lingering, vec![".spinner".to_string(), ".mask".to_string()]);
		assert!(readiness.elapsed < Duration::from_millis(400));
	}
}
