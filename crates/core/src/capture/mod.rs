//! Race between independent capture channels.
//!
//! Every channel is armed before the export is triggered so no event can be
//! missed. After the trigger, channels run as detached tasks and the first
//! payload wins; the directory poll is a fallback tier that only counts once
//! both primary channels have failed. Nothing is retried here.

pub mod channels;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::combinator::{Entrant, Tier, first_ok};
use crate::config::ExportConfig;
use crate::driver::{CapabilityDriver, ResponseFilter};
use crate::error::Error;

pub use channels::{CaptureChannel, DirectoryPollChannel, DownloadEventChannel, NetworkResponseChannel, looks_tabular};

/// Headroom on top of the per-channel timeout before the race gives up.
const DEFAULT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
	NetworkResponse,
	DownloadEvent,
	DirectoryPoll,
}

impl ChannelKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ChannelKind::NetworkResponse => "network-response",
			ChannelKind::DownloadEvent => "download-event",
			ChannelKind::DirectoryPoll => "directory-poll",
		}
	}

	pub fn tier(&self) -> Tier {
		match self {
			ChannelKind::DirectoryPoll => Tier::Fallback,
			_ => Tier::Primary,
		}
	}
}

impl std::fmt::Display for ChannelKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Captured export text and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
	/// Decoded lossily as UTF-8.
	pub text: String,
	pub channel: ChannelKind,
	pub suggested_filename: Option<String>,
	/// File the payload was read from (download and poll channels).
	pub source_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
	#[error("export trigger failed: {0}")]
	Trigger(#[source] Error),

	#[error("no capture channel produced data within {}ms: {}", .budget.as_millis(), .detail)]
	Timeout { budget: Duration, detail: String },
}

pub struct CaptureRace {
	channels: Vec<Box<dyn CaptureChannel>>,
	channel_timeout: Duration,
	grace: Duration,
}

impl CaptureRace {
	pub fn new(channels: Vec<Box<dyn CaptureChannel>>, channel_timeout: Duration) -> Self {
		Self {
			channels,
			channel_timeout,
			grace: DEFAULT_GRACE,
		}
	}

	pub fn with_grace(mut self, grace: Duration) -> Self {
		self.grace = grace;
		self
	}

	/// Enabled channels in priority order.
	pub fn from_config(config: &ExportConfig) -> Self {
		let capture = &config.capture;
		let mut channels: Vec<Box<dyn CaptureChannel>> = Vec::new();
		if capture.network {
			channels.push(Box::new(NetworkResponseChannel::new(ResponseFilter::from_settings(capture))));
		}
		if capture.download {
			channels.push(Box::new(DownloadEventChannel::new(&config.download_dir)));
		}
		if capture.directory_poll {
			channels.push(Box::new(DirectoryPollChannel::new(&config.download_dir, config.timeouts.poll_interval())));
		}
		Self::new(channels, config.timeouts.capture())
	}

	pub fn channel_kinds(&self) -> Vec<ChannelKind> {
		self.channels.iter().map(|c| c.kind()).collect()
	}

	/// Arms every channel, runs `trigger`, then returns the trigger's output and
	/// the first payload. Bounded by the channel timeout plus grace.
	pub async fn capture<T, Fut>(&self, driver: Arc<dyn CapabilityDriver>, trigger: Fut) -> Result<(T, RawPayload), CaptureError>
	where
		Fut: Future<Output = crate::Result<T>>,
	{
		let started = SystemTime::now();
		let mut entrants = Vec::with_capacity(self.channels.len());

		for channel in &self.channels {
			let kind = channel.kind();
			match channel.arm(driver.clone(), started).await {
				Ok(watcher) => {
					debug!(target = "taskex", channel = %kind, "channel armed");
					let budget = self.channel_timeout;
					let future = async move {
						match tokio::time::timeout(budget, watcher).await {
							Ok(result) => result,
							Err(_) => Err(Error::timeout(budget, kind.as_str())),
						}
					}
					.boxed();
					entrants.push((kind, Entrant::new(kind.as_str(), kind.tier(), future)));
				}
				Err(e) => warn!(target = "taskex", channel = %kind, error = %e, "channel could not be armed"),
			}
		}

		if entrants.is_empty() {
			return Err(CaptureError::Timeout {
				budget: Duration::ZERO,
				detail: "no capture channel could be armed".to_string(),
			});
		}

		let triggered = trigger.await.map_err(CaptureError::Trigger)?;

		let kinds: Vec<ChannelKind> = entrants.iter().map(|(k, _)| *k).collect();
		let entrants = entrants.into_iter().map(|(_, e)| e).collect();
		let deadline = self.channel_timeout + self.grace;

		match first_ok(entrants, deadline).await {
			Ok(winner) => {
				let payload = winner.value;
				info!(
					target = "taskex",
					channel = %kinds[winner.index],
					bytes = payload.text.len(),
					elapsed_ms = started.elapsed().unwrap_or_default().as_millis() as u64,
					"export captured"
				);
				Ok((triggered, payload))
			}
			Err(failure) => {
				for (label, error) in &failure.errors {
					warn!(target = "taskex", channel = %label, error = %error, "channel failed");
				}
				let mut detail = failure.errors.iter().map(|(label, e)| format!("{label}: {e}")).collect::<Vec<_>>().join("; ");
				if failure.timed_out {
					if !detail.is_empty() {
						detail.push_str("; ");
					}
					detail.push_str("overall capture deadline reached");
				}
				Err(CaptureError::Timeout {
					budget: self.channel_timeout,
					detail,
				})
			}
		}
	}
}
