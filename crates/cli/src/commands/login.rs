//! Interactive login: a headed browser at the login page, saved once the
//! user presses Enter or the timeout elapses.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use taskex::{CapabilityDriver, ChromiumDriver, ExportConfig, SessionStore};
use tracing::{info, warn};

use crate::cli::LoginArgs;
use crate::error::{CliError, Result};
use crate::output::{self, OutputFormat, ResultBuilder};

const COMMAND: &str = "login";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
	pub session_file: PathBuf,
	pub cookies: usize,
	pub origins: usize,
	/// The timeout elapsed before Enter was pressed.
	pub timed_out: bool,
}

pub async fn run(args: &LoginArgs, mut config: ExportConfig, format: OutputFormat) -> Result<()> {
	if let Some(url) = &args.base_url {
		config.base_url = url.clone();
	}
	let url = config.login_url();
	let store = SessionStore::from_config(&config);
	info!(target = "taskex.cli", %url, path = %store.path().display(), "starting interactive login");

	let driver = ChromiumDriver::launch_headed(&config).await.map_err(|e| CliError::BrowserLaunch(e.to_string()))?;
	let outcome = capture_session(&driver, &config, &store, &url, args.timeout_secs).await;
	if let Err(e) = driver.close().await {
		warn!(target = "taskex.cli", error = %e, "failed to close browser");
	}
	let data = outcome?;

	eprintln!();
	eprintln!("Session saved to: {}", data.session_file.display());
	eprintln!("  Cookies: {}", data.cookies);
	eprintln!("  Origins with localStorage: {}", data.origins);

	let result = ResultBuilder::new(COMMAND).data(data).build();
	output::print_result(&result, format);
	Ok(())
}

async fn capture_session(
	driver: &ChromiumDriver,
	config: &ExportConfig,
	store: &SessionStore,
	url: &str,
	timeout_secs: u64,
) -> Result<LoginData> {
	driver.navigate(url, config.timeouts.navigation()).await.map_err(CliError::in_command(COMMAND))?;

	eprintln!("Browser opened at: {url}");
	eprintln!();
	eprintln!("Log in manually, then press Enter to save the session.");
	eprintln!("(Or wait {timeout_secs} seconds for auto-save)");

	let stdin_future = tokio::task::spawn_blocking(|| {
		let mut input = String::new();
		std::io::stdin().read_line(&mut input).ok();
	});
	let timeout_future = tokio::time::sleep(Duration::from_secs(timeout_secs));

	let timed_out = tokio::select! {
		_ = stdin_future => {
			eprintln!("Saving session...");
			false
		}
		_ = timeout_future => {
			eprintln!();
			eprintln!("Timeout reached, saving session...");
			true
		}
	};

	let snapshot = driver.storage_snapshot().await.map_err(CliError::in_command(COMMAND))?;
	if snapshot.cookies.is_empty() {
		warn!(target = "taskex.cli", "captured session has no cookies; the login may not have completed");
	}
	store.save(&snapshot).map_err(CliError::in_command(COMMAND))?;

	Ok(LoginData {
		session_file: store.path().to_path_buf(),
		cookies: snapshot.cookies.len(),
		origins: snapshot.origins.len(),
		timed_out,
	})
}
