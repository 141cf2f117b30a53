//! Resilient browser-driven export pipeline.
//!
//! The pipeline reuses a persisted authenticated session, waits for a
//! client-rendered page to settle, fills a date-range form through a verified
//! strategy chain, triggers an export and races several capture channels for
//! the resulting CSV, which is finally parsed into [`TaskRecord`]s.
//!
//! All browser access goes through [`CapabilityDriver`]. The `chromium` feature
//! provides a real implementation; [`testing::MockDriver`] is a scripted double.
//!
//! ```ignore
//! use std::sync::Arc;
//! use taskex::{ExportConfig, ExportOrchestrator, ExportRequest};
//!
//! let config = ExportConfig::load_or_default(None)?;
//! let driver = Arc::new(taskex::ChromiumDriver::launch(&config).await?);
//! let request = ExportRequest::parse(Some("2025-06-01"), Some("2025-06-30"))?;
//! let outcome = ExportOrchestrator::new(config, driver).run(&request).await;
//! ```

pub mod artifacts;
pub mod capture;
pub mod combinator;
pub mod config;
pub mod csv;
pub mod date_input;
pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod readiness;
pub mod request;
pub mod session;
pub mod testing;
pub mod trigger;

pub use capture::{CaptureRace, ChannelKind, RawPayload};
pub use config::{CaptureSettings, ExportConfig, Selectors, Timeouts};
pub use csv::{CsvRecordParser, RecordSchema, summarize};
pub use date_input::{DateRangeInputEngine, FieldOutcome, RangeOutcome};
#[cfg(feature = "chromium")]
pub use driver::chromium::ChromiumDriver;
pub use driver::{CapabilityDriver, ClickOptions, CapturedResponse, DirEntryInfo, DownloadedFile, ResponseFilter};
pub use error::{Error, Result};
pub use orchestrator::{ExportOrchestrator, ExportState};
pub use readiness::{Readiness, ReadinessWaiter};
pub use request::ExportRequest;
pub use session::{SessionRecord, SessionStore};
pub use taskex_protocol::{
	Artifact, ArtifactType, Cookie, ExportFailure, ExportOutcome, ExportWarning, FailureReason, StorageSnapshot, TaskRecord, TaskStatus,
	TaskSummary,
};
pub use trigger::{ExportTrigger, TriggerMethod};
