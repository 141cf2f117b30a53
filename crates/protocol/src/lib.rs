//! Data model shared by the taskex pipeline and its command-line surface.
//!
//! # Main Types
//!
//! - [`StorageSnapshot`] - persisted authenticated browser state (cookies + localStorage)
//! - [`TaskRecord`] / [`TaskStatus`] - one parsed export row
//! - [`TaskSummary`] - counts and total duration over a record set
//! - [`ExportOutcome`] / [`FailureReason`] - terminal result of an export run

pub mod outcome;
pub mod snapshot;
pub mod task;

pub use outcome::{Artifact, ArtifactType, ExportFailure, ExportOutcome, ExportWarning, FailureReason};
pub use snapshot::{Cookie, LocalStorageEntry, OriginState, SameSite, StorageSnapshot};
pub use task::{TaskRecord, TaskStatus, TaskSummary};
