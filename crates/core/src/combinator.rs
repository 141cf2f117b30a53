//! "First success wins" combinators over ordered alternatives.
//!
//! [`first_verified`] walks alternatives one at a time and stops at the first
//! that verifies. [`first_ok`] runs alternatives concurrently as detached tasks
//! and resolves with the earliest success, honoring a primary/fallback tier.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Result of a sequential chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
	/// Index of the alternative that verified.
	pub winner: Option<usize>,
	/// Alternatives actually run.
	pub attempts: usize,
}

impl Verification {
	pub fn verified(&self) -> bool {
		self.winner.is_some()
	}
}

/// Runs `attempt` over `items` in order until one returns `true`.
///
/// No item after the verifying one is touched.
pub async fn first_verified<'a, S, F, Fut>(items: &'a [S], mut attempt: F) -> Verification
where
	F: FnMut(&'a S) -> Fut,
	Fut: Future<Output = bool>,
{
	for (index, item) in items.iter().enumerate() {
		if attempt(item).await {
			return Verification {
				winner: Some(index),
				attempts: index + 1,
			};
		}
	}
	Verification {
		winner: None,
		attempts: items.len(),
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
	Primary,
	/// Accepted only after every primary entrant has failed.
	Fallback,
}

/// One concurrently raced alternative.
pub struct Entrant<T, E> {
	pub label: String,
	pub tier: Tier,
	pub future: BoxFuture<'static, Result<T, E>>,
}

impl<T, E> Entrant<T, E> {
	pub fn new(label: impl Into<String>, tier: Tier, future: BoxFuture<'static, Result<T, E>>) -> Self {
		Self {
			label: label.into(),
			tier,
			future,
		}
	}
}

#[derive(Debug)]
pub struct Winner<T> {
	pub index: usize,
	pub label: String,
	pub value: T,
}

#[derive(Debug)]
pub struct RaceFailure<E> {
	/// Errors in the order entrants finished.
	pub errors: Vec<(String, E)>,
	/// Whether the deadline fired before every entrant reported.
	pub timed_out: bool,
}

/// Spawns every entrant and returns the earliest acceptable success.
///
/// Entrants that have not finished when a winner is chosen keep running
/// detached; their results are dropped. A fallback success is held back until
/// all primaries have failed (or the deadline passes).
pub async fn first_ok<T, E>(entrants: Vec<Entrant<T, E>>, deadline: Duration) -> Result<Winner<T>, RaceFailure<E>>
where
	T: Send + 'static,
	E: Send + 'static,
{
	let total = entrants.len();
	let primaries = entrants.iter().filter(|e| e.tier == Tier::Primary).count();
	let mut labels = Vec::with_capacity(total);
	let mut tiers = Vec::with_capacity(total);
	let (tx, mut rx) = mpsc::unbounded_channel();

	for (index, entrant) in entrants.into_iter().enumerate() {
		labels.push(entrant.label);
		tiers.push(entrant.tier);
		let tx = tx.clone();
		let future = entrant.future;
		tokio::spawn(async move {
			let result = future.await;
			let _ = tx.send((index, result));
		});
	}
	drop(tx);

	let expires = Instant::now() + deadline;
	let mut errors = Vec::new();
	let mut failed_primaries = 0;
	let mut held: Option<(usize, T)> = None;

	loop {
		if held.is_some() && failed_primaries == primaries {
			break;
		}
		let received = match tokio::time::timeout_at(expires, rx.recv()).await {
			Ok(received) => received,
			Err(_) => {
				if held.is_some() {
					break;
				}
				return Err(RaceFailure { errors, timed_out: true });
			}
		};
		let Some((index, result)) = received else {
			break;
		};
		match (result, tiers[index]) {
			(Ok(value), Tier::Primary) => {
				return Ok(Winner {
					index,
					label: labels[index].clone(),
					value,
				});
			}
			(Ok(value), Tier::Fallback) => {
				if held.is_none() {
					held = Some((index, value));
				}
			}
			(Err(e), tier) => {
				if tier == Tier::Primary {
					failed_primaries += 1;
				}
				errors.push((labels[index].clone(), e));
			}
		}
	}

	match held {
		Some((index, value)) => Ok(Winner {
			index,
			label: labels[index].clone(),
			value,
		}),
		None => Err(RaceFailure { errors, timed_out: false }),
	}
}
