// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod attempt;
mod stats;

pub use attempt::try_match;
pub use stats::{EngineStats, EngineStatsSnapshot};

use std::{sync::Arc, time::Duration};

use chairline_sdk::types::RideId;
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::{
	cache::{AppCache, CacheError},
	queue::{MatchingQueueReceiver, MatchingQueueSender},
	store::{RideStore, StoreError},
	types::{IdlenessSource, MatchOutcome},
};

/// Error types for matching engine operations
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Store error: {0}")]
	Store(#[from] StoreError),
	#[error("Cache error: {0}")]
	Cache(#[from] CacheError),
}

/// Configuration for the matching engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
	/// Random chair draws per match attempt
	pub sample_attempts: usize,
	/// Cooldown before a ride that failed to match goes back to the queue
	pub retry_delay: Duration,
	/// Maximum concurrently running match attempts (1 = serial)
	pub max_in_flight: usize,
	pub idleness_source: IdlenessSource,
	pub verbose_logging: bool,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			sample_attempts: 10,
			retry_delay: Duration::from_millis(100),
			max_in_flight: 1,
			idleness_source: IdlenessSource::Cache,
			verbose_logging: false,
		}
	}
}

/// Matching engine with a queue-driven dispatch loop
///
/// The MatchingEngine runs a dispatch loop on the tokio runtime, consuming
/// ride ids from the matching queue and running a match attempt for each.
///
/// Architecture:
/// - Queue-driven: one long-lived dispatcher awaits the queue or cancellation
/// - Bounded concurrency: at most `max_in_flight` attempts run at once;
///   the default of 1 executes attempts serially
/// - Retrying: rides that cannot be matched are re-enqueued after
///   `retry_delay`, with no ceiling on the number of retries
/// - Cancellable: the dispatcher, in-flight attempts and pending retries all
///   observe one `CancellationToken`
///
/// Re-enqueues run on their own tasks, so the dispatcher never waits on
/// its own full queue.
pub struct MatchingEngine {
	handle: Option<JoinHandle<()>>,
	cancel: CancellationToken,
	stats: Arc<EngineStats>,
}

/// Everything a match attempt task needs, cheap to clone
#[derive(Clone)]
struct Dispatcher {
	config: Arc<EngineConfig>,
	store: Arc<dyn RideStore>,
	cache: Arc<AppCache>,
	sender: MatchingQueueSender,
	tracker: TaskTracker,
	cancel: CancellationToken,
	stats: Arc<EngineStats>,
}

impl MatchingEngine {
	/// Start the matching engine
	///
	/// `sender` is the producer half of the same queue `receiver` belongs to;
	/// the engine uses it to re-enqueue rides. The engine stops when
	/// `cancel` is triggered or [`MatchingEngine::shutdown`] is called.
	///
	/// Must be called from within a tokio runtime.
	pub fn start(
		config: EngineConfig,
		store: Arc<dyn RideStore>,
		cache: Arc<AppCache>,
		receiver: MatchingQueueReceiver,
		sender: MatchingQueueSender,
		cancel: CancellationToken,
	) -> Self {
		let stats = Arc::new(EngineStats::default());
		let dispatcher = Dispatcher {
			config: Arc::new(config),
			store,
			cache,
			sender,
			tracker: TaskTracker::new(),
			cancel: cancel.clone(),
			stats: stats.clone(),
		};

		let handle = tokio::spawn(async move {
			info!(
				target: "matching",
				sample_attempts = dispatcher.config.sample_attempts,
				max_in_flight = dispatcher.config.max_in_flight,
				retry_delay_ms = dispatcher.config.retry_delay.as_millis() as u64,
				idleness_source = ?dispatcher.config.idleness_source,
				"Matching engine started"
			);
			dispatcher.run_dispatch_loop(receiver).await;
			info!(target: "matching", "Matching engine stopped");
		});

		Self {
			handle: Some(handle),
			cancel,
			stats,
		}
	}

	pub fn stats(&self) -> EngineStatsSnapshot {
		self.stats.snapshot()
	}

	/// Token observed by the engine; cancelling it stops the engine
	pub fn cancellation_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	/// Stop the engine and wait for in-flight attempts to finish
	///
	/// Returns the final counters.
	pub async fn shutdown(mut self) -> EngineStatsSnapshot {
		info!(target: "matching", "Shutting down matching engine");
		self.cancel.cancel();

		if let Some(handle) = self.handle.take()
			&& let Err(e) = handle.await
		{
			warn!(target: "matching", error = ?e, "Matching engine task panicked");
		}

		self.stats.snapshot()
	}
}

impl Drop for MatchingEngine {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

impl Dispatcher {
	/// Main dispatch loop
	///
	/// This loop:
	/// 1. Waits for a free attempt slot
	/// 2. Dequeues the next ride id
	/// 3. Spawns the match attempt, which re-enqueues the ride on failure
	async fn run_dispatch_loop(self, mut receiver: MatchingQueueReceiver) {
		let slots = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));

		loop {
			let permit = tokio::select! {
				biased;
				_ = self.cancel.cancelled() => break,
				permit = slots.clone().acquire_owned() => match permit {
					Ok(permit) => permit,
					Err(_) => break,
				},
			};

			let ride_id = tokio::select! {
				biased;
				_ = self.cancel.cancelled() => break,
				ride_id = receiver.recv() => match ride_id {
					Some(ride_id) => ride_id,
					None => {
						info!(target: "matching", "Matching queue closed");
						break;
					}
				},
			};

			if self.config.verbose_logging {
				debug!(
					target: "matching",
					ride_id = %ride_id,
					queued = self.sender.len(),
					"Dequeued ride"
				);
			}

			let dispatcher = self.clone();
			self.tracker.spawn(async move {
				dispatcher.process_ride(ride_id).await;
				drop(permit);
			});
		}

		self.tracker.close();
		self.tracker.wait().await;
	}

	async fn process_ride(&self, ride_id: RideId) {
		self.stats.record_attempt();

		let result = tokio::select! {
			biased;
			_ = self.cancel.cancelled() => {
				debug!(target: "matching", ride_id = %ride_id, "Match attempt cancelled");
				return;
			}
			result = try_match(self.store.as_ref(), &self.cache, &self.config, &ride_id) => result,
		};

		match result {
			Ok(MatchOutcome::Matched {
				chair_id,
				draws,
				active_rides,
				..
			}) => {
				self.stats.record_matched();
				info!(
					target: "matching",
					ride_id = %ride_id,
					chair_id = %chair_id,
					draws,
					active_rides,
					"Ride matched"
				);
			}
			Ok(MatchOutcome::NoIdleChair) => {
				self.stats.record_no_idle_chair();
				debug!(target: "matching", ride_id = %ride_id, "No idle chair, retrying later");
				self.requeue(ride_id);
			}
			Ok(outcome @ (MatchOutcome::AlreadyMatched | MatchOutcome::RideNotFound)) => {
				self.stats.record_dropped();
				debug!(
					target: "matching",
					ride_id = %ride_id,
					outcome = ?outcome,
					"Dropping queue entry"
				);
			}
			Err(EngineError::Store(e)) => {
				self.stats.record_failed();
				error!(target: "matching", ride_id = %ride_id, error = %e, "Match attempt failed");
				self.requeue(ride_id);
			}
			Err(e @ EngineError::Cache(_)) => {
				// The assignment is committed; only the cached count is off
				self.stats.record_failed();
				error!(
					target: "matching",
					ride_id = %ride_id,
					error = %e,
					"Cache update after match failed"
				);
			}
		}
	}

	/// Put a ride back at the tail of the queue after the retry cooldown
	///
	/// Runs on its own task so that a full queue never blocks the dispatcher.
	/// A retry pending at cancellation is abandoned; the ride is still
	/// unmatched in the store and gets seeded again on the next startup.
	fn requeue(&self, ride_id: RideId) {
		self.stats.record_requeued();

		let sender = self.sender.clone();
		let cancel = self.cancel.clone();
		let delay = self.config.retry_delay;

		self.tracker.spawn(async move {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					debug!(target: "matching", ride_id = %ride_id, "Retry abandoned on shutdown");
				}
				result = async {
					tokio::time::sleep(delay).await;
					if sender.is_full() {
						debug!(target: "matching", ride_id = %ride_id, "Matching queue full, retry waits for capacity");
					}
					sender.enqueue(ride_id.clone()).await
				} => match result {
					Ok(()) => {}
					Err(_) if sender.is_closed() => {
						debug!(target: "matching", ride_id = %ride_id, "Matching queue closed, retry dropped");
					}
					Err(e) => {
						warn!(target: "matching", ride_id = %ride_id, error = %e, "Failed to re-enqueue ride");
					}
				}
			}
		});
	}
}
