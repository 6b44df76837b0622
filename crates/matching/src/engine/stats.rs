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

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the dispatch loop
///
/// Updated with relaxed atomics; a snapshot is not a consistent cut across
/// counters.
#[derive(Debug, Default)]
pub struct EngineStats {
	attempts: AtomicU64,
	matched: AtomicU64,
	no_idle_chair: AtomicU64,
	requeued: AtomicU64,
	dropped: AtomicU64,
	failed: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
	/// Match attempts started
	pub attempts: u64,
	/// Attempts that committed an assignment
	pub matched: u64,
	/// Attempts that found no idle chair
	pub no_idle_chair: u64,
	/// Rides sent back to the queue
	pub requeued: u64,
	/// Queue entries discarded (ride already matched or gone)
	pub dropped: u64,
	/// Attempts that ended with a store or cache error
	pub failed: u64,
}

impl EngineStats {
	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_matched(&self) {
		self.matched.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_no_idle_chair(&self) {
		self.no_idle_chair.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_requeued(&self) {
		self.requeued.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_dropped(&self) {
		self.dropped.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failed(&self) {
		self.failed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> EngineStatsSnapshot {
		EngineStatsSnapshot {
			attempts: self.attempts.load(Ordering::Relaxed),
			matched: self.matched.load(Ordering::Relaxed),
			no_idle_chair: self.no_idle_chair.load(Ordering::Relaxed),
			requeued: self.requeued.load(Ordering::Relaxed),
			dropped: self.dropped.load(Ordering::Relaxed),
			failed: self.failed.load(Ordering::Relaxed),
		}
	}
}
