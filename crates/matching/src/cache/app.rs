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

use chairline_sdk::types::{ChairId, ChairLocation, ChairTotalDistance, RideId, RideStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CacheError, LruCache};
use crate::store::RideStore;

/// Entry limits for each cache held by [`AppCache`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheCapacities {
	/// Limit for per-chair caches (distance, location, active rides, sessions)
	pub chairs: usize,
	/// Limit for the per-ride status cache
	pub rides: usize,
}

impl Default for CacheCapacities {
	fn default() -> Self {
		Self {
			chairs: 1_000,
			rides: 2_000,
		}
	}
}

/// Entry counts per cache, used for startup logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
	pub total_distances: u64,
	pub latest_locations: u64,
	pub active_rides: u64,
	pub sessions: u64,
	pub ride_statuses: u64,
}

/// Derived aggregates kept next to the backing store for fast lookups
///
/// An `AppCache` is built once by the composition root (normally through
/// [`crate::bootstrap::bootstrap_cache`]) and shared by reference with the
/// matching engine and request handlers.
///
/// Every accessor returns `Option` and never fails on a miss. Entries may be
/// evicted under capacity pressure, so callers that need an authoritative
/// answer must fall back to the store on `None`.
///
/// Read-modify-write helpers (`record_location`, `increment_active_rides`,
/// `record_ride_status`) are last-write-wins: two concurrent updates of the
/// same chair may lose one of the changes.
pub struct AppCache {
	chair_total_distances: LruCache<ChairId, ChairTotalDistance>,
	latest_chair_locations: LruCache<ChairId, ChairLocation>,
	active_rides: LruCache<ChairId, u32>,
	/// access_token -> chair_id
	chair_sessions: LruCache<String, ChairId>,
	latest_ride_statuses: LruCache<RideId, RideStatus>,
}

impl AppCache {
	/// Create empty caches with the given capacities
	pub fn new(capacities: &CacheCapacities) -> Result<Self, CacheError> {
		Ok(Self {
			chair_total_distances: LruCache::new("chair_total_distances", capacities.chairs)?,
			latest_chair_locations: LruCache::new("latest_chair_locations", capacities.chairs)?,
			active_rides: LruCache::new("active_rides", capacities.chairs)?,
			chair_sessions: LruCache::new("chair_sessions", capacities.chairs)?,
			latest_ride_statuses: LruCache::new("latest_ride_statuses", capacities.rides)?,
		})
	}

	pub fn total_distance(&self, chair_id: &str) -> Option<ChairTotalDistance> {
		self.chair_total_distances.get(chair_id)
	}

	pub fn latest_location(&self, chair_id: &str) -> Option<ChairLocation> {
		self.latest_chair_locations.get(chair_id)
	}

	pub fn active_rides(&self, chair_id: &str) -> Option<u32> {
		self.active_rides.get(chair_id)
	}

	pub fn chair_for_session(&self, access_token: &str) -> Option<ChairId> {
		self.chair_sessions.get(access_token)
	}

	pub fn latest_ride_status(&self, ride_id: &str) -> Option<RideStatus> {
		self.latest_ride_statuses.get(ride_id)
	}

	pub fn set_total_distance(&self, distance: ChairTotalDistance) -> Result<(), CacheError> {
		self.chair_total_distances
			.set(distance.chair_id.clone(), distance)
	}

	pub fn set_latest_location(&self, location: ChairLocation) -> Result<(), CacheError> {
		self.latest_chair_locations
			.set(location.chair_id.clone(), location)
	}

	pub fn set_active_rides(&self, chair_id: &str, count: u32) -> Result<(), CacheError> {
		self.active_rides.set(chair_id.to_string(), count)
	}

	pub fn set_latest_ride_status(&self, ride_id: &str, status: RideStatus) -> Result<(), CacheError> {
		self.latest_ride_statuses.set(ride_id.to_string(), status)
	}

	pub fn register_chair_session(&self, access_token: &str, chair_id: &str) -> Result<(), CacheError> {
		self.chair_sessions
			.set(access_token.to_string(), chair_id.to_string())
	}

	/// Record a new location sample for a chair
	///
	/// Adds the Manhattan distance from `previous` (if any) to the chair's
	/// running total and makes `sample` the chair's latest location. A chair
	/// with no cached total starts from 0.
	///
	/// Returns the updated total.
	pub fn record_location(
		&self,
		sample: &ChairLocation,
		previous: Option<&ChairLocation>,
	) -> Result<ChairTotalDistance, CacheError> {
		let delta = previous.map_or(0, |prev| sample.distance_from(prev));
		let current = self
			.chair_total_distances
			.get(&sample.chair_id)
			.map_or(0, |d| d.total_distance);

		let updated = ChairTotalDistance {
			chair_id: sample.chair_id.clone(),
			total_distance: current + delta,
			updated_at: Some(sample.created_at),
		};
		self.set_total_distance(updated.clone())?;
		self.set_latest_location(sample.clone())?;

		debug!(
			target: "cache",
			chair_id = %sample.chair_id,
			delta,
			total_distance = updated.total_distance,
			"Recorded chair location"
		);

		Ok(updated)
	}

	/// Record a location sample using the chair's latest location as the previous one
	///
	/// The latest location comes from the cache. When that entry has been
	/// evicted, the newest sample created before `sample` is read from the
	/// store instead, so eviction never drops a delta.
	pub async fn ingest_location(
		&self,
		store: &dyn RideStore,
		sample: &ChairLocation,
	) -> Result<ChairTotalDistance, CacheError> {
		let previous = match self.latest_location(&sample.chair_id) {
			Some(cached) => Some(cached),
			None => {
				debug!(
					target: "cache",
					chair_id = %sample.chair_id,
					"Latest location cache miss, asking store"
				);
				store
					.chair_location_before(&sample.chair_id, sample.created_at)
					.await?
			}
		};
		self.record_location(sample, previous.as_ref())
	}

	/// Count one more non-completed ride for a chair
	///
	/// A missing entry counts as 0. Returns the new count.
	pub fn increment_active_rides(&self, chair_id: &str) -> Result<u32, CacheError> {
		let count = self.active_rides(chair_id).unwrap_or(0).saturating_add(1);
		self.set_active_rides(chair_id, count)?;
		Ok(count)
	}

	/// Count one ride less for a chair, saturating at 0
	pub fn decrement_active_rides(&self, chair_id: &str) -> Result<u32, CacheError> {
		let current = self.active_rides(chair_id).unwrap_or(0);
		if current == 0 {
			warn!(
				target: "cache",
				chair_id,
				"Active ride count already zero on decrement"
			);
		}
		let count = current.saturating_sub(1);
		self.set_active_rides(chair_id, count)?;
		Ok(count)
	}

	/// Hook for the ride status collaborator
	///
	/// Updates the ride's latest status. When a ride assigned to `chair_id`
	/// reaches `COMPLETED`, the chair's active ride count is decremented so
	/// that the chair becomes idle for matching again.
	///
	/// `previous` is the ride's latest status in the store before this event.
	/// A `COMPLETED` that follows a `COMPLETED` is a duplicate and does not
	/// decrement again. The cached status is not consulted for this, since it
	/// may have been evicted.
	pub fn record_ride_status(
		&self,
		ride_id: &str,
		chair_id: Option<&str>,
		previous: Option<RideStatus>,
		status: RideStatus,
	) -> Result<(), CacheError> {
		self.set_latest_ride_status(ride_id, status)?;

		let newly_completed = status.is_completed() && !previous.is_some_and(|p| p.is_completed());
		if newly_completed && let Some(chair_id) = chair_id {
			self.decrement_active_rides(chair_id)?;
		}

		Ok(())
	}

	pub fn stats(&self) -> CacheStats {
		CacheStats {
			total_distances: self.chair_total_distances.entry_count(),
			latest_locations: self.latest_chair_locations.entry_count(),
			active_rides: self.active_rides.entry_count(),
			sessions: self.chair_sessions.entry_count(),
			ride_statuses: self.latest_ride_statuses.entry_count(),
		}
	}
}
