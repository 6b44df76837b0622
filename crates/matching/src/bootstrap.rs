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

//! Startup recovery of derived state
//!
//! The cache is never persisted. At process start it is rebuilt from the
//! store in four phases:
//!
//! 1. Replay every chair's location samples in creation order into a running
//!    total distance
//! 2. Seed each chair's latest location
//! 3. Seed session tokens and active ride counts per chair, and a zero total
//!    distance for chairs without any sample
//! 4. Seed the latest status of every ride
//!
//! Once the engine is running, every unmatched ride is pushed onto the
//! matching queue, so rides left unmatched by a previous run are never lost.
//!
//! Any failure is fatal: serving with partially seeded caches would let the
//! engine hand a busy chair a second ride.

use std::collections::HashMap;

use chairline_sdk::types::{ChairId, ChairLocation, ChairTotalDistance};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
	cache::{AppCache, CacheCapacities, CacheError},
	queue::{MatchingQueueSender, QueueError},
	store::{RideStore, StoreError},
};

/// Error types for startup recovery
#[derive(Debug, Error)]
pub enum BootstrapError {
	#[error("Store error: {0}")]
	Store(#[from] StoreError),
	#[error("Cache error: {0}")]
	Cache(#[from] CacheError),
	#[error("Ride {0} has no status history")]
	MissingRideStatus(String),
	#[error("Queue error: {0}")]
	Queue(#[from] QueueError),
}

/// Build and populate the application cache from the store
pub async fn bootstrap_cache(
	store: &dyn RideStore,
	capacities: &CacheCapacities,
) -> Result<AppCache, BootstrapError> {
	info!(target: "bootstrap", "Bootstrapping application cache...");
	let cache = AppCache::new(capacities)?;

	// Phase 1 + 2: location history
	let locations = store.chair_locations().await?;
	let sample_count = locations.len();
	for (chair_id, samples) in group_locations_by_chair(locations) {
		let (total, latest) = replay_locations(&chair_id, samples);
		cache.set_total_distance(total)?;
		if let Some(latest) = latest {
			cache.set_latest_location(latest)?;
		}
	}
	info!(target: "bootstrap", samples = sample_count, "Replayed chair locations");

	// Phase 3: sessions and active ride counts
	let chairs = store.chairs().await?;
	for chair in &chairs {
		cache.register_chair_session(&chair.access_token, &chair.id)?;

		// Chairs that never reported a location still start at distance 0
		if cache.total_distance(&chair.id).is_none() {
			cache.set_total_distance(ChairTotalDistance {
				chair_id: chair.id.clone(),
				total_distance: 0,
				updated_at: None,
			})?;
		}

		let mut active = 0u32;
		for ride in store.rides_by_chair(&chair.id).await? {
			let status = store
				.latest_ride_status(&ride.id)
				.await?
				.ok_or_else(|| BootstrapError::MissingRideStatus(ride.id.clone()))?;
			if !status.is_completed() {
				active += 1;
			}
		}
		cache.set_active_rides(&chair.id, active)?;
		debug!(target: "bootstrap", chair_id = %chair.id, active_rides = active, "Seeded chair");
	}
	info!(target: "bootstrap", chairs = chairs.len(), "Seeded chair sessions and active rides");

	// Phase 4: latest ride statuses
	let rides = store.rides().await?;
	for ride in &rides {
		let status = store
			.latest_ride_status(&ride.id)
			.await?
			.ok_or_else(|| BootstrapError::MissingRideStatus(ride.id.clone()))?;
		cache.set_latest_ride_status(&ride.id, status)?;
	}
	info!(target: "bootstrap", rides = rides.len(), "Seeded latest ride statuses");

	let stats = cache.stats();
	info!(
		target: "bootstrap",
		total_distances = stats.total_distances,
		latest_locations = stats.latest_locations,
		active_rides = stats.active_rides,
		sessions = stats.sessions,
		ride_statuses = stats.ride_statuses,
		"Application cache ready"
	);

	Ok(cache)
}

/// Push every unmatched ride onto the matching queue
///
/// Waits for queue capacity, so with more unmatched rides than the queue
/// holds this must run after the engine has started consuming.
///
/// Returns the number of rides enqueued.
pub async fn seed_matching_queue(
	store: &dyn RideStore,
	sender: &MatchingQueueSender,
) -> Result<usize, BootstrapError> {
	let ride_ids = store.unmatched_ride_ids().await?;
	let count = ride_ids.len();

	for ride_id in ride_ids {
		sender.enqueue(ride_id).await?;
	}

	info!(target: "bootstrap", rides = count, "Seeded matching queue with unmatched rides");
	Ok(count)
}

fn group_locations_by_chair(locations: Vec<ChairLocation>) -> HashMap<ChairId, Vec<ChairLocation>> {
	let mut by_chair: HashMap<ChairId, Vec<ChairLocation>> = HashMap::new();
	for location in locations {
		by_chair
			.entry(location.chair_id.clone())
			.or_default()
			.push(location);
	}
	by_chair
}

/// Fold one chair's samples into its total distance and latest sample
///
/// Produces the same total as feeding the samples one at a time through
/// [`AppCache::record_location`].
fn replay_locations(
	chair_id: &str,
	mut samples: Vec<ChairLocation>,
) -> (ChairTotalDistance, Option<ChairLocation>) {
	samples.sort_by_key(|sample| sample.created_at);

	let total_distance: i64 = samples
		.windows(2)
		.map(|pair| pair[1].distance_from(&pair[0]))
		.sum();
	let latest = samples.pop();

	let total = ChairTotalDistance {
		chair_id: chair_id.to_string(),
		total_distance,
		updated_at: latest.as_ref().map(|sample| sample.created_at),
	};
	(total, latest)
}
