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

//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::time::Duration;

use chairline_matching::{
	AppCache, CacheCapacities, MemoryRideStore, RideStore,
	bootstrap_cache,
};
use chairline_sdk::types::{Chair, Coordinate, Ride, RideStatus};
use chrono::{DateTime, Utc};

pub fn base_time() -> DateTime<Utc> {
	DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn create_test_chair(id: &str, is_active: bool) -> Chair {
	Chair {
		id: id.to_string(),
		owner_id: "owner_1".to_string(),
		name: format!("chair {}", id),
		model: "test".to_string(),
		is_active,
		access_token: format!("token_{}", id),
		created_at: base_time(),
		updated_at: base_time(),
	}
}

pub fn create_test_ride(id: &str, chair_id: Option<&str>) -> Ride {
	Ride {
		id: id.to_string(),
		user_id: "user_1".to_string(),
		chair_id: chair_id.map(str::to_string),
		pickup: Coordinate::new(0, 0),
		destination: Coordinate::new(10, 10),
		created_at: base_time(),
		updated_at: base_time(),
	}
}

/// Insert a ride with a single status event
pub fn add_ride(store: &MemoryRideStore, ride_id: &str, chair_id: Option<&str>, status: RideStatus) {
	store.insert_ride(create_test_ride(ride_id, chair_id)).unwrap();
	store.push_ride_status(ride_id, status, base_time()).unwrap();
}

/// Bootstrap a cache sized for tests
pub async fn bootstrap(store: &MemoryRideStore) -> AppCache {
	bootstrap_cache(store as &dyn RideStore, &CacheCapacities::default())
		.await
		.unwrap()
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
	let deadline = tokio::time::Instant::now() + timeout;
	loop {
		if condition() {
			return true;
		}
		if tokio::time::Instant::now() >= deadline {
			return false;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
}

pub fn assigned_chair(store: &MemoryRideStore, ride_id: &str) -> Option<String> {
	store.ride(ride_id).unwrap().and_then(|ride| ride.chair_id)
}
