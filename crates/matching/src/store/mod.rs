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

mod fixture;
mod memory;

pub use fixture::{FixtureError, StoreFixture};
pub use memory::MemoryRideStore;

use async_trait::async_trait;
use chairline_sdk::types::{Chair, ChairLocation, Ride, RideId, RideStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Error types for backing store operations
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("Store unavailable: {0}")]
	Unavailable(String),
	#[error("Ride not found: {0}")]
	RideNotFound(String),
	#[error("Chair not found: {0}")]
	ChairNotFound(String),
	#[error("Ride already matched: {0}")]
	AlreadyMatched(String),
	#[error("Commit failed: {0}")]
	CommitFailed(String),
	#[error("Store error: {0}")]
	Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Ride Store trait - the authoritative relational backend
///
/// The matching core never owns chairs, rides, ride statuses or location
/// samples. It reads them through this trait and only ever writes the
/// `chair_id` assignment of a ride, inside a [`RideTransaction`].
///
/// The read methods are used at startup to rebuild the cache and seed the
/// matching queue; any error there is fatal to the caller.
#[async_trait]
pub trait RideStore: Send + Sync {
	/// All registered chairs
	async fn chairs(&self) -> StoreResult<Vec<Chair>>;

	/// All rides
	async fn rides(&self) -> StoreResult<Vec<Ride>>;

	/// Rides ever assigned to a chair, newest first
	async fn rides_by_chair(&self, chair_id: &str) -> StoreResult<Vec<Ride>>;

	/// Ids of rides without an assigned chair
	async fn unmatched_ride_ids(&self) -> StoreResult<Vec<RideId>>;

	/// Most recent status of a ride, `None` if it has no status history
	async fn latest_ride_status(&self, ride_id: &str) -> StoreResult<Option<RideStatus>>;

	/// All location samples of all chairs, in no particular order
	async fn chair_locations(&self) -> StoreResult<Vec<ChairLocation>>;

	/// Newest sample of a chair created strictly before `before`
	///
	/// Read path behind the latest-location cache when its entry is missing.
	async fn chair_location_before(
		&self,
		chair_id: &str,
		before: DateTime<Utc>,
	) -> StoreResult<Option<ChairLocation>>;

	/// Start a transaction for a match attempt
	async fn begin(&self) -> StoreResult<Box<dyn RideTransaction>>;
}

/// A single match attempt's unit of work
///
/// Writes become visible to other transactions only after [`commit`].
/// Dropping a transaction without committing must roll it back, so a
/// cancelled attempt never leaves a half-applied assignment behind.
///
/// [`commit`]: RideTransaction::commit
#[async_trait]
pub trait RideTransaction: Send {
	/// Draw one active chair uniformly at random, `None` if no chair is active
	async fn random_active_chair(&mut self) -> StoreResult<Option<Chair>>;

	/// Whether every ride assigned to the chair has reached `COMPLETED`
	async fn is_chair_idle(&mut self, chair_id: &str) -> StoreResult<bool>;

	/// Assign a chair to a ride that has no chair yet
	///
	/// Fails with [`StoreError::AlreadyMatched`] if the ride already has a
	/// chair and [`StoreError::RideNotFound`] if it does not exist.
	async fn assign_chair(&mut self, ride_id: &str, chair_id: &str) -> StoreResult<()>;

	async fn commit(self: Box<Self>) -> StoreResult<()>;

	async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
