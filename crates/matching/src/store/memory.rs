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

use std::{
	collections::{BTreeMap, HashMap},
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicBool, Ordering},
	},
};

use async_trait::async_trait;
use chairline_sdk::types::{
	Chair, ChairId, ChairLocation, Ride, RideId, RideStatus, RideStatusEvent, new_id,
};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;

use super::{RideStore, RideTransaction, StoreError, StoreFixture, StoreResult};

#[derive(Default)]
struct StoreState {
	chairs: BTreeMap<ChairId, Chair>,
	rides: BTreeMap<RideId, Ride>,
	/// Status history per ride, in insertion order
	ride_statuses: HashMap<RideId, Vec<RideStatusEvent>>,
	chair_locations: Vec<ChairLocation>,
}

impl StoreState {
	fn latest_status(&self, ride_id: &str) -> Option<RideStatus> {
		self.ride_statuses
			.get(ride_id)?
			.iter()
			.max_by_key(|event| event.created_at)
			.map(|event| event.status)
	}

	/// A ride without any status history counts as not completed
	fn is_ride_completed(&self, ride_id: &str) -> bool {
		self.latest_status(ride_id)
			.is_some_and(|status| status.is_completed())
	}
}

#[derive(Default)]
struct FaultInjection {
	unavailable: AtomicBool,
	fail_next_commit: AtomicBool,
}

/// In-memory implementation of the Ride Store
///
/// This implementation keeps every table in a single mutex-protected state
/// and provides read-committed transactions:
/// - Reads inside a transaction see committed data plus the transaction's
///   own pending writes
/// - Writes are buffered and applied atomically on commit
/// - Dropping or rolling back a transaction discards its writes
///
/// Two transactions may therefore both observe the same chair as idle and
/// both commit an assignment to it. This mirrors the race of a relational
/// backend running at read-committed isolation.
///
/// Characteristics:
/// - No durability
/// - Fault injection for exercising error paths
/// - Cheap to clone; clones share the same state
#[derive(Clone, Default)]
pub struct MemoryRideStore {
	state: Arc<Mutex<StoreState>>,
	faults: Arc<FaultInjection>,
}

fn lock_state(state: &Mutex<StoreState>) -> StoreResult<MutexGuard<'_, StoreState>> {
	state
		.lock()
		.map_err(|_| StoreError::Backend("store state lock poisoned".to_string()))
}

impl MemoryRideStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build a store pre-populated with a fixture
	pub fn from_fixture(fixture: StoreFixture) -> StoreResult<Self> {
		let store = Self::new();
		{
			let mut state = lock_state(&store.state)?;
			for chair in fixture.chairs {
				state.chairs.insert(chair.id.clone(), chair);
			}
			for ride in fixture.rides {
				state.rides.insert(ride.id.clone(), ride);
			}
			for event in fixture.ride_statuses {
				state
					.ride_statuses
					.entry(event.ride_id.clone())
					.or_default()
					.push(event);
			}
			state.chair_locations.extend(fixture.chair_locations);
		}
		Ok(store)
	}

	/// Make every subsequent operation fail with [`StoreError::Unavailable`]
	pub fn set_unavailable(&self, unavailable: bool) {
		self.faults.unavailable.store(unavailable, Ordering::SeqCst);
	}

	/// Make the next commit fail with [`StoreError::CommitFailed`]
	pub fn fail_next_commit(&self) {
		self.faults.fail_next_commit.store(true, Ordering::SeqCst);
	}

	fn check_available(&self) -> StoreResult<()> {
		check_available(&self.faults)
	}

	pub fn insert_chair(&self, chair: Chair) -> StoreResult<()> {
		lock_state(&self.state)?
			.chairs
			.insert(chair.id.clone(), chair);
		Ok(())
	}

	pub fn set_chair_active(&self, chair_id: &str, is_active: bool) -> StoreResult<()> {
		let mut state = lock_state(&self.state)?;
		let chair = state
			.chairs
			.get_mut(chair_id)
			.ok_or_else(|| StoreError::ChairNotFound(chair_id.to_string()))?;
		chair.is_active = is_active;
		chair.updated_at = Utc::now();
		Ok(())
	}

	pub fn insert_ride(&self, ride: Ride) -> StoreResult<()> {
		lock_state(&self.state)?.rides.insert(ride.id.clone(), ride);
		Ok(())
	}

	pub fn ride(&self, ride_id: &str) -> StoreResult<Option<Ride>> {
		Ok(lock_state(&self.state)?.rides.get(ride_id).cloned())
	}

	/// Append a status event to a ride's history
	pub fn push_ride_status(
		&self,
		ride_id: &str,
		status: RideStatus,
		created_at: DateTime<Utc>,
	) -> StoreResult<()> {
		let mut state = lock_state(&self.state)?;
		if !state.rides.contains_key(ride_id) {
			return Err(StoreError::RideNotFound(ride_id.to_string()));
		}
		state
			.ride_statuses
			.entry(ride_id.to_string())
			.or_default()
			.push(RideStatusEvent {
				id: new_id(),
				ride_id: ride_id.to_string(),
				status,
				created_at,
			});
		Ok(())
	}

	pub fn insert_location(&self, location: ChairLocation) -> StoreResult<()> {
		lock_state(&self.state)?.chair_locations.push(location);
		Ok(())
	}
}

fn check_available(faults: &FaultInjection) -> StoreResult<()> {
	if faults.unavailable.load(Ordering::SeqCst) {
		return Err(StoreError::Unavailable(
			"memory store marked unavailable".to_string(),
		));
	}
	Ok(())
}

#[async_trait]
impl RideStore for MemoryRideStore {
	async fn chairs(&self) -> StoreResult<Vec<Chair>> {
		self.check_available()?;
		Ok(lock_state(&self.state)?.chairs.values().cloned().collect())
	}

	async fn rides(&self) -> StoreResult<Vec<Ride>> {
		self.check_available()?;
		Ok(lock_state(&self.state)?.rides.values().cloned().collect())
	}

	async fn rides_by_chair(&self, chair_id: &str) -> StoreResult<Vec<Ride>> {
		self.check_available()?;
		let state = lock_state(&self.state)?;
		let mut rides: Vec<Ride> = state
			.rides
			.values()
			.filter(|ride| ride.chair_id.as_deref() == Some(chair_id))
			.cloned()
			.collect();
		rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(rides)
	}

	async fn unmatched_ride_ids(&self) -> StoreResult<Vec<RideId>> {
		self.check_available()?;
		let state = lock_state(&self.state)?;
		Ok(state
			.rides
			.values()
			.filter(|ride| ride.chair_id.is_none())
			.map(|ride| ride.id.clone())
			.collect())
	}

	async fn latest_ride_status(&self, ride_id: &str) -> StoreResult<Option<RideStatus>> {
		self.check_available()?;
		Ok(lock_state(&self.state)?.latest_status(ride_id))
	}

	async fn chair_locations(&self) -> StoreResult<Vec<ChairLocation>> {
		self.check_available()?;
		Ok(lock_state(&self.state)?.chair_locations.clone())
	}

	async fn chair_location_before(
		&self,
		chair_id: &str,
		before: DateTime<Utc>,
	) -> StoreResult<Option<ChairLocation>> {
		self.check_available()?;
		let state = lock_state(&self.state)?;
		Ok(state
			.chair_locations
			.iter()
			.filter(|sample| sample.chair_id == chair_id && sample.created_at < before)
			.max_by_key(|sample| sample.created_at)
			.cloned())
	}

	async fn begin(&self) -> StoreResult<Box<dyn RideTransaction>> {
		self.check_available()?;
		Ok(Box::new(MemoryTransaction {
			state: self.state.clone(),
			faults: self.faults.clone(),
			pending_assignments: Vec::new(),
		}))
	}
}

/// Read-committed transaction over [`MemoryRideStore`]
///
/// Pending assignments live only in this struct, so dropping it is a
/// rollback.
struct MemoryTransaction {
	state: Arc<Mutex<StoreState>>,
	faults: Arc<FaultInjection>,
	/// (ride_id, chair_id) pairs to apply on commit
	pending_assignments: Vec<(RideId, ChairId)>,
}

impl MemoryTransaction {
	fn pending_chair_for(&self, ride_id: &str) -> Option<&str> {
		self.pending_assignments
			.iter()
			.find(|(pending_ride, _)| pending_ride == ride_id)
			.map(|(_, chair)| chair.as_str())
	}
}

#[async_trait]
impl RideTransaction for MemoryTransaction {
	async fn random_active_chair(&mut self) -> StoreResult<Option<Chair>> {
		check_available(&self.faults)?;
		let state = lock_state(&self.state)?;
		let active: Vec<&Chair> = state.chairs.values().filter(|c| c.is_active).collect();
		Ok(active.choose(&mut rand::thread_rng()).map(|c| (*c).clone()))
	}

	async fn is_chair_idle(&mut self, chair_id: &str) -> StoreResult<bool> {
		check_available(&self.faults)?;
		let state = lock_state(&self.state)?;

		let committed_busy = state
			.rides
			.values()
			.filter(|ride| ride.chair_id.as_deref() == Some(chair_id))
			.any(|ride| !state.is_ride_completed(&ride.id));
		let pending_busy = self
			.pending_assignments
			.iter()
			.any(|(ride_id, pending_chair)| {
				pending_chair == chair_id && !state.is_ride_completed(ride_id)
			});

		Ok(!committed_busy && !pending_busy)
	}

	async fn assign_chair(&mut self, ride_id: &str, chair_id: &str) -> StoreResult<()> {
		check_available(&self.faults)?;
		{
			let state = lock_state(&self.state)?;
			let ride = state
				.rides
				.get(ride_id)
				.ok_or_else(|| StoreError::RideNotFound(ride_id.to_string()))?;
			if ride.chair_id.is_some() {
				return Err(StoreError::AlreadyMatched(ride_id.to_string()));
			}
			if !state.chairs.contains_key(chair_id) {
				return Err(StoreError::ChairNotFound(chair_id.to_string()));
			}
		}
		if self.pending_chair_for(ride_id).is_some() {
			return Err(StoreError::AlreadyMatched(ride_id.to_string()));
		}

		self.pending_assignments
			.push((ride_id.to_string(), chair_id.to_string()));
		Ok(())
	}

	async fn commit(self: Box<Self>) -> StoreResult<()> {
		check_available(&self.faults)?;
		if self.faults.fail_next_commit.swap(false, Ordering::SeqCst) {
			return Err(StoreError::CommitFailed(
				"injected commit failure".to_string(),
			));
		}

		let mut state = lock_state(&self.state)?;

		// Validate every write before applying any of them
		for (ride_id, _) in &self.pending_assignments {
			match state.rides.get(ride_id) {
				None => return Err(StoreError::RideNotFound(ride_id.clone())),
				Some(ride) if ride.chair_id.is_some() => {
					return Err(StoreError::AlreadyMatched(ride_id.clone()));
				}
				Some(_) => {}
			}
		}

		let now = Utc::now();
		for (ride_id, chair_id) in &self.pending_assignments {
			if let Some(ride) = state.rides.get_mut(ride_id) {
				ride.chair_id = Some(chair_id.clone());
				ride.updated_at = now;
			}
		}

		Ok(())
	}

	async fn rollback(self: Box<Self>) -> StoreResult<()> {
		Ok(())
	}
}
