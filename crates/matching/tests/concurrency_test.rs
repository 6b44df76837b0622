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

//! Engine behavior with attempts held open at commit
//!
//! `GatedStore` wraps the memory store and parks every commit until the test
//! releases it. This makes the window between the idleness check and the
//! commit observable from outside the engine.

mod common;

use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use chairline_matching::{
	AppCache, EngineConfig, MatchingEngine, MatchingQueue, MatchingQueueSender, MemoryRideStore,
	RideStore, RideTransaction, StoreError, StoreResult,
};
use chairline_sdk::types::{Chair, ChairLocation, Ride, RideId, RideStatus};
use chrono::{DateTime, Utc};
use common::*;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

struct Gate {
	/// One permit per commit allowed through
	commits: Semaphore,
	/// Transactions currently open
	open: AtomicUsize,
	/// Highest number of transactions open at the same time
	peak_open: AtomicUsize,
	/// Commits waiting on the gate, including released ones
	arrived: AtomicUsize,
}

impl Gate {
	/// Closed gate: every commit waits for [`Gate::release`]
	fn closed() -> Self {
		Self {
			commits: Semaphore::new(0),
			open: AtomicUsize::new(0),
			peak_open: AtomicUsize::new(0),
			arrived: AtomicUsize::new(0),
		}
	}

	fn release(&self, commits: usize) {
		self.commits.add_permits(commits);
	}

	fn open(&self) -> usize {
		self.open.load(Ordering::SeqCst)
	}

	fn peak_open(&self) -> usize {
		self.peak_open.load(Ordering::SeqCst)
	}

	fn arrived(&self) -> usize {
		self.arrived.load(Ordering::SeqCst)
	}
}

struct GatedStore {
	inner: MemoryRideStore,
	gate: Arc<Gate>,
}

#[async_trait]
impl RideStore for GatedStore {
	async fn chairs(&self) -> StoreResult<Vec<Chair>> {
		self.inner.chairs().await
	}

	async fn rides(&self) -> StoreResult<Vec<Ride>> {
		self.inner.rides().await
	}

	async fn rides_by_chair(&self, chair_id: &str) -> StoreResult<Vec<Ride>> {
		self.inner.rides_by_chair(chair_id).await
	}

	async fn unmatched_ride_ids(&self) -> StoreResult<Vec<RideId>> {
		self.inner.unmatched_ride_ids().await
	}

	async fn latest_ride_status(&self, ride_id: &str) -> StoreResult<Option<RideStatus>> {
		self.inner.latest_ride_status(ride_id).await
	}

	async fn chair_locations(&self) -> StoreResult<Vec<ChairLocation>> {
		self.inner.chair_locations().await
	}

	async fn chair_location_before(
		&self,
		chair_id: &str,
		before: DateTime<Utc>,
	) -> StoreResult<Option<ChairLocation>> {
		self.inner.chair_location_before(chair_id, before).await
	}

	async fn begin(&self) -> StoreResult<Box<dyn RideTransaction>> {
		let inner = self.inner.begin().await?;
		let open = self.gate.open.fetch_add(1, Ordering::SeqCst) + 1;
		self.gate.peak_open.fetch_max(open, Ordering::SeqCst);
		Ok(Box::new(GatedTransaction {
			inner: Some(inner),
			gate: self.gate.clone(),
		}))
	}
}

struct GatedTransaction {
	inner: Option<Box<dyn RideTransaction>>,
	gate: Arc<Gate>,
}

impl GatedTransaction {
	fn inner(&mut self) -> StoreResult<&mut Box<dyn RideTransaction>> {
		self.inner
			.as_mut()
			.ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))
	}

	fn take(&mut self) -> StoreResult<Box<dyn RideTransaction>> {
		self.inner
			.take()
			.ok_or_else(|| StoreError::Backend("transaction already finished".to_string()))
	}
}

impl Drop for GatedTransaction {
	fn drop(&mut self) {
		self.gate.open.fetch_sub(1, Ordering::SeqCst);
	}
}

#[async_trait]
impl RideTransaction for GatedTransaction {
	async fn random_active_chair(&mut self) -> StoreResult<Option<Chair>> {
		self.inner()?.random_active_chair().await
	}

	async fn is_chair_idle(&mut self, chair_id: &str) -> StoreResult<bool> {
		self.inner()?.is_chair_idle(chair_id).await
	}

	async fn assign_chair(&mut self, ride_id: &str, chair_id: &str) -> StoreResult<()> {
		self.inner()?.assign_chair(ride_id, chair_id).await
	}

	async fn commit(mut self: Box<Self>) -> StoreResult<()> {
		self.gate.arrived.fetch_add(1, Ordering::SeqCst);
		self.gate
			.commits
			.acquire()
			.await
			.map_err(|e| StoreError::Backend(e.to_string()))?
			.forget();
		self.take()?.commit().await
	}

	async fn rollback(mut self: Box<Self>) -> StoreResult<()> {
		self.take()?.rollback().await
	}
}

fn start_gated_engine(
	config: EngineConfig,
	store: &MemoryRideStore,
	cache: AppCache,
) -> (MatchingEngine, MatchingQueueSender, Arc<AppCache>, Arc<Gate>) {
	let gate = Arc::new(Gate::closed());
	let gated: Arc<dyn RideStore> = Arc::new(GatedStore {
		inner: store.clone(),
		gate: gate.clone(),
	});
	let (sender, receiver) = MatchingQueue::new(100).split();
	let cache = Arc::new(cache);
	let engine = MatchingEngine::start(
		config,
		gated,
		cache.clone(),
		receiver,
		sender.clone(),
		CancellationToken::new(),
	);
	(engine, sender, cache, gate)
}

fn concurrent_config(max_in_flight: usize) -> EngineConfig {
	EngineConfig {
		retry_delay: Duration::from_millis(10),
		max_in_flight,
		..EngineConfig::default()
	}
}

#[tokio::test]
async fn test_parallel_attempts_can_double_assign_one_chair() {
	let store = MemoryRideStore::new();
	store.insert_chair(create_test_chair("chair_1", true)).unwrap();
	add_ride(&store, "ride_a", None, RideStatus::Matching);
	add_ride(&store, "ride_b", None, RideStatus::Matching);
	let cache = bootstrap(&store).await;

	let (engine, sender, cache, gate) = start_gated_engine(concurrent_config(2), &store, cache);
	sender.enqueue("ride_a".to_string()).await.unwrap();
	sender.enqueue("ride_b".to_string()).await.unwrap();

	// Both attempts saw chair_1 idle and now wait to commit
	assert!(wait_until(WAIT, || gate.arrived() == 2).await);
	assert_eq!(cache.active_rides("chair_1"), Some(0));

	gate.release(2);
	assert!(wait_until(WAIT, || engine.stats().matched == 2).await);

	// Known race with more than one attempt in flight
	assert_eq!(assigned_chair(&store, "ride_a").as_deref(), Some("chair_1"));
	assert_eq!(assigned_chair(&store, "ride_b").as_deref(), Some("chair_1"));
	assert_eq!(cache.active_rides("chair_1"), Some(2));

	engine.shutdown().await;
}

#[tokio::test]
async fn test_in_flight_attempts_are_bounded() {
	let store = MemoryRideStore::new();
	for i in 0..4 {
		store
			.insert_chair(create_test_chair(&format!("chair_{}", i), true))
			.unwrap();
	}
	for i in 0..4 {
		add_ride(&store, &format!("ride_{}", i), None, RideStatus::Matching);
	}
	let cache = bootstrap(&store).await;

	let (engine, sender, _cache, gate) = start_gated_engine(concurrent_config(2), &store, cache);
	for i in 0..4 {
		sender.enqueue(format!("ride_{}", i)).await.unwrap();
	}

	assert!(wait_until(WAIT, || gate.arrived() == 2).await);
	// Give the dispatcher time to start a third attempt if it were allowed to
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(gate.arrived(), 2);
	assert_eq!(gate.open(), 2);
	assert_eq!(sender.len(), 2);

	gate.release(100);
	let all_assigned = || (0..4).all(|i| assigned_chair(&store, &format!("ride_{}", i)).is_some());
	assert!(wait_until(WAIT, all_assigned).await);

	assert_eq!(gate.peak_open(), 2);
	engine.shutdown().await;
}

#[tokio::test]
async fn test_cancel_mid_attempt_rolls_back() {
	let store = MemoryRideStore::new();
	store.insert_chair(create_test_chair("chair_1", true)).unwrap();
	add_ride(&store, "ride_1", None, RideStatus::Matching);
	let cache = bootstrap(&store).await;

	let (engine, sender, cache, gate) = start_gated_engine(concurrent_config(1), &store, cache);
	sender.enqueue("ride_1".to_string()).await.unwrap();

	// Chair selected and assignment buffered, commit still pending
	assert!(wait_until(WAIT, || gate.arrived() == 1).await);

	let stats = tokio::time::timeout(WAIT, engine.shutdown())
		.await
		.expect("shutdown must not wait for the parked commit");

	assert_eq!(stats.matched, 0);
	assert_eq!(gate.open(), 0);
	assert_eq!(assigned_chair(&store, "ride_1"), None);
	assert_eq!(store.unmatched_ride_ids().await.unwrap(), vec!["ride_1".to_string()]);
	assert_eq!(cache.active_rides("chair_1"), Some(0));
}
