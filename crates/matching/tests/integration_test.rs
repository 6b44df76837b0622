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

//! Integration tests for the matching engine
//!
//! These tests verify:
//! - End-to-end matching through the queue
//! - Serial exclusivity (a busy chair is never handed a second ride)
//! - Re-enqueue until a chair becomes available
//! - Error recovery and shutdown

mod common;

use std::{collections::HashMap, sync::Arc, time::Duration};

use chairline_matching::{
	AppCache, EngineConfig, IdlenessSource, MatchingEngine, MatchingQueue, MatchingQueueSender,
	MemoryRideStore, QueueError, RideStore,
};
use chairline_sdk::types::RideStatus;
use common::*;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> EngineConfig {
	EngineConfig {
		retry_delay: Duration::from_millis(10),
		..EngineConfig::default()
	}
}

fn start_engine(
	config: EngineConfig,
	store: &MemoryRideStore,
	cache: AppCache,
) -> (MatchingEngine, MatchingQueueSender, Arc<AppCache>) {
	let (sender, receiver) = MatchingQueue::new(100).split();
	let cache = Arc::new(cache);
	let store: Arc<dyn RideStore> = Arc::new(store.clone());
	let engine = MatchingEngine::start(
		config,
		store,
		cache.clone(),
		receiver,
		sender.clone(),
		CancellationToken::new(),
	);
	(engine, sender, cache)
}

#[tokio::test]
async fn test_single_match() {
	let store = MemoryRideStore::new();
	store.insert_chair(create_test_chair("chair_1", true)).unwrap();
	add_ride(&store, "ride_1", None, RideStatus::Matching);
	let cache = bootstrap(&store).await;

	let (engine, sender, cache) = start_engine(fast_config(), &store, cache);
	sender.enqueue("ride_1".to_string()).await.unwrap();

	assert!(wait_until(WAIT, || assigned_chair(&store, "ride_1").is_some()).await);
	assert_eq!(assigned_chair(&store, "ride_1").as_deref(), Some("chair_1"));
	assert!(wait_until(WAIT, || cache.active_rides("chair_1") == Some(1)).await);

	let stats = engine.shutdown().await;
	assert_eq!(stats.matched, 1);
	assert_eq!(stats.requeued, 0);
}

#[tokio::test]
async fn test_busy_chairs_are_never_double_assigned() {
	for source in [IdlenessSource::Cache, IdlenessSource::Store] {
		let store = MemoryRideStore::new();
		for i in 0..3 {
			store
				.insert_chair(create_test_chair(&format!("chair_{}", i), true))
				.unwrap();
		}
		for i in 0..8 {
			add_ride(&store, &format!("ride_{}", i), None, RideStatus::Matching);
		}
		let cache = bootstrap(&store).await;

		let config = EngineConfig {
			idleness_source: source,
			..fast_config()
		};
		let (engine, sender, _cache) = start_engine(config, &store, cache);
		for i in 0..8 {
			sender.enqueue(format!("ride_{}", i)).await.unwrap();
		}

		// Three chairs, no completions: exactly three rides can be matched
		assert!(wait_until(WAIT, || engine.stats().matched == 3).await);
		assert!(wait_until(WAIT, || engine.stats().no_idle_chair >= 10).await);

		let mut per_chair: HashMap<String, usize> = HashMap::new();
		for i in 0..8 {
			if let Some(chair_id) = assigned_chair(&store, &format!("ride_{}", i)) {
				*per_chair.entry(chair_id).or_default() += 1;
			}
		}
		assert_eq!(per_chair.len(), 3, "source {:?}", source);
		assert!(per_chair.values().all(|&rides| rides == 1), "source {:?}", source);

		let stats = engine.shutdown().await;
		assert_eq!(stats.matched, 3);
	}
}

#[tokio::test]
async fn test_requeue_until_chair_activates() {
	let store = MemoryRideStore::new();
	store.insert_chair(create_test_chair("chair_1", false)).unwrap();
	add_ride(&store, "ride_1", None, RideStatus::Matching);
	let cache = bootstrap(&store).await;

	let (engine, sender, _cache) = start_engine(fast_config(), &store, cache);
	sender.enqueue("ride_1".to_string()).await.unwrap();

	assert!(wait_until(WAIT, || engine.stats().no_idle_chair >= 2).await);
	assert_eq!(assigned_chair(&store, "ride_1"), None);

	store.set_chair_active("chair_1", true).unwrap();

	assert!(wait_until(WAIT, || assigned_chair(&store, "ride_1").is_some()).await);
	let stats = engine.shutdown().await;
	assert_eq!(stats.matched, 1);
	assert!(stats.requeued >= 2);
}

#[tokio::test]
async fn test_completion_frees_chair_for_next_ride() {
	let store = MemoryRideStore::new();
	store.insert_chair(create_test_chair("chair_1", true)).unwrap();
	add_ride(&store, "ride_1", None, RideStatus::Matching);
	add_ride(&store, "ride_2", None, RideStatus::Matching);
	let cache = bootstrap(&store).await;

	let (engine, sender, cache) = start_engine(fast_config(), &store, cache);
	sender.enqueue("ride_1".to_string()).await.unwrap();
	assert!(wait_until(WAIT, || assigned_chair(&store, "ride_1").is_some()).await);

	sender.enqueue("ride_2".to_string()).await.unwrap();
	assert!(wait_until(WAIT, || engine.stats().no_idle_chair >= 1).await);
	assert_eq!(assigned_chair(&store, "ride_2"), None);

	// Status collaborator completes the first ride
	let previous = store.latest_ride_status("ride_1").await.unwrap();
	store
		.push_ride_status("ride_1", RideStatus::Completed, base_time() + chrono::Duration::seconds(60))
		.unwrap();
	cache
		.record_ride_status("ride_1", Some("chair_1"), previous, RideStatus::Completed)
		.unwrap();

	assert!(wait_until(WAIT, || assigned_chair(&store, "ride_2").is_some()).await);
	assert_eq!(assigned_chair(&store, "ride_2").as_deref(), Some("chair_1"));
	engine.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_queue_entry_is_dropped() {
	let store = MemoryRideStore::new();
	store.insert_chair(create_test_chair("chair_1", true)).unwrap();
	store.insert_chair(create_test_chair("chair_2", true)).unwrap();
	add_ride(&store, "ride_1", None, RideStatus::Matching);
	let cache = bootstrap(&store).await;

	let (engine, sender, cache) = start_engine(fast_config(), &store, cache);
	sender.enqueue("ride_1".to_string()).await.unwrap();
	sender.enqueue("ride_1".to_string()).await.unwrap();

	assert!(wait_until(WAIT, || engine.stats().dropped == 1).await);
	let stats = engine.shutdown().await;
	assert_eq!(stats.matched, 1);

	let counts = cache.active_rides("chair_1").unwrap() + cache.active_rides("chair_2").unwrap();
	assert_eq!(counts, 1);
}

#[tokio::test]
async fn test_store_outage_is_retried() {
	let store = MemoryRideStore::new();
	store.insert_chair(create_test_chair("chair_1", true)).unwrap();
	add_ride(&store, "ride_1", None, RideStatus::Matching);
	let cache = bootstrap(&store).await;

	store.set_unavailable(true);
	let (engine, sender, _cache) = start_engine(fast_config(), &store, cache);
	sender.enqueue("ride_1".to_string()).await.unwrap();

	assert!(wait_until(WAIT, || engine.stats().failed >= 2).await);
	store.set_unavailable(false);

	assert!(wait_until(WAIT, || assigned_chair(&store, "ride_1").is_some()).await);
	let stats = engine.shutdown().await;
	assert_eq!(stats.matched, 1);
}

#[tokio::test]
async fn test_shutdown_abandons_pending_retries() {
	let store = MemoryRideStore::new();
	add_ride(&store, "ride_1", None, RideStatus::Matching);
	let cache = bootstrap(&store).await;

	let config = EngineConfig {
		retry_delay: Duration::from_secs(3600),
		..EngineConfig::default()
	};
	let (engine, sender, _cache) = start_engine(config, &store, cache);
	sender.enqueue("ride_1".to_string()).await.unwrap();
	assert!(wait_until(WAIT, || engine.stats().requeued == 1).await);

	let stats = tokio::time::timeout(WAIT, engine.shutdown())
		.await
		.expect("shutdown must not wait for the retry cooldown");
	assert_eq!(stats.matched, 0);
	assert_eq!(assigned_chair(&store, "ride_1"), None);
}

#[tokio::test]
async fn test_external_cancellation_stops_engine() {
	let store = MemoryRideStore::new();
	store.insert_chair(create_test_chair("chair_1", true)).unwrap();
	let cache = Arc::new(bootstrap(&store).await);

	let (sender, receiver) = MatchingQueue::new(4).split();
	let cancel = CancellationToken::new();
	let engine = MatchingEngine::start(
		fast_config(),
		Arc::new(store.clone()),
		cache,
		receiver,
		sender.clone(),
		cancel.clone(),
	);

	cancel.cancel();
	tokio::time::timeout(WAIT, engine.shutdown()).await.unwrap();

	// The dispatch loop dropped its receiver on exit
	assert!(sender.is_closed());
	assert!(matches!(
		sender.try_enqueue("ride_1".to_string()),
		Err(QueueError::Closed)
	));
}
