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

//! Chairline Matching Engine
//!
//! This crate assigns waiting rides to idle chairs and keeps the derived
//! aggregates the rest of the application reads (total distance, latest
//! location, active ride counts, sessions, latest ride status) in a bounded
//! in-memory cache next to the authoritative store.
//!
//! Architecture:
//! - Ride Store trait for the authoritative backend (transactional assignment)
//! - LRU application cache, rebuilt from the store at startup
//! - Bounded MPSC matching queue seeded with every unmatched ride
//! - Queue-driven matching engine with random chair sampling and retries

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod engine;
pub mod logging;
pub mod queue;
pub mod store;
pub mod types;

pub use bootstrap::{BootstrapError, bootstrap_cache, seed_matching_queue};
pub use cache::{AppCache, CacheCapacities, CacheError, CacheStats, LruCache};
pub use engine::{
	EngineConfig, EngineError, EngineStatsSnapshot, MatchingEngine, try_match,
};
pub use queue::{MatchingQueue, MatchingQueueReceiver, MatchingQueueSender, QueueError};
pub use store::{
	MemoryRideStore, RideStore, RideTransaction, StoreError, StoreFixture, StoreResult,
};
pub use types::*;
