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

//! Matching service entry point
//!
//! This binary wires up all components of the matching service:
//! - Ride Store (in-memory, seeded from a JSON fixture)
//! - Application Cache (rebuilt from the store; failure is fatal)
//! - Matching Queue (MPSC from producers to the dispatch loop)
//! - Matching Engine (queue-driven dispatch loop)

use std::{env, sync::Arc};

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chairline_matching::{
	MatchingEngine, MatchingQueue, MemoryRideStore, RideStore, StoreFixture, bootstrap_cache,
	config::MatchingConfig, seed_matching_queue,
};

#[tokio::main]
async fn main() -> Result<()> {
	// Initialize logging first
	chairline_matching::logging::init_logging()?;

	// Load configuration: optional file given as first argument, then environment
	let config = match env::args().nth(1) {
		Some(path) => MatchingConfig::from_file(&path)
			.with_context(|| format!("Failed to load configuration from {}", path))?,
		None => MatchingConfig::from_env().unwrap_or_else(|e| {
			warn!(target: "server", error = %e, "Invalid environment configuration, using defaults");
			MatchingConfig::default()
		}),
	};

	info!(target: "server", "Starting Chairline Matching Engine");
	info!(target: "server", "Queue capacity: {}", config.queue_capacity);
	info!(target: "server", "Sample attempts: {}", config.sample_attempts);
	info!(target: "server", "Max in flight: {}", config.max_in_flight);
	info!(target: "server", "Idleness source: {:?}", config.idleness_source);

	// Phase 1: Ride Store
	info!(target: "server", "Initializing ride store...");
	let store = match &config.fixture_path {
		Some(path) => {
			let fixture = StoreFixture::from_json_file(path)
				.with_context(|| format!("Failed to load store fixture {}", path))?;
			MemoryRideStore::from_fixture(fixture).context("Failed to seed ride store")?
		}
		None => {
			warn!(target: "server", "No fixture_path configured, starting with an empty store");
			MemoryRideStore::new()
		}
	};
	let store: Arc<dyn RideStore> = Arc::new(store);

	// Phase 2: Application Cache
	let cache = bootstrap_cache(store.as_ref(), &config.cache)
		.await
		.context("Failed to bootstrap application cache")?;
	let cache = Arc::new(cache);

	// Phase 3: Matching Queue
	info!(target: "server", "Creating matching queue...");
	let (queue_sender, queue_receiver) = MatchingQueue::new(config.queue_capacity).split();

	// Phase 4: Matching Engine
	info!(target: "server", "Starting matching engine...");
	let cancel = CancellationToken::new();
	let engine = MatchingEngine::start(
		config.engine_config(),
		store.clone(),
		cache.clone(),
		queue_receiver,
		queue_sender.clone(),
		cancel.clone(),
	);

	// Phase 5: Seed unmatched rides once the engine consumes, so a backlog
	// larger than the queue cannot stall startup
	tokio::select! {
		seeded = seed_matching_queue(store.as_ref(), &queue_sender) => {
			seeded.context("Failed to seed matching queue")?;
		}
		_ = signal::ctrl_c() => {
			info!(target: "server", "Interrupted while seeding");
			cancel.cancel();
		}
	}

	if !cancel.is_cancelled() {
		signal::ctrl_c()
			.await
			.context("Failed to listen for shutdown signal")?;
	}

	// Graceful shutdown
	info!(target: "server", "Shutting down...");
	let stats = engine.shutdown().await;

	info!(
		target: "server",
		attempts = stats.attempts,
		matched = stats.matched,
		no_idle_chair = stats.no_idle_chair,
		requeued = stats.requeued,
		dropped = stats.dropped,
		failed = stats.failed,
		"Shutdown complete"
	);
	Ok(())
}
