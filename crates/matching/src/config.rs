// Copyright 2025 chenjjiaa
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

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{cache::CacheCapacities, engine::EngineConfig, types::IdlenessSource};

// Logging configuration constants
/// Default log level (can be overridden by RUST_LOG environment variable)
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log directory component name
pub const LOG_COMPONENT_NAME: &str = "matching";

/// Default console output enabled (can be overridden by LOG_TO_CONSOLE environment variable)
pub const DEFAULT_LOG_TO_CONSOLE: bool = false;

/// Default matching queue capacity (can be overridden by MATCHING_QUEUE_CAPACITY)
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default random chair draws per match attempt (can be overridden by MATCHING_SAMPLE_ATTEMPTS)
pub const DEFAULT_SAMPLE_ATTEMPTS: usize = 10;

/// Default retry cooldown in milliseconds (can be overridden by MATCHING_RETRY_DELAY_MS)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

/// Default concurrent match attempts (can be overridden by MATCHING_MAX_IN_FLIGHT)
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1;

const ENV_PREFIX: &str = "MATCHING";

/// Matching service configuration
///
/// Every field has a default, so an empty environment yields
/// `MatchingConfig::default()`. Nested cache capacities are set with a
/// double underscore, e.g. `MATCHING_CACHE__CHAIRS=5000`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
	/// Matching queue capacity
	pub queue_capacity: usize,
	/// Random chair draws per match attempt
	pub sample_attempts: usize,
	/// Cooldown before an unmatched ride is re-enqueued
	pub retry_delay_ms: u64,
	/// Concurrent match attempts (1 = serial)
	pub max_in_flight: usize,
	/// Where chair idleness is looked up (`cache` or `store`)
	pub idleness_source: IdlenessSource,
	/// Cache capacities
	pub cache: CacheCapacities,
	/// JSON fixture used to seed the in-memory store
	pub fixture_path: Option<String>,
	/// Log every dequeued ride at debug level
	pub verbose_logging: bool,
}

impl Default for MatchingConfig {
	fn default() -> Self {
		Self {
			queue_capacity: DEFAULT_QUEUE_CAPACITY,
			sample_attempts: DEFAULT_SAMPLE_ATTEMPTS,
			retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
			max_in_flight: DEFAULT_MAX_IN_FLIGHT,
			idleness_source: IdlenessSource::default(),
			cache: CacheCapacities::default(),
			fixture_path: None,
			verbose_logging: false,
		}
	}
}

impl MatchingConfig {
	/// Load configuration from environment variables
	pub fn from_env() -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(Self::environment())
			.build()?;

		cfg.try_deserialize()
	}

	/// Load configuration from file
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::File::with_name(path))
			.add_source(Self::environment())
			.build()?;

		cfg.try_deserialize()
	}

	fn environment() -> config::Environment {
		config::Environment::with_prefix(ENV_PREFIX)
			.prefix_separator("_")
			.separator("__")
			.try_parsing(true)
	}

	/// Engine settings derived from this configuration
	pub fn engine_config(&self) -> EngineConfig {
		EngineConfig {
			sample_attempts: self.sample_attempts,
			retry_delay: Duration::from_millis(self.retry_delay_ms),
			max_in_flight: self.max_in_flight.max(1),
			idleness_source: self.idleness_source,
			verbose_logging: self.verbose_logging,
		}
	}
}
