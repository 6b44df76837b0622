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

mod app;

pub use app::{AppCache, CacheCapacities, CacheStats};

use std::{borrow::Borrow, hash::Hash};

use moka::{policy::EvictionPolicy, sync::Cache};
use thiserror::Error;

use crate::store::StoreError;

/// Error types for cache operations
#[derive(Debug, Error)]
pub enum CacheError {
	#[error("Invalid capacity for cache {name}: {capacity}")]
	InvalidCapacity { name: &'static str, capacity: usize },
	#[error("Fallback read failed: {0}")]
	Store(#[from] StoreError),
}

/// Bounded in-memory key-value store with least-recently-used eviction
///
/// This is the leaf building block of [`AppCache`]. It is a view over the
/// backing store, never the source of truth: content is ephemeral and is
/// rebuilt from the store at process start.
///
/// Properties:
/// - Fixed maximum entry count, set at construction
/// - Least recently accessed entry is evicted once capacity is exceeded
/// - Eviction is transparent: a later `get` simply reports not found
/// - `get`/`set` on a single key are linearizable
///
/// The cache does NOT provide compare-and-swap. A read-modify-write made of
/// `get` followed by `set` is last-write-wins.
pub struct LruCache<K, V> {
	capacity: usize,
	inner: Cache<K, V>,
}

impl<K, V> LruCache<K, V>
where
	K: Hash + Eq + Send + Sync + 'static,
	V: Clone + Send + Sync + 'static,
{
	/// Create a new cache holding at most `capacity` entries
	///
	/// `name` only shows up in errors and logs.
	pub fn new(name: &'static str, capacity: usize) -> Result<Self, CacheError> {
		if capacity == 0 {
			return Err(CacheError::InvalidCapacity { name, capacity });
		}

		let inner = Cache::builder()
			.name(name)
			.max_capacity(capacity as u64)
			.eviction_policy(EvictionPolicy::lru())
			.build();

		Ok(Self { capacity, inner })
	}

	/// Look up a key, marking it as most recently used
	pub fn get<Q>(&self, key: &Q) -> Option<V>
	where
		K: Borrow<Q>,
		Q: Hash + Eq + ?Sized,
	{
		self.inner.get(key)
	}

	/// Insert or replace a value
	///
	/// Pending maintenance runs synchronously so that the entry count never
	/// stays above capacity after `set` returns.
	pub fn set(&self, key: K, value: V) -> Result<(), CacheError> {
		self.inner.insert(key, value);
		self.inner.run_pending_tasks();
		Ok(())
	}

	pub fn remove<Q>(&self, key: &Q)
	where
		K: Borrow<Q>,
		Q: Hash + Eq + ?Sized,
	{
		self.inner.invalidate(key);
	}

	pub fn entry_count(&self) -> u64 {
		self.inner.run_pending_tasks();
		self.inner.entry_count()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}
